//! Static request classification.
//!
//! The cheap checks run before anything touches the store: origin country
//! against a blocklist, then the client identity against an allow-list of
//! literal substrings. Neither has side effects.

use std::collections::HashSet;

use crate::models::{DenyReason, FilterDecision};
use crate::utils::normalize_country;

/// Country blocklist plus identity allow-list
#[derive(Debug, Clone)]
pub struct Classifier {
    blocked_countries: HashSet<String>,
    allowed_identities: Vec<String>,
}

impl Classifier {
    pub fn new(blocked_countries: &[String], allowed_identities: &[String]) -> Self {
        Self {
            blocked_countries: blocked_countries
                .iter()
                .filter_map(|c| normalize_country(c))
                .collect(),
            allowed_identities: allowed_identities
                .iter()
                .filter(|p| !p.is_empty())
                .cloned()
                .collect(),
        }
    }

    /// Run the country check, then the identity check.
    pub fn classify(&self, country: Option<&str>, identity: Option<&str>) -> FilterDecision {
        match self.check_country(country) {
            FilterDecision::Allow => self.check_identity(identity),
            deny => deny,
        }
    }

    /// Deny only when a known country is on the blocklist. Missing or
    /// unknown origin never denies.
    pub fn check_country(&self, country: Option<&str>) -> FilterDecision {
        match country.and_then(normalize_country) {
            Some(code) if self.blocked_countries.contains(&code) => {
                FilterDecision::Deny(DenyReason::CountryBlocked(code))
            }
            _ => FilterDecision::Allow,
        }
    }

    /// Allow when any allow-listed pattern is a substring of the identity
    /// (case-sensitive). An empty or missing identity is denied.
    pub fn check_identity(&self, identity: Option<&str>) -> FilterDecision {
        let identity = identity.unwrap_or_default();
        if !identity.is_empty()
            && self
                .allowed_identities
                .iter()
                .any(|pattern| identity.contains(pattern.as_str()))
        {
            return FilterDecision::Allow;
        }
        FilterDecision::Deny(DenyReason::IdentityNotAllowed)
    }
}
