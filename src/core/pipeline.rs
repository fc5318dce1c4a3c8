//! Request admission pipeline.
//!
//! Checks run in cost order, cheapest first, and the first denial ends the
//! evaluation:
//!
//! ```text
//! Country -> Identity -> RateLimit -> record pass + alert check -> Allow
//!    |          |            |
//!    +----------+------------+--> record block -> Deny (403 / 429)
//! ```
//!
//! Without a backing store the pipeline runs fail-open: every request is
//! allowed and nothing is recorded.

use log::{debug, warn};
use metrics::increment_counter;
use std::sync::Arc;

use crate::core::aggregator::AttackAggregator;
use crate::core::classifier::Classifier;
use crate::core::notifier::{NotificationChannel, Notifier};
use crate::core::rate_limiter::{RateLimitOutcome, RateLimiter};
use crate::models::{ClientRequest, Config, DenyReason, FilterDecision, RedisConfig};
use crate::store::{MemoryStore, RedisStore, Store};

/// URL that selects the in-process store instead of Redis
pub const MEMORY_STORE_URL: &str = "memory://";

/// Whether the store-backed checks are active
pub enum ProtectionMode {
    /// Rate limiting, attack counters and alerts run against this store.
    Enforced(Arc<dyn Store>),
    /// No store: allow everything, record nothing.
    Disabled,
}

impl ProtectionMode {
    /// Pick the mode from the Redis settings. An unset URL or a failed
    /// initial connection yields [`ProtectionMode::Disabled`].
    pub async fn connect(config: &RedisConfig) -> Self {
        let url = match config.url.as_deref() {
            Some(url) if !url.is_empty() => url,
            _ => {
                warn!("No store URL configured; running FAIL-OPEN, all requests will be allowed");
                return ProtectionMode::Disabled;
            }
        };

        if url == MEMORY_STORE_URL {
            warn!("Using the in-process store; counters are not shared between instances");
            return ProtectionMode::Enforced(Arc::new(MemoryStore::new()));
        }

        match RedisStore::connect(url, config.timeout()).await {
            Ok(store) => ProtectionMode::Enforced(Arc::new(store)),
            Err(e) => {
                warn!("Could not connect to Redis ({}); running FAIL-OPEN, all requests will be allowed", e);
                ProtectionMode::Disabled
            }
        }
    }
}

/// One check in the admission chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Country,
    Identity,
    RateLimit,
}

/// Checks in the order they run
pub const STAGES: [Stage; 3] = [Stage::Country, Stage::Identity, Stage::RateLimit];

/// Final answer for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub decision: FilterDecision,
    /// The stage that denied the request
    pub denied_at: Option<Stage>,
    /// Rate limit state, when the rate limit stage ran
    pub rate_limit: Option<RateLimitOutcome>,
}

impl Verdict {
    fn allow(rate_limit: Option<RateLimitOutcome>) -> Self {
        Self {
            decision: FilterDecision::Allow,
            denied_at: None,
            rate_limit,
        }
    }
}

struct Enforcement {
    limiter: RateLimiter,
    aggregator: AttackAggregator,
    notifier: Notifier,
}

pub struct Pipeline {
    classifier: Classifier,
    enforcement: Option<Enforcement>,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        mode: ProtectionMode,
        channel: Option<Arc<dyn NotificationChannel>>,
    ) -> Self {
        let classifier = Classifier::new(
            &config.filter.blocked_countries,
            &config.filter.allowed_identities,
        );

        let enforcement = match mode {
            ProtectionMode::Enforced(store) => Some(Enforcement {
                limiter: RateLimiter::new(store.clone(), config.rate_limit.clone()),
                aggregator: AttackAggregator::new(store.clone(), config.attack.window()),
                notifier: Notifier::new(
                    store,
                    channel,
                    config.attack.threshold,
                    config.attack.window(),
                ),
            }),
            ProtectionMode::Disabled => None,
        };

        Self {
            classifier,
            enforcement,
        }
    }

    pub fn is_enforced(&self) -> bool {
        self.enforcement.is_some()
    }

    pub fn mode_label(&self) -> &'static str {
        if self.is_enforced() {
            "enforced"
        } else {
            "disabled"
        }
    }

    /// Decide whether `request` may continue to the application.
    ///
    /// Store failures never deny: a failed rate limit check allows the
    /// request without recording it, and failed counter updates or alert
    /// checks are logged while the decision already made stands.
    pub async fn evaluate(&self, request: &ClientRequest) -> Verdict {
        let enforcement = match &self.enforcement {
            Some(enforcement) => enforcement,
            None => {
                increment_counter!("edge_filter_requests_total", "outcome" => "fail_open");
                return Verdict::allow(None);
            }
        };

        let mut rate_limit = None;
        for stage in STAGES {
            let decision = match stage {
                Stage::Country => self.classifier.check_country(request.country.as_deref()),
                Stage::Identity => self.classifier.check_identity(request.identity.as_deref()),
                Stage::RateLimit => match enforcement.limiter.check(&request.client_key).await {
                    Ok(outcome) => {
                        rate_limit = Some(outcome);
                        if outcome.admitted {
                            FilterDecision::Allow
                        } else {
                            FilterDecision::Deny(DenyReason::TooManyRequests)
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Rate limit check failed for {}; allowing without recording: {}",
                            request.client_key, e
                        );
                        increment_counter!("edge_filter_store_errors_total", "op" => "rate_limit");
                        increment_counter!("edge_filter_requests_total", "outcome" => "fail_open");
                        return Verdict::allow(None);
                    }
                },
            };

            if let FilterDecision::Deny(reason) = decision {
                debug!("Denied {} at {:?}: {}", request.client_key, stage, reason);
                if let Err(e) = enforcement.aggregator.record_blocked().await {
                    warn!("Failed to record blocked request: {}", e);
                    increment_counter!("edge_filter_store_errors_total", "op" => "record_blocked");
                }
                increment_counter!("edge_filter_requests_total", "outcome" => reason.label());
                return Verdict {
                    decision: FilterDecision::Deny(reason),
                    denied_at: Some(stage),
                    rate_limit,
                };
            }
        }

        match enforcement.aggregator.record_passed().await {
            Ok(snapshot) => {
                if let Err(e) = enforcement.notifier.maybe_notify(snapshot).await {
                    warn!("Failed to evaluate attack alert: {}", e);
                    increment_counter!("edge_filter_store_errors_total", "op" => "notify");
                }
            }
            Err(e) => {
                warn!("Failed to record passed request: {}", e);
                increment_counter!("edge_filter_store_errors_total", "op" => "record_passed");
            }
        }

        increment_counter!("edge_filter_requests_total", "outcome" => "allowed");
        Verdict::allow(rate_limit)
    }
}
