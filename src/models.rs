use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests admitted per client key within one window
    pub capacity: u32,
    /// Trailing window length in seconds
    pub window_seconds: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// Attack detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackConfig {
    /// Passed requests per window above which an alert is raised
    pub threshold: u64,
    /// Detection window in seconds
    pub window_seconds: u64,
}

impl AttackConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL. Unset means the filter runs fail-open.
    pub url: Option<String>,
    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,
}

impl RedisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
}

/// Static request filter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// ISO 3166-1 alpha-2 codes whose traffic is refused
    #[serde(default)]
    pub blocked_countries: Vec<String>,
    /// Literal substrings, one of which must appear in the client identity
    #[serde(default = "default_allowed_identities")]
    pub allowed_identities: Vec<String>,
    /// Request header carrying the resolved origin country
    pub country_header: String,
    /// Request header carrying the client address, set by a trusted proxy.
    /// Unset means the TCP peer address is the client key.
    #[serde(default)]
    pub client_key_header: Option<String>,
}

fn default_allowed_identities() -> Vec<String> {
    ["Mozilla", "Chrome", "Safari", "Firefox", "Edg", "Opera"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Notification channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Telegram bot token
    pub telegram_bot_token: Option<String>,
    /// Telegram chat the alerts are posted to
    pub telegram_chat_id: Option<String>,
    /// Telegram Bot API base URL
    pub api_base: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl NotifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Redis configuration
    pub redis: RedisConfig,
    /// Static filter configuration
    pub filter: FilterConfig,
    /// Rate limit configuration
    pub rate_limit: RateLimitConfig,
    /// Attack detection configuration
    pub attack: AttackConfig,
    /// Notification configuration
    pub notifier: NotifierConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            redis: RedisConfig {
                url: None,
                timeout_ms: 500,
            },
            filter: FilterConfig {
                blocked_countries: Vec::new(),
                allowed_identities: default_allowed_identities(),
                country_header: "CF-IPCountry".to_string(),
                client_key_header: None,
            },
            rate_limit: RateLimitConfig {
                capacity: 10,
                window_seconds: 10,
            },
            attack: AttackConfig {
                threshold: 10_000,
                window_seconds: 60,
            },
            notifier: NotifierConfig {
                telegram_bot_token: None,
                telegram_chat_id: None,
                api_base: "https://api.telegram.org".to_string(),
                timeout_ms: 5_000,
            },
        }
    }
}

/// One inbound request as seen by the filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientRequest {
    /// Resolved origin country, if the edge supplied one
    pub country: Option<String>,
    /// Stable client identifier, normally the network address
    pub client_key: String,
    /// Declared client label, normally the `User-Agent` header
    pub identity: Option<String>,
}

/// Why a request was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    CountryBlocked(String),
    IdentityNotAllowed,
    TooManyRequests,
}

impl DenyReason {
    /// HTTP status returned for this denial
    pub fn status(&self) -> u16 {
        match self {
            DenyReason::CountryBlocked(_) | DenyReason::IdentityNotAllowed => 403,
            DenyReason::TooManyRequests => 429,
        }
    }

    /// Label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            DenyReason::CountryBlocked(_) => "country_blocked",
            DenyReason::IdentityNotAllowed => "identity_not_allowed",
            DenyReason::TooManyRequests => "rate_limited",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::CountryBlocked(country) => write!(f, "country blocked: {}", country),
            DenyReason::IdentityNotAllowed => f.write_str("identity not allowed"),
            DenyReason::TooManyRequests => f.write_str("too many requests"),
        }
    }
}

/// Outcome of one check stage, or of the whole pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Allow,
    Deny(DenyReason),
}

impl FilterDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, FilterDecision::Allow)
    }

    /// HTTP status for the decision; 200 means "continue to the application"
    pub fn status(&self) -> u16 {
        match self {
            FilterDecision::Allow => 200,
            FilterDecision::Deny(reason) => reason.status(),
        }
    }
}
