//! Configuration management for the edge filter.
//!
//! Values come from an optional TOML file, then from `EDGE__`-prefixed
//! environment variables (`EDGE__ATTACK__THRESHOLD=5000`), on top of the
//! defaults below. The two list settings can also be given as
//! comma-separated `EDGE_BLOCKED_COUNTRIES` / `EDGE_ALLOWED_IDENTITIES`.

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use std::env;

use crate::models::Config;

/// Load configuration from the config file and environment variables
pub fn load_config() -> Result<Config, ConfigError> {
    let config_file = env::var("CONFIG_FILE").unwrap_or_else(|_| "config/default.toml".to_string());

    let config = ConfigBuilder::builder()
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8080)?
        .set_default("redis.timeout_ms", 500)?
        .set_default("filter.country_header", "CF-IPCountry")?
        .set_default("rate_limit.capacity", 10)?
        .set_default("rate_limit.window_seconds", 10)?
        .set_default("attack.threshold", 10_000)?
        .set_default("attack.window_seconds", 60)?
        .set_default("notifier.api_base", "https://api.telegram.org")?
        .set_default("notifier.timeout_ms", 5_000)?
        .add_source(File::with_name(&config_file).required(false))
        .add_source(Environment::with_prefix("EDGE").separator("__").try_parsing(true))
        .build()?;

    let mut config: Config = config.try_deserialize()?;
    apply_list_overrides(&mut config, |name| env::var(name).ok());
    Ok(config)
}

/// Replace list settings from comma-separated variables found by `lookup`
fn apply_list_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(raw) = lookup("EDGE_BLOCKED_COUNTRIES") {
        config.filter.blocked_countries = split_list(&raw);
    }
    if let Some(raw) = lookup("EDGE_ALLOWED_IDENTITIES") {
        config.filter.allowed_identities = split_list(&raw);
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_overrides() {
        let mut config = Config::default();
        apply_list_overrides(&mut config, |name| match name {
            "EDGE_BLOCKED_COUNTRIES" => Some("RU, KP,,IR ".to_string()),
            _ => None,
        });

        assert_eq!(config.filter.blocked_countries, vec!["RU", "KP", "IR"]);
        assert_eq!(config.filter.allowed_identities, Config::default().filter.allowed_identities);
    }

    #[test]
    fn test_split_list_drops_blanks() {
        assert!(split_list(" , ,").is_empty());
        assert_eq!(split_list("Chrome"), vec!["Chrome"]);
    }
}
