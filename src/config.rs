use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::identifier_format::FormatOptions;
use crate::registry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub store: StoreBackend,
    pub redis_url: String,
    pub format: FormatOptions,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0".to_string(),
            port: 8080,
            store: StoreBackend::Redis,
            redis_url: "redis://localhost:6379/".to_string(),
            format: FormatOptions::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup, falling back to defaults for
    /// missing keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let backoff_ms: u64 = parse_or(&lookup, "ALLOC_BACKOFF_MS", 50)?;

        Ok(Config {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: parse_or(&lookup, "PORT", defaults.port)?,
            store: parse_or(&lookup, "SEQUENCE_STORE", defaults.store)?,
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            format: FormatOptions {
                legacy_card_types: parse_flag(
                    &lookup,
                    "LEGACY_CARD_TYPES",
                    defaults.format.legacy_card_types,
                )?,
                legacy_account_types: parse_flag(
                    &lookup,
                    "LEGACY_ACCOUNT_TYPES",
                    defaults.format.legacy_account_types,
                )?,
            },
            retry: RetryPolicy {
                max_attempts: parse_or(&lookup, "ALLOC_MAX_ATTEMPTS", defaults.retry.max_attempts)?
                    .max(1),
                initial_backoff: Duration::from_millis(backoff_ms),
                max_backoff: defaults.retry.max_backoff.max(Duration::from_millis(backoff_ms)),
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(default),
    }
}

fn parse_flag<F>(lookup: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue { key, value }),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.store, StoreBackend::Redis);
        assert!(config.format.legacy_card_types);
        assert!(!config.format.legacy_account_types);
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "9090"),
            ("SEQUENCE_STORE", "memory"),
            ("LEGACY_CARD_TYPES", "off"),
            ("LEGACY_ACCOUNT_TYPES", "true"),
            ("ALLOC_MAX_ATTEMPTS", "0"),
            ("ALLOC_BACKOFF_MS", "10"),
        ])
        .unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.store, StoreBackend::Memory);
        assert!(!config.format.legacy_card_types);
        assert!(config.format.legacy_account_types);
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(10));
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let err = config_from(&[("SEQUENCE_STORE", "postgres")]).unwrap_err();
        assert!(err.to_string().contains("SEQUENCE_STORE"));
        assert!(config_from(&[("PORT", "eighty")]).is_err());
        assert!(config_from(&[("LEGACY_CARD_TYPES", "maybe")]).is_err());
    }
}
