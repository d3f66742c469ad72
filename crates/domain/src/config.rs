//! Configuration management
//!
//! Every section has serde defaults equal to the reference configuration, so
//! a config file only needs to name the values it changes.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BASE_URL, DEFAULT_FAILURE_THRESHOLD, DEFAULT_MAX_PARALLEL, DEFAULT_MAX_QUEUED,
    DEFAULT_MAX_RETRIES, DEFAULT_OPEN_DURATION_SECS, DEFAULT_RETRY_DELAY_MS,
    DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT,
};
use crate::errors::{DomainError, Result};

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub retry: RetrySettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub bulkhead: BulkheadSettings,
}

/// Outbound HTTP configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Headers added to every request that does not already carry them
    pub default_headers: BTreeMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            api_key: None,
            default_headers: BTreeMap::new(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retry policy settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_retries: DEFAULT_MAX_RETRIES, delay_ms: DEFAULT_RETRY_DELAY_MS }
    }
}

impl RetrySettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Circuit breaker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub open_duration_secs: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            open_duration_secs: DEFAULT_OPEN_DURATION_SECS,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn open_duration(&self) -> Duration {
        Duration::from_secs(self.open_duration_secs)
    }
}

/// Bulkhead settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkheadSettings {
    pub max_parallel: usize,
    pub max_queued: usize,
}

impl Default for BulkheadSettings {
    fn default() -> Self {
        Self { max_parallel: DEFAULT_MAX_PARALLEL, max_queued: DEFAULT_MAX_QUEUED }
    }
}

impl Config {
    /// Check values that would make a policy or the transport unusable
    ///
    /// # Errors
    /// Returns `DomainError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let base_url = self.http.base_url.trim();
        if base_url.is_empty() {
            return Err(DomainError::Config("http.base_url must not be empty".to_string()));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(DomainError::Config(format!(
                "http.base_url must start with http:// or https://, got '{base_url}'"
            )));
        }
        if self.http.timeout_secs == 0 {
            return Err(DomainError::Config("http.timeout_secs must be greater than 0".to_string()));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(DomainError::Config(
                "circuit_breaker.failure_threshold must be greater than 0".to_string(),
            ));
        }
        if self.circuit_breaker.open_duration_secs == 0 {
            return Err(DomainError::Config(
                "circuit_breaker.open_duration_secs must be greater than 0".to_string(),
            ));
        }
        if self.bulkhead.max_parallel == 0 {
            return Err(DomainError::Config(
                "bulkhead.max_parallel must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_configuration() {
        let config = Config::default();

        assert_eq!(config.http.base_url, "https://httpstat.us");
        assert_eq!(config.http.timeout(), Duration::from_secs(30));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.delay(), Duration::from_millis(600));
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.open_duration(), Duration::from_secs(30));
        assert_eq!(config.bulkhead.max_parallel, 10);
        assert_eq!(config.bulkhead.max_queued, 1);
        assert!(config.validate().is_ok());
    }

    /// Validates that partial files keep defaults for omitted fields.
    ///
    /// Assertions:
    /// - Only the named values change.
    /// - The API key is read but never serialized back out.
    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
[http]
base_url = "http://localhost:8080"
api_key = "secret"

[retry]
max_retries = 5
"#,
        )
        .expect("valid toml");

        assert_eq!(config.http.base_url, "http://localhost:8080");
        assert_eq!(config.http.api_key.as_deref(), Some("secret"));
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.delay_ms, 600);
        assert_eq!(config.bulkhead, BulkheadSettings::default());

        let json = serde_json::to_string(&config).expect("serialize");
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_validation_rejects_unusable_values() {
        let mut config = Config::default();
        config.http.base_url = "ftp://example.com".to_string();
        assert!(matches!(config.validate(), Err(DomainError::Config(_))));

        let mut config = Config::default();
        config.bulkhead.max_parallel = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bulkhead.max_parallel"));

        let mut config = Config::default();
        config.circuit_breaker.failure_threshold = 0;
        assert!(config.validate().is_err());
    }
}
