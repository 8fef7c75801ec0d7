use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default interval between poll requests
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Client-wide settings.
///
/// Deserializable so that hosts can load it from their own configuration
/// files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Prepended to every compiled url (default: `/`)
    pub api_prefix: String,

    /// Merged into every transport request
    pub passthrough: Map<String, Value>,

    /// Merged into transport requests of the named method, after `passthrough`
    pub passthrough_by_method: BTreeMap<String, Map<String, Value>>,

    /// Retry policy for transport calls; `None` disables retries
    pub retry: Option<RetrySettings>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_prefix: "/".to_owned(),
            passthrough: Map::new(),
            passthrough_by_method: BTreeMap::new(),
            retry: None,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_api_prefix(mut self, api_prefix: impl Into<String>) -> Self {
        self.api_prefix = api_prefix.into();
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = Some(retry);
        self
    }
}

/// Overrides applied by [`crate::ODataClient::clone_with`]. Unset fields are
/// inherited; passthrough maps are merged key by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientOverrides {
    pub api_prefix: Option<String>,
    pub passthrough: Option<Map<String, Value>>,
    pub passthrough_by_method: Option<BTreeMap<String, Map<String, Value>>>,
    pub retry: Option<RetrySettings>,
}

/// Serializable retry limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Delay after the first failure (default: 100ms)
    pub min_delay_ms: u64,
    /// Upper bound for computed delays (default: 10s)
    pub max_delay_ms: u64,
    /// Total attempts including the first (default: 3)
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            min_delay_ms: 100,
            max_delay_ms: 10_000,
            max_attempts: 3,
        }
    }
}

/// Exponential backoff configuration for retries
///
/// Computes delay as: `min(initial * multiplier^retry, max)` with optional jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    /// Initial backoff duration (default: 100ms)
    pub initial: Duration,

    /// Maximum backoff duration (default: 10s)
    pub max: Duration,

    /// Backoff multiplier for exponential growth (default: 2.0)
    pub multiplier: f64,

    /// Adds a random 0-25% to each delay (default: false)
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl ExponentialBackoff {
    /// Create backoff with custom initial and max durations
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            ..Self::default()
        }
    }

    /// Create fast backoff for testing (1ms initial, 100ms max)
    #[must_use]
    pub fn fast() -> Self {
        Self::new(Duration::from_millis(1), Duration::from_millis(100))
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

impl From<&RetrySettings> for ExponentialBackoff {
    fn from(settings: &RetrySettings) -> Self {
        Self::new(
            Duration::from_millis(settings.min_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
        )
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.api_prefix, "/");
        assert!(config.passthrough.is_empty());
        assert!(config.retry.is_none());
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: ClientConfig = serde_json::from_value(serde_json::json!({
            "api_prefix": "/resin/",
            "passthrough_by_method": { "POST": { "timeout": 30 } },
            "retry": { "max_attempts": 5 }
        }))
        .unwrap();
        assert_eq!(config.api_prefix, "/resin/");
        assert_eq!(
            config.retry,
            Some(RetrySettings {
                max_attempts: 5,
                ..RetrySettings::default()
            })
        );
        assert_eq!(config.passthrough_by_method["POST"]["timeout"], 30);
    }

    #[test]
    fn test_backoff_from_settings() {
        let backoff = ExponentialBackoff::from(&RetrySettings {
            min_delay_ms: 10,
            max_delay_ms: 100,
            max_attempts: 3,
        });
        assert_eq!(backoff.initial, Duration::from_millis(10));
        assert_eq!(backoff.max, Duration::from_millis(100));
        assert!(!backoff.jitter);
    }
}
