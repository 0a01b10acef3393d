//! Dispatcher configuration
//!
//! ```toml
//! error_policy = "fail_fast"
//! default_wait_timeout_ms = 5000
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, DispatchResult};

/// What `emit` does when a handler returns an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Finish the remaining handlers of the failing tier, then return the
    /// first error. Later tiers are skipped.
    #[default]
    Isolate,
    /// Return the first error immediately.
    FailFast,
}

/// Settings for a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Handler error policy for `emit`
    #[serde(default)]
    pub error_policy: ErrorPolicy,

    /// Timeout applied to `wait_for` calls that don't set their own
    #[serde(default)]
    pub default_wait_timeout_ms: Option<u64>,
}

impl DispatcherConfig {
    /// Parse a config from TOML.
    pub fn from_toml_str(source: &str) -> DispatchResult<Self> {
        toml::from_str(source).map_err(|e| DispatchError::Config(e.to_string()))
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn with_default_wait_timeout(mut self, timeout: Duration) -> Self {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.default_wait_timeout_ms = Some(millis);
        self
    }

    pub fn default_wait_timeout(&self) -> Option<Duration> {
        self.default_wait_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.error_policy, ErrorPolicy::Isolate);
        assert_eq!(config.default_wait_timeout(), None);
    }

    #[test]
    fn test_from_toml() {
        let config = DispatcherConfig::from_toml_str(
            r#"
            error_policy = "fail_fast"
            default_wait_timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.error_policy, ErrorPolicy::FailFast);
        assert_eq!(config.default_wait_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = DispatcherConfig::from_toml_str("").unwrap();
        assert_eq!(config, DispatcherConfig::default());
    }

    #[test]
    fn test_invalid_policy_is_config_error() {
        let err = DispatcherConfig::from_toml_str(r#"error_policy = "retry""#).unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));
    }

    #[test]
    fn test_builders() {
        let config = DispatcherConfig::default()
            .with_error_policy(ErrorPolicy::FailFast)
            .with_default_wait_timeout(Duration::from_secs(2));
        assert_eq!(config.default_wait_timeout_ms, Some(2000));
    }

    #[test]
    fn test_huge_timeout_saturates() {
        let config = DispatcherConfig::default().with_default_wait_timeout(Duration::MAX);
        assert_eq!(config.default_wait_timeout_ms, Some(u64::MAX));
    }
}
