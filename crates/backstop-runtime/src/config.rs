//! Runtime configuration.
//!
//! One [`GuardConfig`] document describes the cost ceilings, the default
//! breaker thresholds plus per-dependency overrides, and the retry policy.
//! Durations are written as human strings (`30s`, `250ms`) in YAML or JSON.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::breaker::{BreakerRegistry, CircuitBreakerConfig};
use crate::budget::CostLedger;
use crate::notify::Notifier;
use crate::retry::RetryPolicy;

/// Serde adapter for human-readable duration strings.
pub(crate) mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level resilience settings. Every field has a usable default, so an
/// empty document is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Ceiling on total spend per UTC day, in dollars
    pub daily_cost_limit: f64,

    /// Ceiling per conversation, in dollars; `null` disables it
    pub session_cost_limit: Option<f64>,

    /// Breaker thresholds applied to any dependency without an override
    pub circuit_breaker: CircuitBreakerConfig,

    /// Per-dependency breaker overrides, keyed by dependency name
    pub breakers: BTreeMap<String, CircuitBreakerConfig>,

    /// Default retry policy for protected calls
    pub retry: RetryPolicy,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            daily_cost_limit: 100.0,
            session_cost_limit: Some(5.0),
            circuit_breaker: CircuitBreakerConfig::default(),
            breakers: BTreeMap::new(),
            retry: RetryPolicy::default(),
        }
    }
}

impl GuardConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.daily_cost_limit.is_finite() || self.daily_cost_limit < 0.0 {
            return Err(ConfigError::Invalid(
                "daily_cost_limit must be a non-negative number".to_string(),
            ));
        }
        if let Some(limit) = self.session_cost_limit {
            if !limit.is_finite() || limit < 0.0 {
                return Err(ConfigError::Invalid(
                    "session_cost_limit must be a non-negative number".to_string(),
                ));
            }
        }
        validate_breaker("circuit_breaker", &self.circuit_breaker)?;
        for (name, config) in &self.breakers {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "breaker overrides must be keyed by dependency name".to_string(),
                ));
            }
            validate_breaker(name, config)?;
        }
        if self.retry.max_delay < self.retry.base_delay {
            return Err(ConfigError::Invalid(
                "retry.max_delay must be at least retry.base_delay".to_string(),
            ));
        }
        Ok(())
    }

    /// Breaker registry seeded with this config's defaults and overrides.
    pub fn build_registry(&self, notifier: Arc<dyn Notifier>) -> BreakerRegistry {
        BreakerRegistry::new(self.circuit_breaker.clone(), notifier)
            .with_overrides(self.breakers.clone())
    }

    pub fn build_ledger(&self, notifier: Arc<dyn Notifier>) -> CostLedger {
        CostLedger::new(self.daily_cost_limit, notifier)
    }
}

fn validate_breaker(label: &str, config: &CircuitBreakerConfig) -> Result<(), ConfigError> {
    if config.failure_threshold == 0 {
        return Err(ConfigError::Invalid(format!(
            "{label}: failure_threshold must be at least 1"
        )));
    }
    if config.success_threshold == 0 {
        return Err(ConfigError::Invalid(format!(
            "{label}: success_threshold must be at least 1"
        )));
    }
    if let Some(kinds) = &config.tracked_kinds {
        if kinds.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "{label}: tracked_kinds must name at least one error kind"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use backstop_core::ErrorKind;
    use std::collections::BTreeSet;
    use std::time::Duration;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = GuardConfig::from_yaml("{}").expect("empty config");
        assert_eq!(config.daily_cost_limit, 100.0);
        assert_eq!(config.session_cost_limit, Some(5.0));
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(
            config.circuit_breaker.recovery_timeout,
            Duration::from_secs(30)
        );
        assert_eq!(config.retry.max_retries, 3);
        assert!(config.breakers.is_empty());
    }

    #[test]
    fn test_full_yaml_document_parses() {
        let text = r#"
daily_cost_limit: 250.0
session_cost_limit: 8.0
circuit_breaker:
  failure_threshold: 5
  recovery_timeout: 45s
  success_threshold: 3
breakers:
  tts:
    failure_threshold: 2
    recovery_timeout: 10s
retry:
  max_retries: 2
  base_delay: 250ms
  max_delay: 4s
  jitter: false
  retryable: [connection_issue, timeout, service_unavailable]
"#;
        let config = GuardConfig::from_yaml(text).expect("parse");

        assert_eq!(config.daily_cost_limit, 250.0);
        assert_eq!(config.session_cost_limit, Some(8.0));
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(
            config.circuit_breaker.recovery_timeout,
            Duration::from_secs(45)
        );

        let tts = config.breakers.get("tts").expect("tts override");
        assert_eq!(tts.failure_threshold, 2);
        assert_eq!(tts.recovery_timeout, Duration::from_secs(10));
        // Fields missing from an override fall back to type defaults.
        assert_eq!(tts.success_threshold, 2);

        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
        assert!(!config.retry.jitter);
        assert_eq!(
            config.retry.retryable,
            Some(BTreeSet::from([
                ErrorKind::ConnectionIssue,
                ErrorKind::Timeout,
                ErrorKind::ServiceUnavailable,
            ]))
        );
    }

    #[test]
    fn test_explicit_null_disables_session_ceiling() {
        let config = GuardConfig::from_yaml("session_cost_limit: null").expect("parse");
        assert_eq!(config.session_cost_limit, None);
    }

    #[test]
    fn test_from_json_parses() {
        let config =
            GuardConfig::from_json(r#"{"daily_cost_limit": 42.0}"#).expect("parse json");
        assert_eq!(config.daily_cost_limit, 42.0);
    }

    #[test]
    fn test_zero_failure_threshold_rejected() {
        let err = GuardConfig::from_yaml("circuit_breaker:\n  failure_threshold: 0")
            .expect_err("should fail validation");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_inverted_delay_bounds_rejected() {
        let err = GuardConfig::from_yaml("retry:\n  base_delay: 10s\n  max_delay: 1s")
            .expect_err("should fail validation");
        assert!(err.to_string().contains("max_delay"));
    }

    #[test]
    fn test_negative_daily_limit_rejected() {
        let err =
            GuardConfig::from_yaml("daily_cost_limit: -1.0").expect_err("should fail validation");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_empty_tracked_kinds_rejected() {
        let err = GuardConfig::from_yaml("circuit_breaker:\n  tracked_kinds: []")
            .expect_err("should fail validation");
        assert!(err.to_string().contains("tracked_kinds"));
    }

    #[test]
    fn test_duration_fields_round_trip_through_yaml() {
        let mut config = GuardConfig::default();
        config.circuit_breaker.recovery_timeout = Duration::from_secs(90);
        config.retry.base_delay = Duration::from_millis(250);

        let text = serde_yaml::to_string(&config).expect("serialize");
        let parsed = GuardConfig::from_yaml(&text).expect("parse back");

        assert_eq!(
            parsed.circuit_breaker.recovery_timeout,
            Duration::from_secs(90)
        );
        assert_eq!(parsed.retry.base_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_malformed_yaml_reports_parse_error() {
        let err = GuardConfig::from_yaml("daily_cost_limit: [not a number")
            .expect_err("should fail to parse");
        assert!(matches!(err, ConfigError::Yaml(_)));
    }
}
