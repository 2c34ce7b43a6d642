//! Per-dependency circuit breaker.
//!
//! Tracks consecutive failures per dependency and moves through three
//! states: `Closed` (calls flow), `Open` (calls rejected without touching
//! the dependency), and `HalfOpen` (a limited number of probe calls decide
//! whether to close again). A breaker counts logical operations; retries
//! inside one protected call register as a single failure.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use backstop_core::{CallError, ErrorKind};

use crate::notify::{Notifier, Severity};
use crate::retry::RetryError;

/// Thresholds governing one breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive tracked failures before the circuit opens
    pub failure_threshold: u32,

    /// How long an open circuit waits before allowing probe calls
    #[serde(with = "crate::config::duration_str")]
    pub recovery_timeout: Duration,

    /// Successful probes required to close a half-open circuit
    pub success_threshold: u32,

    /// Kinds that count toward opening; `None` tracks everything
    pub tracked_kinds: Option<BTreeSet<ErrorKind>>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
            tracked_kinds: None,
        }
    }
}

/// Where a breaker currently sits.
///
/// `Open` keeps the most recent failure time; the recovery window is
/// measured from there, so failures during the open period push recovery
/// further out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed { failures: u32 },
    Open { last_failure: Instant },
    HalfOpen { successes: u32 },
}

/// Rejection issued while a circuit is open. The dependency was not invoked.
#[derive(Debug, Error)]
#[error("circuit for {dependency} is open, retry in {retry_after:?}")]
pub struct CircuitOpenError {
    pub dependency: String,
    pub retry_after: Duration,
}

/// Outcome of a call routed through a breaker: either the circuit rejected
/// it up front, or the underlying operation ran and failed.
#[derive(Debug, Error)]
pub enum BreakerError<E: std::error::Error + 'static> {
    #[error("{0}")]
    Open(#[from] CircuitOpenError),

    #[error(transparent)]
    Inner(E),
}

/// Maps an error to the [`ErrorKind`] the breaker should count it as.
pub trait FailureKind {
    fn failure_kind(&self) -> ErrorKind;
}

impl FailureKind for CallError {
    fn failure_kind(&self) -> ErrorKind {
        self.kind()
    }
}

impl FailureKind for RetryError {
    fn failure_kind(&self) -> ErrorKind {
        self.cause.kind()
    }
}

/// Circuit breaker guarding one named dependency.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<CircuitState>,
    notifier: Arc<dyn Notifier>,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(CircuitState::Closed { failures: 0 }),
            notifier,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        *self.state.lock()
    }

    /// Forces the circuit closed and clears the failure streak.
    pub fn reset(&self) {
        *self.state.lock() = CircuitState::Closed { failures: 0 };
    }

    /// Routes one logical operation through the circuit.
    ///
    /// An open circuit rejects without invoking `op`. Failures whose kind is
    /// not tracked pass through to the caller without moving the state.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: FailureKind + std::error::Error + 'static,
    {
        self.check_gate()?;
        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                if self.is_tracked(err.failure_kind()) {
                    self.record_failure();
                }
                Err(BreakerError::Inner(err))
            }
        }
    }

    fn is_tracked(&self, kind: ErrorKind) -> bool {
        match &self.config.tracked_kinds {
            Some(kinds) => kinds.contains(&kind),
            None => true,
        }
    }

    fn check_gate(&self) -> Result<(), CircuitOpenError> {
        let mut state = self.state.lock();
        if let CircuitState::Open { last_failure } = *state {
            let elapsed = last_failure.elapsed();
            if elapsed < self.config.recovery_timeout {
                return Err(CircuitOpenError {
                    dependency: self.name.clone(),
                    retry_after: self.config.recovery_timeout - elapsed,
                });
            }
            *state = CircuitState::HalfOpen { successes: 0 };
            drop(state);
            tracing::info!(dependency = %self.name, "Circuit half-open, probing dependency");
        }
        Ok(())
    }

    fn record_success(&self) {
        let mut state = self.state.lock();
        match *state {
            CircuitState::Closed { failures } if failures > 0 => {
                *state = CircuitState::Closed { failures: 0 };
            }
            CircuitState::HalfOpen { successes } => {
                let successes = successes + 1;
                if successes >= self.config.success_threshold {
                    *state = CircuitState::Closed { failures: 0 };
                    drop(state);
                    tracing::info!(dependency = %self.name, "Circuit closed after successful probes");
                } else {
                    *state = CircuitState::HalfOpen { successes };
                }
            }
            _ => {}
        }
    }

    fn record_failure(&self) {
        let mut state = self.state.lock();
        match *state {
            CircuitState::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.config.failure_threshold {
                    *state = CircuitState::Open {
                        last_failure: Instant::now(),
                    };
                    drop(state);
                    tracing::warn!(
                        dependency = %self.name,
                        failures,
                        "Circuit opened after repeated failures"
                    );
                    self.notifier.notify(
                        &format!(
                            "circuit for {} opened after {} consecutive failures",
                            self.name, failures
                        ),
                        Severity::Critical,
                    );
                } else {
                    *state = CircuitState::Closed { failures };
                }
            }
            CircuitState::HalfOpen { .. } => {
                *state = CircuitState::Open {
                    last_failure: Instant::now(),
                };
                drop(state);
                tracing::warn!(dependency = %self.name, "Probe failed, circuit reopened");
                self.notifier.notify(
                    &format!("circuit for {} reopened after failed probe", self.name),
                    Severity::Critical,
                );
            }
            CircuitState::Open { .. } => {
                // Late failure from a probe that raced another; refresh the window.
                *state = CircuitState::Open {
                    last_failure: Instant::now(),
                };
            }
        }
    }
}

/// Lazily creates and hands out one breaker per dependency name.
///
/// Named overrides take precedence over the default config at creation
/// time. Breakers are never dropped for the lifetime of the registry.
pub struct BreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    default_config: CircuitBreakerConfig,
    overrides: BTreeMap<String, CircuitBreakerConfig>,
    notifier: Arc<dyn Notifier>,
}

impl BreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            default_config,
            overrides: BTreeMap::new(),
            notifier,
        }
    }

    pub fn with_overrides(mut self, overrides: BTreeMap<String, CircuitBreakerConfig>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Returns the breaker for `name`, creating it on first use.
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(name) {
            return Arc::clone(breaker);
        }
        let mut breakers = self.breakers.write();
        Arc::clone(breakers.entry(name.to_string()).or_insert_with(|| {
            let config = self
                .overrides
                .get(name)
                .cloned()
                .unwrap_or_else(|| self.default_config.clone());
            Arc::new(CircuitBreaker::new(
                name,
                config,
                Arc::clone(&self.notifier),
            ))
        }))
    }

    /// State of an existing breaker, if one has been created for `name`.
    pub fn state(&self, name: &str) -> Option<CircuitState> {
        self.breakers.read().get(name).map(|b| b.state())
    }

    pub fn reset_all(&self) {
        for breaker in self.breakers.read().values() {
            breaker.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct RecordingNotifier {
        events: Mutex<Vec<(String, Severity)>>,
    }

    impl RecordingNotifier {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }

        fn events(&self) -> Vec<(String, Severity)> {
            self.events.lock().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, message: &str, severity: Severity) {
            self.events.lock().push((message.to_string(), severity));
        }
    }

    fn breaker_with(config: CircuitBreakerConfig) -> CircuitBreaker {
        CircuitBreaker::new("calendar", config, Arc::new(LogNotifier))
    }

    async fn fail(breaker: &CircuitBreaker, kind: ErrorKind) {
        let result = breaker
            .call(|| async move { Err::<(), _>(CallError::new(kind, "boom")) })
            .await;
        assert!(matches!(result, Err(BreakerError::Inner(_))));
    }

    async fn succeed(breaker: &CircuitBreaker) {
        let result = breaker.call(|| async { Ok::<_, CallError>(()) }).await;
        assert!(result.is_ok());
    }

    #[test]
    fn test_starts_closed_with_no_failures() {
        let breaker = breaker_with(CircuitBreakerConfig::default());
        assert!(matches!(
            breaker.state(),
            CircuitState::Closed { failures: 0 }
        ));
    }

    #[tokio::test]
    async fn test_opens_after_consecutive_failures_and_notifies() {
        let notifier = Arc::new(RecordingNotifier::new());
        let breaker = CircuitBreaker::new(
            "crm",
            CircuitBreakerConfig::default(),
            Arc::clone(&notifier) as Arc<dyn Notifier>,
        );

        for _ in 0..3 {
            fail(&breaker, ErrorKind::ConnectionIssue).await;
        }

        assert!(matches!(breaker.state(), CircuitState::Open { .. }));
        let events = notifier.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1, Severity::Critical);
        assert!(events[0].0.contains("crm"));
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let breaker = breaker_with(CircuitBreakerConfig::default());

        fail(&breaker, ErrorKind::Timeout).await;
        fail(&breaker, ErrorKind::Timeout).await;
        succeed(&breaker).await;
        fail(&breaker, ErrorKind::Timeout).await;
        fail(&breaker, ErrorKind::Timeout).await;

        assert!(matches!(
            breaker.state(),
            CircuitState::Closed { failures: 2 }
        ));
    }

    #[tokio::test]
    async fn test_open_circuit_rejects_without_invoking() {
        let breaker = breaker_with(CircuitBreakerConfig::default());
        for _ in 0..3 {
            fail(&breaker, ErrorKind::ToolFailure).await;
        }

        let calls = AtomicU32::new(0);
        let result = breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CallError>(())
            })
            .await;

        match result {
            Err(BreakerError::Open(open)) => {
                assert_eq!(open.dependency, "calendar");
                assert!(open.retry_after > Duration::ZERO);
            }
            other => panic!("expected open rejection, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_half_open_closes_after_success_quota() {
        let breaker = breaker_with(CircuitBreakerConfig {
            recovery_timeout: Duration::from_millis(20),
            ..CircuitBreakerConfig::default()
        });
        for _ in 0..3 {
            fail(&breaker, ErrorKind::ConnectionIssue).await;
        }

        tokio::time::sleep(Duration::from_millis(40)).await;

        succeed(&breaker).await;
        assert!(matches!(
            breaker.state(),
            CircuitState::HalfOpen { successes: 1 }
        ));
        succeed(&breaker).await;
        assert!(matches!(
            breaker.state(),
            CircuitState::Closed { failures: 0 }
        ));
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let notifier = Arc::new(RecordingNotifier::new());
        let breaker = CircuitBreaker::new(
            "stt",
            CircuitBreakerConfig {
                recovery_timeout: Duration::from_millis(20),
                ..CircuitBreakerConfig::default()
            },
            Arc::clone(&notifier) as Arc<dyn Notifier>,
        );
        for _ in 0..3 {
            fail(&breaker, ErrorKind::ConnectionIssue).await;
        }

        tokio::time::sleep(Duration::from_millis(40)).await;
        fail(&breaker, ErrorKind::ConnectionIssue).await;

        assert!(matches!(breaker.state(), CircuitState::Open { .. }));
        assert_eq!(notifier.events().len(), 2);
    }

    #[tokio::test]
    async fn test_untracked_kind_passes_through_without_counting() {
        let breaker = breaker_with(CircuitBreakerConfig {
            tracked_kinds: Some(BTreeSet::from([ErrorKind::ConnectionIssue])),
            ..CircuitBreakerConfig::default()
        });

        for _ in 0..5 {
            fail(&breaker, ErrorKind::DataNotFound).await;
        }

        assert!(matches!(
            breaker.state(),
            CircuitState::Closed { failures: 0 }
        ));
    }

    #[tokio::test]
    async fn test_registry_reuses_breaker_per_name() {
        let registry =
            BreakerRegistry::new(CircuitBreakerConfig::default(), Arc::new(LogNotifier));

        let first = registry.breaker("calendar");
        let second = registry.breaker("calendar");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.state("crm").is_none());
    }

    #[tokio::test]
    async fn test_registry_applies_named_override() {
        let overrides = BTreeMap::from([(
            "tts".to_string(),
            CircuitBreakerConfig {
                failure_threshold: 1,
                ..CircuitBreakerConfig::default()
            },
        )]);
        let registry = BreakerRegistry::new(CircuitBreakerConfig::default(), Arc::new(LogNotifier))
            .with_overrides(overrides);

        let tts = registry.breaker("tts");
        fail(&tts, ErrorKind::ServiceUnavailable).await;
        assert!(matches!(tts.state(), CircuitState::Open { .. }));

        // Sibling dependencies keep the default threshold.
        let crm = registry.breaker("crm");
        fail(&crm, ErrorKind::ServiceUnavailable).await;
        assert!(matches!(crm.state(), CircuitState::Closed { failures: 1 }));
    }

    #[tokio::test]
    async fn test_reset_all_closes_every_breaker() {
        let registry = BreakerRegistry::new(
            CircuitBreakerConfig {
                failure_threshold: 1,
                ..CircuitBreakerConfig::default()
            },
            Arc::new(LogNotifier),
        );

        fail(&registry.breaker("a"), ErrorKind::Timeout).await;
        fail(&registry.breaker("b"), ErrorKind::Timeout).await;
        registry.reset_all();

        assert!(matches!(
            registry.state("a"),
            Some(CircuitState::Closed { failures: 0 })
        ));
        assert!(matches!(
            registry.state("b"),
            Some(CircuitState::Closed { failures: 0 })
        ));
    }
}
