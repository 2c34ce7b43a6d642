//! Protected-call facade.
//!
//! [`Protector::call`] is the single entry point a session uses to reach an
//! external dependency. It stacks the guards in a fixed order: session and
//! daily cost ceilings, state snapshot, circuit breaker, retry executor.
//! Whatever happens inside, the caller gets back a [`CallOutcome`] that is
//! either the operation's value or speakable fallback text; errors never
//! escape to the conversation layer.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use backstop_core::{ErrorKind, OsRandom, RandomSource, ResponseCatalog};

use crate::breaker::{BreakerError, BreakerRegistry};
use crate::budget::{CostLedger, SessionSpend};
use crate::notify::{LogNotifier, Notifier, Severity};
use crate::op::{Operation, TimedOperation};
use crate::preserve::{RestoreGuard, SessionHandle};
use crate::retry::{RetryExecutor, RetryPolicy};

/// Per-call parameters. Everything beyond the dependency name is optional.
#[derive(Debug, Clone)]
pub struct CallRequest {
    /// Dependency name; selects the breaker and labels the logs
    pub dependency: String,

    /// Literal fallback text; when set, the catalog is bypassed
    pub fallback: Option<String>,

    /// Estimated cost in dollars, charged before the call runs
    pub cost_estimate: f64,

    /// Retry policy for this call; defaults to the facade's policy
    pub retry_policy: Option<RetryPolicy>,

    /// Deadline applied to each individual attempt
    pub attempt_timeout: Option<Duration>,

    /// Kind to respond with when the failure classifies as `Generic`
    pub failure_hint: ErrorKind,
}

impl CallRequest {
    pub fn new(dependency: impl Into<String>) -> Self {
        Self {
            dependency: dependency.into(),
            fallback: None,
            cost_estimate: 0.0,
            retry_policy: None,
            attempt_timeout: None,
            failure_hint: ErrorKind::Generic,
        }
    }

    pub fn fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    pub fn cost_estimate(mut self, estimate: f64) -> Self {
        self.cost_estimate = estimate;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn attempt_timeout(mut self, deadline: Duration) -> Self {
        self.attempt_timeout = Some(deadline);
        self
    }

    pub fn failure_hint(mut self, kind: ErrorKind) -> Self {
        self.failure_hint = kind;
        self
    }
}

/// What the session layer gets back from a protected call.
#[derive(Debug)]
pub enum CallOutcome<T> {
    /// The operation succeeded within budget
    Success(T),

    /// The call was absorbed; speak `response` and carry on
    Fallback { response: String, kind: ErrorKind },
}

impl<T> CallOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }

    pub fn into_success(self) -> Option<T> {
        match self {
            CallOutcome::Success(value) => Some(value),
            CallOutcome::Fallback { .. } => None,
        }
    }

    pub fn fallback_response(&self) -> Option<&str> {
        match self {
            CallOutcome::Success(_) => None,
            CallOutcome::Fallback { response, .. } => Some(response),
        }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("missing component: {0}")]
    Missing(&'static str),
}

/// Unified guard around every external dependency a session talks to.
///
/// Construct one per session via [`Protector::builder`]; the registry and
/// ledger are shared across sessions, the handle and spend meter are not.
pub struct Protector {
    registry: Arc<BreakerRegistry>,
    ledger: Arc<CostLedger>,
    session: Arc<SessionHandle>,
    session_spend: SessionSpend,
    notifier: Arc<dyn Notifier>,
    catalog: ResponseCatalog,
    responder_rng: Mutex<Box<dyn RandomSource + Send>>,
    retry: RetryExecutor,
    default_retry: RetryPolicy,
}

impl std::fmt::Debug for Protector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protector").finish_non_exhaustive()
    }
}

impl Protector {
    pub fn builder() -> ProtectorBuilder {
        ProtectorBuilder::new()
    }

    pub fn session(&self) -> &Arc<SessionHandle> {
        &self.session
    }

    pub fn registry(&self) -> &Arc<BreakerRegistry> {
        &self.registry
    }

    pub fn ledger(&self) -> &Arc<CostLedger> {
        &self.ledger
    }

    pub fn session_spend(&self) -> &SessionSpend {
        &self.session_spend
    }

    /// Runs `op` behind the full guard stack.
    ///
    /// Ordering: the cost ceilings veto first (no snapshot, no breaker
    /// traffic), then the state is snapshotted, then the breaker gates the
    /// retried operation. Failure restores the snapshot and maps the error
    /// kind to fallback text; an open circuit skips the operation entirely.
    pub async fn call<O: Operation>(&self, request: CallRequest, op: O) -> CallOutcome<O::Output> {
        match request.attempt_timeout {
            Some(deadline) => {
                self.call_inner(request, TimedOperation::new(op, deadline))
                    .await
            }
            None => self.call_inner(request, op).await,
        }
    }

    async fn call_inner<O: Operation>(
        &self,
        request: CallRequest,
        mut op: O,
    ) -> CallOutcome<O::Output> {
        if request.cost_estimate > 0.0 {
            if !self.session_spend.try_charge(request.cost_estimate) {
                tracing::warn!(
                    dependency = %request.dependency,
                    estimate = request.cost_estimate,
                    spent = self.session_spend.spent(),
                    "Session cost ceiling rejected call"
                );
                self.notifier.notify(
                    &format!(
                        "session cost ceiling reached: rejected call to {} estimated at ${:.2}",
                        request.dependency, request.cost_estimate
                    ),
                    Severity::Warning,
                );
                return self.respond(request, ErrorKind::ServiceUnavailable);
            }
            if !self.ledger.check_budget_before_call(request.cost_estimate) {
                // The ledger already notified; back out the session charge
                // since the call never happens.
                self.session_spend.refund(request.cost_estimate);
                return self.respond(request, ErrorKind::ServiceUnavailable);
            }
        }

        let mut guard = RestoreGuard::arm(Arc::clone(&self.session));
        let breaker = self.registry.breaker(&request.dependency);
        let policy = request
            .retry_policy
            .clone()
            .unwrap_or_else(|| self.default_retry.clone());

        let result = breaker
            .call(|| self.retry.run(&request.dependency, &policy, &mut op))
            .await;

        match result {
            Ok(value) => {
                guard.disarm();
                CallOutcome::Success(value)
            }
            Err(BreakerError::Open(open)) => {
                // The operation never ran, so the snapshot has nothing to
                // undo.
                guard.disarm();
                tracing::warn!(
                    dependency = %request.dependency,
                    retry_after_ms = open.retry_after.as_millis() as u64,
                    "Call rejected by open circuit"
                );
                self.respond(request, ErrorKind::ServiceUnavailable)
            }
            Err(BreakerError::Inner(err)) => {
                guard.restore_now();
                let mut kind = err.cause.kind();
                if kind == ErrorKind::Generic {
                    kind = request.failure_hint;
                }
                tracing::warn!(
                    dependency = %request.dependency,
                    attempts = err.attempts,
                    kind = ?kind,
                    error = %err,
                    "Protected call failed, responding with fallback"
                );
                self.respond(request, kind)
            }
        }
    }

    fn respond<T>(&self, request: CallRequest, kind: ErrorKind) -> CallOutcome<T> {
        let response = match request.fallback {
            Some(text) => text,
            None => {
                let mut rng = self.responder_rng.lock();
                self.catalog.pick(kind, &mut **rng)
            }
        };
        CallOutcome::Fallback { response, kind }
    }
}

/// Assembles a [`Protector`] from shared and per-session parts.
pub struct ProtectorBuilder {
    registry: Option<Arc<BreakerRegistry>>,
    ledger: Option<Arc<CostLedger>>,
    session: Option<Arc<SessionHandle>>,
    session_spend: Option<SessionSpend>,
    notifier: Arc<dyn Notifier>,
    catalog: ResponseCatalog,
    response_rng: Option<Box<dyn RandomSource + Send>>,
    retry_rng: Option<Box<dyn RandomSource + Send>>,
    default_retry: RetryPolicy,
}

impl ProtectorBuilder {
    pub fn new() -> Self {
        Self {
            registry: None,
            ledger: None,
            session: None,
            session_spend: None,
            notifier: Arc::new(LogNotifier),
            catalog: ResponseCatalog::default(),
            response_rng: None,
            retry_rng: None,
            default_retry: RetryPolicy::default(),
        }
    }

    pub fn registry(mut self, registry: Arc<BreakerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn ledger(mut self, ledger: Arc<CostLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn session(mut self, session: Arc<SessionHandle>) -> Self {
        self.session = Some(session);
        self
    }

    /// Per-conversation spend meter; defaults to unlimited.
    pub fn session_spend(mut self, spend: SessionSpend) -> Self {
        self.session_spend = Some(spend);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn catalog(mut self, catalog: ResponseCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Randomness for fallback selection; seed it in tests.
    pub fn response_rng(mut self, rng: Box<dyn RandomSource + Send>) -> Self {
        self.response_rng = Some(rng);
        self
    }

    /// Randomness for backoff jitter; seed it in tests.
    pub fn retry_rng(mut self, rng: Box<dyn RandomSource + Send>) -> Self {
        self.retry_rng = Some(rng);
        self
    }

    pub fn default_retry(mut self, policy: RetryPolicy) -> Self {
        self.default_retry = policy;
        self
    }

    pub fn build(self) -> Result<Protector, BuildError> {
        let registry = self
            .registry
            .ok_or(BuildError::Missing("breaker registry"))?;
        let ledger = self.ledger.ok_or(BuildError::Missing("cost ledger"))?;
        let session = self.session.ok_or(BuildError::Missing("session handle"))?;
        Ok(Protector {
            registry,
            ledger,
            session,
            session_spend: self.session_spend.unwrap_or_else(SessionSpend::unlimited),
            notifier: self.notifier,
            catalog: self.catalog,
            responder_rng: Mutex::new(self.response_rng.unwrap_or_else(|| Box::new(OsRandom))),
            retry: match self.retry_rng {
                Some(rng) => RetryExecutor::new(rng),
                None => RetryExecutor::default(),
            },
            default_retry: self.default_retry,
        })
    }
}

impl Default for ProtectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
