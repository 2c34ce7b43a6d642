//! # backstop-runtime
//!
//! Async resilience runtime keeping live conversations coherent while the
//! services behind them misbehave.
//!
//! Every external call routes through a [`Protector`], which answers:
//! - Is this dependency healthy enough to try?
//! - How many times, and how patiently, do we retry?
//! - Can we still afford the call today?
//! - What does the session say out loud if all of that fails?
//!
//! ## Key Guarantees
//!
//! 1. **Errors never escape**: a protected call returns the value or speakable fallback text
//! 2. **State stays coherent**: failed or cancelled calls roll the session back to a snapshot
//! 3. **Failures stay contained**: every dependency gets its own circuit breaker
//! 4. **Spend stays bounded**: charges are refused before a ceiling is crossed, never after
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use backstop_runtime::{
//!     CallOutcome, CallRequest, FnOperation, GuardConfig, LogNotifier, Notifier,
//!     Protector, SessionHandle,
//! };
//!
//! let config = GuardConfig::from_yaml_file("backstop.yaml")?;
//! let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
//! let protector = Protector::builder()
//!     .registry(Arc::new(config.build_registry(Arc::clone(&notifier))))
//!     .ledger(Arc::new(config.build_ledger(Arc::clone(&notifier))))
//!     .session(Arc::new(SessionHandle::default()))
//!     .build()?;
//!
//! let op = FnOperation::new(|| Box::pin(async { crm_lookup("acme").await }));
//! let request = CallRequest::new("crm").cost_estimate(0.002);
//! match protector.call(request, op).await {
//!     CallOutcome::Success(record) => speak(&record.summary),
//!     CallOutcome::Fallback { response, .. } => speak(&response),
//! }
//! ```

pub mod breaker;
pub mod budget;
pub mod config;
pub mod facade;
pub mod notify;
pub mod op;
pub mod preserve;
pub mod retry;

// Re-export main types at crate root
pub use breaker::{
    BreakerError, BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitOpenError,
    CircuitState, FailureKind,
};
pub use budget::{
    estimate_llm_cost, estimate_stt_cost, estimate_tts_cost, CostLedger, SessionSpend,
};
pub use config::{ConfigError, GuardConfig};
pub use facade::{BuildError, CallOutcome, CallRequest, Protector, ProtectorBuilder};
pub use notify::{LogNotifier, Notifier, Severity};
pub use op::{FnOperation, Operation, TimedOperation};
pub use preserve::{RestoreGuard, SessionHandle};
pub use retry::{RetryError, RetryExecutor, RetryPolicy};

// Core vocabulary, re-exported so runtime callers need only this crate
pub use backstop_core::{
    CallError, ConversationState, ErrorKind, RandomSource, ResponseCatalog, StateSnapshot,
};
