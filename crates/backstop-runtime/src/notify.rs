//! Operator notification contract.
//!
//! Breaker opens and budget rejections call out to an alerting collaborator.
//! Delivery (chat, paging, email) is the host's concern; the runtime only
//! defines the call-out and a logging default.

use std::fmt;

/// Urgency of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Degraded but self-healing (budget ceilings, slow dependencies)
    Warning,

    /// A dependency is being bypassed entirely
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Critical => f.write_str("critical"),
        }
    }
}

/// Alerting collaborator invoked when a circuit opens or a cost ceiling is
/// breached.
///
/// Called synchronously from protected-call bookkeeping; implementations must
/// be cheap and non-blocking.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}

/// Default notifier that forwards alerts to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Warning => tracing::warn!(severity = %severity, "{}", message),
            Severity::Critical => tracing::error!(severity = %severity, "{}", message),
        }
    }
}
