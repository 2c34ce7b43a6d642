//! Failure taxonomy for protected dependency calls.
//!
//! Every failure that moves through the resilience pipeline is a [`CallError`]
//! carrying an [`ErrorKind`]. The kind decides retry eligibility, breaker
//! accounting, and which fallback response the user ultimately hears.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::classify;

/// Category of a dependency failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A tool or integration ran but produced an unusable result
    ToolFailure,

    /// Transport-level trouble reaching the dependency
    ConnectionIssue,

    /// An attempt exceeded its deadline
    Timeout,

    /// The dependency is shedding load or down for maintenance
    ServiceUnavailable,

    /// The dependency answered but had no matching data
    DataNotFound,

    /// Anything that fits no other category
    Generic,
}

impl ErrorKind {
    /// All kinds in a stable order.
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::ToolFailure,
        ErrorKind::ConnectionIssue,
        ErrorKind::Timeout,
        ErrorKind::ServiceUnavailable,
        ErrorKind::DataNotFound,
        ErrorKind::Generic,
    ];

    /// Stable snake_case name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ToolFailure => "tool_failure",
            ErrorKind::ConnectionIssue => "connection_issue",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::DataNotFound => "data_not_found",
            ErrorKind::Generic => "generic",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure from a dependency call.
///
/// Callers hand Backstop opaque errors from arbitrary SDKs; this type is the
/// one currency the retry, breaker, and facade layers all understand. The
/// original error, when available, stays reachable through `source()`.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CallError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CallError {
    /// Create an error with an explicit kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create an error whose kind is inferred from the message text.
    pub fn classified(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = classify::classify_message(&message);
        Self {
            kind,
            message,
            source: None,
        }
    }

    /// Create a timeout error for an attempt that exceeded its deadline.
    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("attempt timed out after {:?}", after),
        )
    }

    /// Attach the underlying error for `source()` chains.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The failure category.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The human-readable message. Never shown to end users directly.
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ServiceUnavailable).unwrap();
        assert_eq!(json, "\"service_unavailable\"");

        let kind: ErrorKind = serde_json::from_str("\"data_not_found\"").unwrap();
        assert_eq!(kind, ErrorKind::DataNotFound);
    }

    #[test]
    fn test_display_matches_serialized_form() {
        for kind in ErrorKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }

    #[test]
    fn test_classified_infers_kind_from_message() {
        let err = CallError::classified("connection refused by upstream");
        assert_eq!(err.kind(), ErrorKind::ConnectionIssue);

        let err = CallError::classified("nothing to see here");
        assert_eq!(err.kind(), ErrorKind::Generic);
    }

    #[test]
    fn test_timeout_constructor() {
        let err = CallError::timeout(Duration::from_secs(5));
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.message().contains("5s"));
    }

    #[test]
    fn test_source_is_retrievable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = CallError::with_source(ErrorKind::ConnectionIssue, "calendar fetch failed", io);

        let source = std::error::Error::source(&err);
        assert!(source.is_some());
        assert!(source.unwrap().to_string().contains("reset by peer"));
    }
}
