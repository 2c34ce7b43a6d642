//! Message-text classification of dependency failures.
//!
//! Classification works on the error's rendered message, since the SDK errors
//! callers hand us carry no shared type information. Precedence is fixed:
//! timeout evidence wins over connection evidence, which wins over
//! availability, which wins over missing data, which wins over tool failures.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ErrorKind;

lazy_static! {
    /// Deadline and timeout phrasing ("timed out", "deadline exceeded").
    pub static ref TIMEOUT_PATTERN: Regex = Regex::new(
        r"(?i)\b(timed?\s*out|timeout|deadline)\b"
    ).unwrap();

    /// Transport-level connectivity failures.
    pub static ref CONNECTION_PATTERN: Regex = Regex::new(
        r"(?i)\b(connection|connect|network|socket|dns|unreachable|refused|reset by peer|broken pipe)\b"
    ).unwrap();

    /// Upstream shedding or outage signals, including the 5xx family.
    pub static ref UNAVAILABLE_PATTERN: Regex = Regex::new(
        r"(?i)\b(unavailable|overloaded|maintenance|rate[ _-]?limit(ed)?|too many requests|bad gateway)\b|\b50[234]\b"
    ).unwrap();

    /// Missing-data answers ("not found", 404, "no such ...").
    pub static ref NOT_FOUND_PATTERN: Regex = Regex::new(
        r"(?i)\bnot\s+found\b|\b404\b|\bno such\b|\bdoes not exist\b|\bmissing\b"
    ).unwrap();

    /// Failures the dependency reports about its own tools or integrations.
    pub static ref TOOL_FAILURE_PATTERN: Regex = Regex::new(
        r"(?i)\b(tool|lookup|integration|function)\b.{0,40}\b(fail(ed|ure)?|error|crash(ed)?)\b"
    ).unwrap();
}

/// Classify an error message into an [`ErrorKind`].
///
/// Total over arbitrary input; anything unrecognized is `Generic`.
pub fn classify_message(message: &str) -> ErrorKind {
    if TIMEOUT_PATTERN.is_match(message) {
        ErrorKind::Timeout
    } else if CONNECTION_PATTERN.is_match(message) {
        ErrorKind::ConnectionIssue
    } else if UNAVAILABLE_PATTERN.is_match(message) {
        ErrorKind::ServiceUnavailable
    } else if NOT_FOUND_PATTERN.is_match(message) {
        ErrorKind::DataNotFound
    } else if TOOL_FAILURE_PATTERN.is_match(message) {
        ErrorKind::ToolFailure
    } else {
        ErrorKind::Generic
    }
}
