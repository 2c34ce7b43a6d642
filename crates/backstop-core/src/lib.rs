//! # backstop-core
//!
//! Deterministic foundations for the Backstop resilience layer.
//!
//! This crate holds everything that does not need an async runtime:
//! - the failure taxonomy ([`ErrorKind`], [`CallError`]) and message-text
//!   classification
//! - voice-appropriate fallback responses ([`ResponseCatalog`])
//! - the conversation-state record with snapshot/restore
//!   ([`ConversationState`], [`StateSnapshot`])
//! - injectable randomness ([`RandomSource`]) so selection and jitter are
//!   testable
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: with a seeded [`RandomSource`], same input always
//!    produces the same output
//! 2. **No I/O**: classification and response selection never block or touch
//!    the network
//! 3. **Non-technical surface**: fallback responses never leak error text,
//!    dependency names, or stack detail to the end user
//!
//! ## Example
//!
//! ```rust
//! use backstop_core::{CallError, ErrorKind, ResponseCatalog, SeededRandom};
//!
//! let failure = CallError::classified("connection refused by upstream");
//! assert_eq!(failure.kind(), ErrorKind::ConnectionIssue);
//!
//! let catalog = ResponseCatalog::default();
//! let mut rng = SeededRandom::new(7);
//! let spoken = catalog.pick(failure.kind(), &mut rng);
//! assert!(!spoken.contains("refused"));
//! ```

pub mod classify;
pub mod error;
pub mod random;
pub mod responses;
pub mod session;

// Re-export main types at crate root
pub use classify::classify_message;
pub use error::{CallError, ErrorKind};
pub use random::{OsRandom, RandomSource, SeededRandom};
pub use responses::{CatalogError, ResponseCatalog};
pub use session::{ConversationPhase, ConversationState, StateSnapshot};
