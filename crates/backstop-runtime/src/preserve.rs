//! Conversation-state preservation around protected calls.
//!
//! A [`RestoreGuard`] snapshots the session before a risky operation and
//! rolls the state back unless explicitly disarmed. Rollback also fires on
//! drop, so a cancelled or panicked call cannot leave half-applied
//! conversation state behind.

use std::sync::Arc;

use parking_lot::Mutex;

use backstop_core::{ConversationState, StateSnapshot};

/// Shared, lock-guarded owner of one conversation's state.
#[derive(Default)]
pub struct SessionHandle {
    state: Mutex<ConversationState>,
}

impl SessionHandle {
    pub fn new(state: ConversationState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.state.lock().snapshot()
    }

    pub fn restore(&self, snapshot: &StateSnapshot) {
        snapshot.restore_into(&mut self.state.lock());
    }

    /// Runs `f` with exclusive access to the live state.
    pub fn with<R>(&self, f: impl FnOnce(&mut ConversationState) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub fn state(&self) -> ConversationState {
        self.state.lock().clone()
    }
}

/// Rolls the session back to its captured snapshot unless disarmed.
///
/// Arm before invoking the operation, disarm on success. Everything else,
/// including task cancellation, restores through [`Drop`].
pub struct RestoreGuard {
    handle: Arc<SessionHandle>,
    snapshot: Option<StateSnapshot>,
}

impl RestoreGuard {
    pub fn arm(handle: Arc<SessionHandle>) -> Self {
        let snapshot = handle.snapshot();
        Self {
            handle,
            snapshot: Some(snapshot),
        }
    }

    /// The operation committed; keep whatever it wrote.
    pub fn disarm(&mut self) {
        self.snapshot = None;
    }

    /// Rolls back immediately instead of waiting for drop.
    pub fn restore_now(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.handle.restore(&snapshot);
        }
    }
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.handle.restore(&snapshot);
            tracing::debug!("Session state rolled back by guard drop");
        }
    }
}
