//! Conversation-state record and snapshots.
//!
//! A live session accumulates qualification signals and notes while moving
//! through a phase machine. Protected calls snapshot this record before any
//! risky work so a failure cannot corrupt what the conversation has already
//! learned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Phase of a live conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    #[default]
    Greeting,
    Discovery,
    ValueDemo,
    Qualification,
    NextSteps,
    FrictionRescue,
    Closing,
}

impl ConversationPhase {
    /// Whether the phase machine permits moving to `next`.
    ///
    /// `FrictionRescue` is reachable from the early phases when the
    /// conversation stalls; `Closing` is terminal.
    pub fn can_transition_to(self, next: ConversationPhase) -> bool {
        use ConversationPhase::*;
        matches!(
            (self, next),
            (Greeting, Discovery)
                | (Greeting, FrictionRescue)
                | (Discovery, ValueDemo)
                | (Discovery, Qualification)
                | (Discovery, FrictionRescue)
                | (ValueDemo, Qualification)
                | (ValueDemo, NextSteps)
                | (ValueDemo, FrictionRescue)
                | (Qualification, NextSteps)
                | (Qualification, ValueDemo)
                | (NextSteps, Closing)
                | (NextSteps, Qualification)
                | (FrictionRescue, Discovery)
                | (FrictionRescue, ValueDemo)
                | (FrictionRescue, Closing)
        )
    }

    /// Nothing follows `Closing`.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConversationPhase::Closing)
    }
}

/// Mutable conversation state owned by the session layer.
///
/// Signals are keyed by name (`team_size`, `urgency`, ...) with arbitrary
/// JSON values, since different deployments track different things.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Qualification signals discovered so far
    #[serde(default)]
    pub signals: BTreeMap<String, Value>,

    /// Running conversation notes, in order
    #[serde(default)]
    pub notes: Vec<String>,

    /// Current phase
    #[serde(default)]
    pub phase: ConversationPhase,
}

impl ConversationState {
    /// Fresh state at the start of a session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a discovered signal. Null values are ignored.
    pub fn record_signal(&mut self, name: impl Into<String>, value: Value) {
        if value.is_null() {
            return;
        }
        self.signals.insert(name.into(), value);
    }

    /// Append a conversation note.
    pub fn add_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Move to `next` if the phase machine allows it.
    ///
    /// Invalid transitions leave the state untouched and return `false`.
    pub fn transition_phase(&mut self, next: ConversationPhase) -> bool {
        if self.phase.can_transition_to(next) {
            self.phase = next;
            true
        } else {
            tracing::warn!(from = ?self.phase, to = ?next, "invalid phase transition rejected");
            false
        }
    }

    /// Deep-copy snapshot of the current state.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::capture(self)
    }
}

/// Deep copy of a [`ConversationState`] at a point in time.
///
/// Owned by the protected call that captured it; dropped after a success,
/// applied via [`StateSnapshot::restore_into`] on the failure path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub signals: BTreeMap<String, Value>,
    pub notes: Vec<String>,
    pub phase: ConversationPhase,
    pub captured_at: DateTime<Utc>,
}

impl StateSnapshot {
    /// Capture a deep copy of `state`.
    pub fn capture(state: &ConversationState) -> Self {
        Self {
            signals: state.signals.clone(),
            notes: state.notes.clone(),
            phase: state.phase,
            captured_at: Utc::now(),
        }
    }

    /// Overwrite `state` wholesale with this snapshot's contents.
    ///
    /// Anything recorded between capture and restore is discarded.
    pub fn restore_into(&self, state: &mut ConversationState) {
        state.signals = self.signals.clone();
        state.notes = self.notes.clone();
        state.phase = self.phase;
    }
}
