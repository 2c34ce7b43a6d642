//! Natural-language fallback responses.
//!
//! When a protected call ultimately fails, the session still has to say
//! something. The catalog maps each [`ErrorKind`] to a set of voice-appropriate
//! lines and picks one at random so repeated failures do not sound robotic.
//! The lines never mention dependency names, error text, or anything
//! technical.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::error::ErrorKind;
use crate::random::RandomSource;

const TOOL_FAILURE_RESPONSES: [&str; 3] = [
    "Let me try finding that information another way.",
    "I'm having a slight hiccup with that lookup. Give me just a moment.",
    "Let me take a different approach to get that for you.",
];

const CONNECTION_RESPONSES: [&str; 3] = [
    "I'm experiencing a brief connection issue. Bear with me for just a second.",
    "Looks like there's a momentary network hiccup. One moment please.",
    "Connection seems a bit spotty. Let me reconnect and continue.",
];

const TIMEOUT_RESPONSES: [&str; 3] = [
    "That's taking longer than expected. Let me try a quicker approach.",
    "This is running a bit slow. Let me see if there's a faster way.",
    "That query is timing out. Let me try something else.",
];

const UNAVAILABLE_RESPONSES: [&str; 3] = [
    "That service appears to be temporarily unavailable. Let's continue without it for now.",
    "I can't reach that system right now, but I can still help you with other things.",
    "That integration is having issues at the moment. Let's work around it.",
];

const NOT_FOUND_RESPONSES: [&str; 3] = [
    "I couldn't find that information. Can you clarify what you're looking for?",
    "Hmm, I'm not seeing that in the system. Could you provide a bit more detail?",
    "I don't have that data available. Let me help you with what I can access.",
];

const GENERIC_RESPONSES: [&str; 3] = [
    "I encountered an issue, but I'm still here to help. What else can I do for you?",
    "Something went wrong on my end, but let's keep going. What would you like to know?",
    "I hit a snag there, but no worries. How else can I assist you?",
];

/// Catalog construction errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CatalogError {
    #[error("response list for {0} must not be empty")]
    EmptyVariants(ErrorKind),
}

/// Mapping from error kind to candidate fallback lines.
#[derive(Debug, Clone)]
pub struct ResponseCatalog {
    variants: BTreeMap<ErrorKind, Vec<String>>,
}

impl Default for ResponseCatalog {
    fn default() -> Self {
        let mut variants = BTreeMap::new();
        let defaults: [(ErrorKind, &[&str; 3]); 6] = [
            (ErrorKind::ToolFailure, &TOOL_FAILURE_RESPONSES),
            (ErrorKind::ConnectionIssue, &CONNECTION_RESPONSES),
            (ErrorKind::Timeout, &TIMEOUT_RESPONSES),
            (ErrorKind::ServiceUnavailable, &UNAVAILABLE_RESPONSES),
            (ErrorKind::DataNotFound, &NOT_FOUND_RESPONSES),
            (ErrorKind::Generic, &GENERIC_RESPONSES),
        ];
        for (kind, lines) in defaults {
            variants.insert(kind, lines.iter().map(|s| s.to_string()).collect());
        }
        Self { variants }
    }
}

impl ResponseCatalog {
    /// Create a catalog with the built-in response sets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the candidate lines for one kind.
    pub fn set_variants(
        &mut self,
        kind: ErrorKind,
        variants: Vec<String>,
    ) -> Result<(), CatalogError> {
        if variants.is_empty() {
            return Err(CatalogError::EmptyVariants(kind));
        }
        self.variants.insert(kind, variants);
        Ok(())
    }

    /// Candidate lines for a kind, falling back to the generic set.
    pub fn variants(&self, kind: ErrorKind) -> &[String] {
        match self.variants.get(&kind) {
            Some(lines) if !lines.is_empty() => lines,
            _ => self
                .variants
                .get(&ErrorKind::Generic)
                .map(Vec::as_slice)
                .unwrap_or_default(),
        }
    }

    /// Pick one response for the kind.
    pub fn pick(&self, kind: ErrorKind, rng: &mut dyn RandomSource) -> String {
        let lines = self.variants(kind);
        if lines.is_empty() {
            // Only reachable with a hand-rolled catalog; the default always
            // carries a generic set.
            return GENERIC_RESPONSES[0].to_string();
        }
        lines[rng.pick(lines.len())].clone()
    }
}
