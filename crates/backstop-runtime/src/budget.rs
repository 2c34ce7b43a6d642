//! Daily and per-session cost ceilings.
//!
//! The ledger tracks cumulative spend for the current UTC day and refuses
//! charges that would push past the limit. Rollover is lazy: the first
//! charge attempted on a new day resets the total before applying. A
//! rejected charge leaves the total exactly where it was, so spend never
//! exceeds the limit.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;

use crate::notify::{Notifier, Severity};

struct LedgerState {
    daily_spend: f64,
    day_started: NaiveDate,
}

/// Cumulative daily spend limiter shared by every protected call.
pub struct CostLedger {
    daily_limit: f64,
    state: Mutex<LedgerState>,
    notifier: Arc<dyn Notifier>,
}

impl CostLedger {
    pub fn new(daily_limit: f64, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            daily_limit,
            state: Mutex::new(LedgerState {
                daily_spend: 0.0,
                day_started: Utc::now().date_naive(),
            }),
            notifier,
        }
    }

    pub fn daily_limit(&self) -> f64 {
        self.daily_limit
    }

    pub fn daily_spend(&self) -> f64 {
        self.state.lock().daily_spend
    }

    /// Charges `amount` against today's total. Returns `false` and leaves
    /// the total untouched when the charge would exceed the limit.
    pub fn add_cost(&self, amount: f64) -> bool {
        self.add_cost_on(amount, Utc::now().date_naive())
    }

    /// Date-injected variant of [`add_cost`](Self::add_cost) so rollover is
    /// testable without a clock.
    pub fn add_cost_on(&self, amount: f64, today: NaiveDate) -> bool {
        let mut state = self.state.lock();
        if state.day_started != today {
            state.daily_spend = 0.0;
            state.day_started = today;
        }
        let projected = state.daily_spend + amount;
        if projected > self.daily_limit {
            return false;
        }
        state.daily_spend = projected;
        true
    }

    /// Budget gate for the protected-call path: charges the estimate and
    /// raises a warning notification when the ceiling rejects it.
    pub fn check_budget_before_call(&self, estimate: f64) -> bool {
        self.check_budget_before_call_on(estimate, Utc::now().date_naive())
    }

    pub fn check_budget_before_call_on(&self, estimate: f64, today: NaiveDate) -> bool {
        if self.add_cost_on(estimate, today) {
            return true;
        }
        let spent = self.daily_spend();
        tracing::warn!(
            estimate,
            spent,
            limit = self.daily_limit,
            "Daily cost ceiling rejected call"
        );
        self.notifier.notify(
            &format!(
                "daily cost ceiling reached: rejected call estimated at ${estimate:.2} (spent ${spent:.2} of ${:.2})",
                self.daily_limit
            ),
            Severity::Warning,
        );
        false
    }
}

/// Optional spend ceiling for a single conversation.
///
/// Plain accounting only; the caller decides what a rejection means and
/// whether anyone gets notified.
pub struct SessionSpend {
    limit: Option<f64>,
    spent: Mutex<f64>,
}

impl SessionSpend {
    pub fn new(limit: Option<f64>) -> Self {
        Self {
            limit,
            spent: Mutex::new(0.0),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    pub fn limit(&self) -> Option<f64> {
        self.limit
    }

    pub fn spent(&self) -> f64 {
        *self.spent.lock()
    }

    pub fn try_charge(&self, amount: f64) -> bool {
        let mut spent = self.spent.lock();
        let projected = *spent + amount;
        if self.limit.is_some_and(|limit| projected > limit) {
            return false;
        }
        *spent = projected;
        true
    }

    /// Backs out a charge after a later gate rejected the call. Clamped at
    /// zero so a stray double-refund cannot go negative.
    pub fn refund(&self, amount: f64) {
        let mut spent = self.spent.lock();
        *spent = (*spent - amount).max(0.0);
    }
}

/// Estimated cost in dollars for one LLM call, priced per million tokens.
pub fn estimate_llm_cost(model: &str, prompt_tokens: u64, completion_tokens: u64) -> f64 {
    // More specific names first: "gpt-4o" matches inside "gpt-4o-mini".
    let (input_rate, output_rate) = match model {
        m if m.contains("gpt-4.1-mini") => (0.15, 0.60),
        m if m.contains("gpt-4o-mini") => (0.15, 0.60),
        m if m.contains("gpt-4o") => (2.50, 10.00),
        _ => (0.15, 0.60),
    };
    (prompt_tokens as f64 / 1_000_000.0) * input_rate
        + (completion_tokens as f64 / 1_000_000.0) * output_rate
}

/// Estimated cost in dollars for transcribing `audio_seconds` of speech.
pub fn estimate_stt_cost(provider: &str, audio_seconds: f64) -> f64 {
    let per_minute = match provider {
        p if p.contains("assemblyai") => 0.01,
        _ => 0.0043,
    };
    (audio_seconds / 60.0) * per_minute
}

/// Estimated cost in dollars for synthesizing `characters` of speech.
pub fn estimate_tts_cost(provider: &str, characters: u64) -> f64 {
    let per_char = match provider {
        p if p.contains("elevenlabs") => 0.18 / 1_000.0,
        _ => 0.06 / 1_000_000.0,
    };
    characters as f64 * per_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use proptest::prelude::*;

    struct CountingNotifier {
        warnings: Mutex<u32>,
    }

    impl Notifier for CountingNotifier {
        fn notify(&self, _message: &str, severity: Severity) {
            if severity == Severity::Warning {
                *self.warnings.lock() += 1;
            }
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).expect("valid date")
    }

    #[test]
    fn test_charge_exactly_at_limit_is_accepted() {
        let ledger = CostLedger::new(100.0, Arc::new(LogNotifier));

        assert!(ledger.add_cost_on(60.0, day(1)));
        assert!(ledger.add_cost_on(40.0, day(1)));
        assert_eq!(ledger.daily_spend(), 100.0);

        assert!(!ledger.add_cost_on(0.5, day(1)));
        assert_eq!(ledger.daily_spend(), 100.0);
    }

    #[test]
    fn test_rejection_notifies_warning() {
        let notifier = Arc::new(CountingNotifier {
            warnings: Mutex::new(0),
        });
        let ledger = CostLedger::new(1.0, Arc::clone(&notifier) as Arc<dyn Notifier>);

        assert!(ledger.check_budget_before_call_on(0.8, day(1)));
        assert!(!ledger.check_budget_before_call_on(0.8, day(1)));

        assert_eq!(*notifier.warnings.lock(), 1);
    }

    #[test]
    fn test_new_day_resets_spend() {
        let ledger = CostLedger::new(100.0, Arc::new(LogNotifier));

        assert!(ledger.add_cost_on(80.0, day(1)));
        assert!(!ledger.add_cost_on(30.0, day(1)));
        assert!(ledger.add_cost_on(30.0, day(2)));
        assert_eq!(ledger.daily_spend(), 30.0);
    }

    #[test]
    fn test_session_ceiling_charges_and_refunds() {
        let session = SessionSpend::new(Some(5.0));

        assert!(session.try_charge(3.0));
        assert!(session.try_charge(2.0));
        assert!(!session.try_charge(0.01));
        assert_eq!(session.spent(), 5.0);

        session.refund(2.0);
        assert_eq!(session.spent(), 3.0);
        session.refund(10.0);
        assert_eq!(session.spent(), 0.0);
    }

    #[test]
    fn test_unlimited_session_never_rejects() {
        let session = SessionSpend::unlimited();
        assert!(session.try_charge(1_000_000.0));
        assert!(session.limit().is_none());
    }

    #[test]
    fn test_llm_pricing_picks_most_specific_model() {
        let mini = estimate_llm_cost("gpt-4o-mini", 1_000_000, 0);
        let full = estimate_llm_cost("gpt-4o", 1_000_000, 0);
        assert!((mini - 0.15).abs() < 1e-9);
        assert!((full - 2.50).abs() < 1e-9);

        let mixed = estimate_llm_cost("gpt-4.1-mini", 1000, 500);
        assert!((mixed - 0.00045).abs() < 1e-12);
    }

    #[test]
    fn test_speech_pricing_rates() {
        assert!((estimate_stt_cost("deepgram", 600.0) - 0.043).abs() < 1e-9);
        assert!((estimate_stt_cost("assemblyai", 60.0) - 0.01).abs() < 1e-9);
        assert!((estimate_tts_cost("cartesia", 1_000_000) - 0.06).abs() < 1e-9);
        assert!((estimate_tts_cost("elevenlabs", 1_000) - 0.18).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn test_spend_never_exceeds_limit(charges in proptest::collection::vec(0.0f64..20.0, 0..40)) {
            let ledger = CostLedger::new(50.0, Arc::new(LogNotifier));
            for charge in charges {
                ledger.add_cost_on(charge, day(10));
                prop_assert!(ledger.daily_spend() <= ledger.daily_limit());
            }
        }
    }
}
