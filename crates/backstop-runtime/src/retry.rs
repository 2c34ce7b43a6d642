//! Retry with capped exponential backoff and jitter.
//!
//! Each attempt that fails with a retryable [`ErrorKind`] is retried after
//! `base_delay * 2^attempt`, capped at `max_delay`. Jitter multiplies the
//! capped delay by a uniform factor in `[0.5, 1.0)` so simultaneous sessions
//! do not hammer a recovering dependency in lockstep.

use std::collections::BTreeSet;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use backstop_core::{CallError, ErrorKind, OsRandom, RandomSource};

use crate::op::Operation;

/// Backoff schedule and retry eligibility for one dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = `max_retries + 1`
    pub max_retries: u32,

    /// Delay before the first retry
    #[serde(with = "crate::config::duration_str")]
    pub base_delay: Duration,

    /// Ceiling applied before jitter
    #[serde(with = "crate::config::duration_str")]
    pub max_delay: Duration,

    /// Randomize each delay within `[0.5, 1.0)` of its capped value
    pub jitter: bool,

    /// Kinds worth retrying; `None` retries everything
    pub retryable: Option<BTreeSet<ErrorKind>>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter: true,
            retryable: None,
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        match &self.retryable {
            Some(kinds) => kinds.contains(&kind),
            None => true,
        }
    }

    /// Delay before the retry that follows failed attempt `attempt`
    /// (zero-indexed).
    ///
    /// The exponential factor saturates instead of overflowing, so very high
    /// attempt numbers simply pin the delay at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32, rng: &mut dyn RandomSource) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let capped = self.base_delay.saturating_mul(factor).min(self.max_delay);
        if self.jitter {
            capped.mul_f64(0.5 + rng.next_f64() * 0.5)
        } else {
            capped
        }
    }
}

/// All attempts failed, or the failure was not retryable.
///
/// `attempts` counts every invocation made, including the first; the final
/// failure is retrievable through [`std::error::Error::source`].
#[derive(Debug, Error)]
#[error("operation failed after {attempts} attempts: {cause}")]
pub struct RetryError {
    pub attempts: u32,
    #[source]
    pub cause: CallError,
}

/// Drives an [`Operation`] through a [`RetryPolicy`].
///
/// Holds the jitter randomness behind a lock so one executor can be shared
/// across concurrent calls; inject a seeded source for deterministic tests.
pub struct RetryExecutor {
    rng: Mutex<Box<dyn RandomSource + Send>>,
}

impl RetryExecutor {
    pub fn new(rng: Box<dyn RandomSource + Send>) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    /// Runs `op` until it succeeds, exhausts the policy, or fails with a
    /// non-retryable kind.
    pub async fn run<O: Operation>(
        &self,
        dependency: &str,
        policy: &RetryPolicy,
        op: &mut O,
    ) -> Result<O::Output, RetryError> {
        let mut attempt: u32 = 0;
        loop {
            match op.run().await {
                Ok(value) => return Ok(value),
                Err(cause) => {
                    attempt += 1;
                    if !policy.is_retryable(cause.kind()) {
                        return Err(RetryError {
                            attempts: attempt,
                            cause,
                        });
                    }
                    if attempt > policy.max_retries {
                        tracing::error!(
                            dependency,
                            attempts = attempt,
                            error = %cause,
                            "Retries exhausted"
                        );
                        return Err(RetryError {
                            attempts: attempt,
                            cause,
                        });
                    }
                    // Guard scope ends before the sleep; the lock must not be
                    // held across an await point.
                    let delay = {
                        let mut rng = self.rng.lock();
                        policy.delay_for_attempt(attempt - 1, &mut **rng)
                    };
                    tracing::warn!(
                        dependency,
                        attempt,
                        max_attempts = policy.max_retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %cause,
                        "Attempt failed, backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(Box::new(OsRandom))
    }
}
