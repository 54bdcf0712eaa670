//! Bounded retry for bootstrap operations.
//!
//! Transfers are deliberately *not* retried inside a run: a failed file keeps
//! its flags unset and is picked up whole by the next invocation. The only
//! place a retry loop is applied is opening the catalog database, where a
//! transient lock or IO hiccup would otherwise abort the run before any phase
//! starts.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use catalog_sync_core::retry::{RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::new(3, Duration::from_millis(10));
//! assert!(matches!(policy.should_retry(true, 1), RetryDecision::Retry { attempt: 2, .. }));
//! assert!(matches!(policy.should_retry(true, 3), RetryDecision::DoNotRetry { .. }));
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, instrument, warn};

/// Default maximum attempts (including the first one).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default fixed delay between attempts.
const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// Decision on whether to run an operation again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run again after `delay`.
    Retry {
        /// How long to wait before the next attempt.
        delay: Duration,
        /// The attempt number about to run (1-indexed, so first retry is 2).
        attempt: u32,
    },

    /// Give up and surface the last error.
    DoNotRetry {
        /// Human-readable reason.
        reason: String,
    },
}

/// Fixed-delay retry policy parameterized by attempt budget.
///
/// The predicate deciding which errors are worth retrying is supplied per call
/// to [`retry`], so the same policy can guard different operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay between attempts.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Decides what to do after `attempt` (1-indexed) failed.
    #[must_use]
    pub fn should_retry(&self, retryable: bool, attempt: u32) -> RetryDecision {
        if !retryable {
            return RetryDecision::DoNotRetry {
                reason: "error is not transient".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        RetryDecision::Retry {
            delay: self.delay,
            attempt: attempt + 1,
        }
    }
}

/// Runs `operation` until it succeeds, the predicate rejects the error, or the
/// attempt budget is spent. The last error is returned unchanged.
///
/// # Errors
///
/// Returns the error of the final attempt.
#[instrument(level = "debug", skip(policy, is_retryable, operation), fields(max_attempts = policy.max_attempts))]
pub async fn retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    is_retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => match policy.should_retry(is_retryable(&error), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    warn!(
                        attempt = next_attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next_attempt;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(attempt, %reason, "not retrying");
                    return Err(error);
                }
            },
        }
    }
}
