//! Bounded retry with fixed or jittered delays.
//!
//! Two callers share this module:
//! - the lock coordinator draws a uniformly random sleep from a
//!   [`DelayRange`] after each failed acquisition, so contending callers do
//!   not retry in lockstep;
//! - the reconciliation worker retries transient ledger failures with a
//!   fixed delay.
//!
//! # Example
//!
//! ```rust
//! use stockguard_runtime::retry::{Backoff, RetryPolicy, retry_with_predicate};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(10)));
//!
//! let value = retry_with_predicate(
//!     &policy,
//!     || async { Ok::<_, String>(42) },
//!     |err: &String| err.contains("transient"),
//! )
//! .await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use rand::Rng;
use std::time::Duration;
use stockguard_core::DelayRange;
use tokio::time::sleep;

/// How long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay every time.
    Fixed(Duration),
    /// Uniformly random delay inside the range (inclusive).
    Jittered(DelayRange),
}

impl Backoff {
    /// Draw the next delay.
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Jittered(range) if range.min_ms >= range.max_ms => {
                Duration::from_millis(range.min_ms)
            }
            Self::Jittered(range) => {
                Duration::from_millis(rand::thread_rng().gen_range(range.min_ms..=range.max_ms))
            }
        }
    }
}

/// Retry policy: total attempts plus the delay between them.
///
/// `max_attempts` counts the first try, so `max_attempts = 3` means one
/// initial attempt and at most two retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay between attempts
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    #[must_use]
    pub const fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Backoff::Fixed(Duration::from_secs(5)))
    }
}

/// Retry an async operation while `is_retryable` approves the error.
///
/// Returns the first success, the first non-retryable error, or the last
/// error once attempts are exhausted.
///
/// # Errors
///
/// Returns the error that ended the loop.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    tracing::warn!(attempt, error = %err, "Error is not retryable, failing immediately");
                    return Err(err);
                }

                if !policy.allows_retry_after(attempt) {
                    tracing::error!(attempt, error = %err, "Operation failed after max attempts");
                    metrics::counter!("retry_exhausted_total").increment(1);
                    return Err(err);
                }

                let delay = policy.backoff.next_delay();
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Operation failed, retrying"
                );
                metrics::counter!("retry_attempts_total").increment(1);
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn jittered_delay_stays_in_range() {
        let backoff = Backoff::Jittered(DelayRange::new(10, 200));
        for _ in 0..500 {
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_millis(10));
            assert!(delay <= Duration::from_millis(200));
        }
    }

    #[test]
    fn degenerate_range_yields_its_bound() {
        let backoff = Backoff::Jittered(DelayRange::new(50, 50));
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
    }

    #[test]
    fn max_attempts_counts_first_try() {
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::ZERO));
        assert!(policy.allows_retry_after(1));
        assert!(policy.allows_retry_after(2));
        assert!(!policy.allows_retry_after(3));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(1)));
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result = retry_with_predicate(
            &policy,
            || {
                let c = Arc::clone(&counter_clone);
                async move {
                    let attempt = c.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        Err(format!("transient failure {attempt}"))
                    } else {
                        Ok(42)
                    }
                }
            },
            |err: &String| err.contains("transient"),
        )
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_at_max_attempts() {
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(1)));
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result = retry_with_predicate(
            &policy,
            || {
                let c = Arc::clone(&counter_clone);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>("transient")
                }
            },
            |_: &&str| true,
        )
        .await;

        assert_eq!(result, Err("transient"));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_fails_immediately() {
        let policy = RetryPolicy::default();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result = retry_with_predicate(
            &policy,
            || {
                let c = Arc::clone(&counter_clone);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>("permanent error")
                }
            },
            |err: &&str| err.contains("transient"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
