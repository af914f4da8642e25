//! Tunables for reservations and reconciliation.
//!
//! Defaults match the production settings; the service crate overrides them
//! from the environment.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Inclusive range, in milliseconds, that lock retry sleeps are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    /// Shortest sleep
    pub min_ms: u64,
    /// Longest sleep
    pub max_ms: u64,
}

impl DelayRange {
    /// Create a range. Callers validate `min_ms <= max_ms`.
    #[must_use]
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Whether the bounds are ordered.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.min_ms <= self.max_ms
    }

    /// Longest single sleep.
    #[must_use]
    pub const fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

impl Default for DelayRange {
    fn default() -> Self {
        Self::new(10, 200)
    }
}

/// Settings read by the reservation workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservationConfig {
    /// Lock lease in seconds (default: 5)
    pub lock_ttl_seconds: u64,
    /// Lock acquisition attempts (default: 5)
    pub lock_max_retries: u32,
    /// Sleep between lock attempts (default: 10-200 ms)
    pub lock_retry_delay: DelayRange,
    /// Largest quantity accepted in one purchase (default: 1000)
    pub max_quantity_per_purchase: u32,
    /// Lock-failure warnings allowed per item per window (default: 10)
    pub lock_failure_log_budget: u32,
    /// Window for the warning budget in seconds (default: 60)
    pub lock_failure_log_window_seconds: u64,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            lock_ttl_seconds: 5,
            lock_max_retries: 5,
            lock_retry_delay: DelayRange::default(),
            max_quantity_per_purchase: 1000,
            lock_failure_log_budget: 10,
            lock_failure_log_window_seconds: 60,
        }
    }
}

impl ReservationConfig {
    /// Lock policy derived from these settings.
    #[must_use]
    pub const fn lock_policy(&self) -> LockPolicy {
        LockPolicy {
            ttl: Duration::from_secs(self.lock_ttl_seconds),
            max_retries: self.lock_max_retries,
            delay: self.lock_retry_delay,
        }
    }

    /// Window for the lock-failure warning budget.
    #[must_use]
    pub const fn lock_failure_log_window(&self) -> Duration {
        Duration::from_secs(self.lock_failure_log_window_seconds)
    }
}

/// How the lock coordinator acquires a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    /// Lease duration
    pub ttl: Duration,
    /// Acquisition attempts before giving up
    pub max_retries: u32,
    /// Jitter range for the sleep after a failed attempt
    pub delay: DelayRange,
}

impl LockPolicy {
    /// Upper bound on how long acquisition can block a caller.
    #[must_use]
    pub fn worst_case_wait(&self) -> Duration {
        self.delay.max() * self.max_retries
    }
}

impl Default for LockPolicy {
    fn default() -> Self {
        ReservationConfig::default().lock_policy()
    }
}

/// Settings read by the reconciliation worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Total attempts per task before it is buried (default: 3)
    pub max_retries: u32,
    /// Fixed delay between attempts in seconds (default: 5)
    pub retry_delay_seconds: u64,
    /// Concurrent consumers on the lane (default: 4)
    pub worker_concurrency: usize,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_seconds: 5,
            worker_concurrency: 4,
        }
    }
}

impl ReconciliationConfig {
    /// Delay between attempts.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ReservationConfig::default();
        assert_eq!(config.lock_ttl_seconds, 5);
        assert_eq!(config.lock_max_retries, 5);
        assert_eq!(config.lock_retry_delay, DelayRange::new(10, 200));
        assert_eq!(config.max_quantity_per_purchase, 1000);

        let reconciliation = ReconciliationConfig::default();
        assert_eq!(reconciliation.max_retries, 3);
        assert_eq!(reconciliation.retry_delay(), Duration::from_secs(5));
    }

    #[test]
    fn worst_case_wait_is_bounded() {
        let policy = LockPolicy::default();
        assert_eq!(policy.worst_case_wait(), Duration::from_millis(1000));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: ReservationConfig =
            serde_json::from_str(r#"{"lock_max_retries": 9}"#).unwrap();
        assert_eq!(config.lock_max_retries, 9);
        assert_eq!(config.lock_ttl_seconds, 5);
    }

    #[test]
    fn inverted_range_is_invalid() {
        assert!(!DelayRange::new(200, 10).is_valid());
        assert!(DelayRange::new(10, 10).is_valid());
    }
}
