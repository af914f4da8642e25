//! Lock coordinator: bounded, jittered acquisition of the per-item lease
//! lock with guaranteed release.
//!
//! # Contract
//!
//! [`LockCoordinator::with_lock`] either fails with [`LockUnavailable`]
//! holding nothing, or runs the body and releases the lock exactly once on
//! every exit path of the body: normal return, error return, panic, or the
//! caller dropping the future mid-flight.
//!
//! The lock is a lease without an owner token; see the `fast_store` module of
//! `stockguard-core` for why that is acceptable here.

use crate::retry::Backoff;
use crate::throttle::LogThrottle;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use stockguard_core::{FastStore, ItemId, LockPolicy, Requester};
use thiserror::Error;

/// Acquisition retries exhausted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Lock for item {item_id} unavailable after {attempts} attempts")]
pub struct LockUnavailable {
    /// Contended item
    pub item_id: ItemId,
    /// Attempts made
    pub attempts: u32,
}

/// Coordinates the per-item lease lock on a [`FastStore`].
#[derive(Debug, Clone)]
pub struct LockCoordinator<S> {
    store: S,
    policy: LockPolicy,
    failure_log: Arc<LogThrottle<ItemId>>,
}

impl<S: FastStore> LockCoordinator<S> {
    /// Create a coordinator that logs at most 10 acquisition failures per
    /// item per minute.
    #[must_use]
    pub fn new(store: S, policy: LockPolicy) -> Self {
        Self::with_log_budget(store, policy, 10, Duration::from_secs(60))
    }

    /// Create a coordinator with a custom failure-log budget.
    #[must_use]
    pub fn with_log_budget(store: S, policy: LockPolicy, budget: u32, window: Duration) -> Self {
        Self {
            store,
            policy,
            failure_log: Arc::new(LogThrottle::new(budget, window)),
        }
    }

    /// Policy in force.
    #[must_use]
    pub const fn policy(&self) -> &LockPolicy {
        &self.policy
    }

    /// Take the lock, retrying up to `max_retries` times with a jittered
    /// sleep between attempts.
    ///
    /// A transport error on an attempt counts as a failed attempt.
    ///
    /// # Errors
    ///
    /// Returns [`LockUnavailable`] when every attempt failed.
    pub async fn acquire(
        &self,
        item_id: ItemId,
        requester: &Requester,
    ) -> Result<LockGuard<S>, LockUnavailable> {
        let backoff = Backoff::Jittered(self.policy.delay);
        let max_retries = self.policy.max_retries;

        for attempt in 1..=max_retries {
            match self.store.acquire_lock(item_id, self.policy.ttl).await {
                Ok(true) => {
                    tracing::debug!(item_id = %item_id, attempt, requester = %requester, "Lock acquired");
                    return Ok(LockGuard::new(self.store.clone(), item_id));
                }
                Ok(false) => {
                    if self.failure_log.allow(item_id) {
                        tracing::warn!(
                            item_id = %item_id,
                            retry = attempt,
                            max_retries,
                            requester = %requester,
                            "Failed to acquire lock"
                        );
                    }
                }
                Err(e) => {
                    if self.failure_log.allow(item_id) {
                        tracing::warn!(
                            item_id = %item_id,
                            retry = attempt,
                            max_retries,
                            requester = %requester,
                            error = %e,
                            "Lock acquisition errored"
                        );
                    }
                }
            }
            metrics::counter!("lock_acquire_failures_total").increment(1);

            if attempt < max_retries {
                tokio::time::sleep(backoff.next_delay()).await;
            }
        }

        tracing::error!(
            item_id = %item_id,
            max_retries,
            requester = %requester,
            "Failed to acquire lock after max retries"
        );
        metrics::counter!("lock_unavailable_total").increment(1);
        Err(LockUnavailable {
            item_id,
            attempts: max_retries,
        })
    }

    /// Run `body` while holding the lock for `item_id`.
    ///
    /// If `body` panics the lock is released before the panic resumes.
    ///
    /// # Errors
    ///
    /// Returns [`LockUnavailable`] without running `body` if the lock could
    /// not be taken.
    pub async fn with_lock<F, Fut, T>(
        &self,
        item_id: ItemId,
        requester: &Requester,
        body: F,
    ) -> Result<T, LockUnavailable>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = self.acquire(item_id, requester).await?;
        let outcome = AssertUnwindSafe(body()).catch_unwind().await;
        guard.release().await;
        match outcome {
            Ok(value) => Ok(value),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// A held lease lock.
///
/// Call [`LockGuard::release`] to release it. If the guard is dropped
/// without that (the owning future was cancelled), the release is spawned
/// on the current tokio runtime; outside a runtime the lease is left to
/// expire.
#[must_use = "dropping the guard releases the lock in the background"]
#[derive(Debug)]
pub struct LockGuard<S: FastStore> {
    store: S,
    item_id: ItemId,
    released: bool,
}

impl<S: FastStore> LockGuard<S> {
    const fn new(store: S, item_id: ItemId) -> Self {
        Self {
            store,
            item_id,
            released: false,
        }
    }

    /// Item the lock belongs to.
    #[must_use]
    pub const fn item_id(&self) -> ItemId {
        self.item_id
    }

    /// Delete the lock key. Failures are logged; the lease then expires on
    /// its own.
    pub async fn release(mut self) {
        self.released = true;
        release_lock(&self.store, self.item_id).await;
    }
}

impl<S: FastStore> Drop for LockGuard<S> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let store = self.store.clone();
        let item_id = self.item_id;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                release_lock(&store, item_id).await;
            });
        } else {
            tracing::error!(item_id = %item_id, "Lock dropped outside a runtime; left to expire");
        }
    }
}

async fn release_lock<S: FastStore>(store: &S, item_id: ItemId) {
    match store.release_lock(item_id).await {
        Ok(()) => tracing::debug!(item_id = %item_id, "Lock released"),
        Err(e) => {
            tracing::error!(item_id = %item_id, error = %e, "Failed to release lock; it will expire after its TTL");
            metrics::counter!("lock_release_failures_total").increment(1);
        }
    }
}
