//! In-memory fast store with Redis-like WATCH semantics.
//!
//! Every write to a stock key bumps that key's version, including writes made
//! through the session that watches it. A session's transaction aborts if any
//! watched version moved, exactly as `EXEC` does after a conflicting write.
//! Sessions yield to the scheduler before committing so concurrent tests
//! actually interleave.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stockguard_core::{DecrementResult, FastSession, FastStore, ItemId, StoreError};
use tokio::time::Instant;

#[derive(Debug, Default)]
struct State {
    counts: HashMap<ItemId, i64>,
    versions: HashMap<ItemId, u64>,
    locks: HashMap<ItemId, Instant>,
}

impl State {
    fn bump(&mut self, item_id: ItemId) {
        *self.versions.entry(item_id).or_insert(0) += 1;
    }

    fn version(&self, item_id: ItemId) -> u64 {
        self.versions.get(&item_id).copied().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct Faults {
    ping_fails: AtomicBool,
    reads_fail: AtomicBool,
    lock_always_held: AtomicBool,
    lock_errors: AtomicBool,
    release_errors: AtomicBool,
    aborts_pending: AtomicU32,
    failures_pending: AtomicU32,
}

#[derive(Debug, Default)]
struct Counters {
    lock_acquisitions: AtomicUsize,
    lock_releases: AtomicUsize,
    commits: AtomicUsize,
    aborts: AtomicUsize,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<State>,
    faults: Faults,
    counters: Counters,
}

/// Shared in-memory [`FastStore`]. Clones share state.
///
/// # Example
///
/// ```
/// use stockguard_core::{FastStore, ItemId};
/// use stockguard_testing::InMemoryFastStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryFastStore::new();
/// store.set_count(ItemId::new(1), 10).await?;
/// assert_eq!(store.get_count(ItemId::new(1)).await?, Some(10));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryFastStore {
    inner: Arc<Inner>,
}

impl InMemoryFastStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count without going through the trait.
    #[must_use]
    pub fn count(&self, item_id: ItemId) -> Option<i64> {
        self.inner.state.lock().unwrap().counts.get(&item_id).copied()
    }

    /// Whether an unexpired lock exists for `item_id`.
    #[must_use]
    pub fn is_locked(&self, item_id: ItemId) -> bool {
        let state = self.inner.state.lock().unwrap();
        state
            .locks
            .get(&item_id)
            .is_some_and(|expires| *expires > Instant::now())
    }

    /// Make `ping` fail.
    pub fn fail_ping(&self, fail: bool) {
        self.inner.faults.ping_fails.store(fail, Ordering::SeqCst);
    }

    /// Make every count read and write fail.
    pub fn fail_reads(&self, fail: bool) {
        self.inner.faults.reads_fail.store(fail, Ordering::SeqCst);
    }

    /// Make `acquire_lock` always report the lock as held by someone else.
    pub fn hold_lock_forever(&self, held: bool) {
        self.inner.faults.lock_always_held.store(held, Ordering::SeqCst);
    }

    /// Make `acquire_lock` return a transport error.
    pub fn fail_lock_acquire(&self, fail: bool) {
        self.inner.faults.lock_errors.store(fail, Ordering::SeqCst);
    }

    /// Make `release_lock` return a transport error. The lock stays until
    /// it expires.
    pub fn fail_lock_release(&self, fail: bool) {
        self.inner.faults.release_errors.store(fail, Ordering::SeqCst);
    }

    /// Abort the next `n` transactions as if a concurrent write happened.
    pub fn abort_next_decrements(&self, n: u32) {
        self.inner.faults.aborts_pending.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` transactions with a transport error.
    pub fn fail_next_decrements(&self, n: u32) {
        self.inner.faults.failures_pending.store(n, Ordering::SeqCst);
    }

    /// Successful `acquire_lock` calls.
    #[must_use]
    pub fn lock_acquisitions(&self) -> usize {
        self.inner.counters.lock_acquisitions.load(Ordering::SeqCst)
    }

    /// `release_lock` calls, successful or not.
    #[must_use]
    pub fn lock_releases(&self) -> usize {
        self.inner.counters.lock_releases.load(Ordering::SeqCst)
    }

    /// Committed transactions.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.inner.counters.commits.load(Ordering::SeqCst)
    }

    /// Aborted transactions, injected or real.
    #[must_use]
    pub fn aborts(&self) -> usize {
        self.inner.counters.aborts.load(Ordering::SeqCst)
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.inner.faults.reads_fail.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("injected read failure".to_string()));
        }
        Ok(())
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl FastStore for InMemoryFastStore {
    type Session = InMemorySession;

    async fn session(&self) -> Result<Self::Session, StoreError> {
        Ok(InMemorySession {
            store: self.clone(),
            watched: HashMap::new(),
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.inner.faults.ping_fails.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("injected ping failure".to_string()));
        }
        Ok(())
    }

    async fn get_count(&self, item_id: ItemId) -> Result<Option<i64>, StoreError> {
        self.check_reads()?;
        Ok(self.count(item_id))
    }

    async fn set_count(&self, item_id: ItemId, value: i64) -> Result<(), StoreError> {
        self.check_reads()?;
        let mut state = self.inner.state.lock().unwrap();
        state.counts.insert(item_id, value);
        state.bump(item_id);
        Ok(())
    }

    async fn acquire_lock(&self, item_id: ItemId, ttl: Duration) -> Result<bool, StoreError> {
        if self.inner.faults.lock_errors.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("injected lock failure".to_string()));
        }
        if self.inner.faults.lock_always_held.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let now = Instant::now();
        let mut state = self.inner.state.lock().unwrap();
        if state.locks.get(&item_id).is_some_and(|expires| *expires > now) {
            return Ok(false);
        }
        state.locks.insert(item_id, now + ttl);
        self.inner.counters.lock_acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn release_lock(&self, item_id: ItemId) -> Result<(), StoreError> {
        self.inner.counters.lock_releases.fetch_add(1, Ordering::SeqCst);
        if self.inner.faults.release_errors.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("injected release failure".to_string()));
        }
        self.inner.state.lock().unwrap().locks.remove(&item_id);
        Ok(())
    }
}

/// Session over an [`InMemoryFastStore`].
#[derive(Debug)]
pub struct InMemorySession {
    store: InMemoryFastStore,
    watched: HashMap<ItemId, u64>,
}

impl FastSession for InMemorySession {
    async fn watch(&mut self, item_id: ItemId) -> Result<(), StoreError> {
        self.store.check_reads()?;
        let version = self.store.inner.state.lock().unwrap().version(item_id);
        self.watched.insert(item_id, version);
        Ok(())
    }

    async fn unwatch(&mut self) -> Result<(), StoreError> {
        self.watched.clear();
        Ok(())
    }

    async fn get_count(&mut self, item_id: ItemId) -> Result<Option<i64>, StoreError> {
        self.store.get_count(item_id).await
    }

    async fn seed_count(&mut self, item_id: ItemId, value: i64) -> Result<bool, StoreError> {
        self.store.check_reads()?;
        let mut state = self.store.inner.state.lock().unwrap();
        if state.counts.contains_key(&item_id) {
            return Ok(false);
        }
        state.counts.insert(item_id, value);
        state.bump(item_id);
        Ok(true)
    }

    async fn decrement_atomic(&mut self, item_id: ItemId, quantity: u32) -> DecrementResult {
        tokio::task::yield_now().await;

        let inner = &self.store.inner;
        let watched = std::mem::take(&mut self.watched);

        if take_one(&inner.faults.failures_pending) {
            return DecrementResult::Failed(StoreError::Connection(
                "injected transaction failure".to_string(),
            ));
        }
        if take_one(&inner.faults.aborts_pending) {
            inner.counters.aborts.fetch_add(1, Ordering::SeqCst);
            return DecrementResult::Aborted;
        }

        let mut state = inner.state.lock().unwrap();
        if watched.iter().any(|(key, version)| state.version(*key) != *version) {
            inner.counters.aborts.fetch_add(1, Ordering::SeqCst);
            return DecrementResult::Aborted;
        }

        let count = state.counts.entry(item_id).or_insert(0);
        *count -= i64::from(quantity);
        let remaining = *count;
        state.bump(item_id);
        inner.counters.commits.fetch_add(1, Ordering::SeqCst);
        DecrementResult::Committed(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_after_watch_aborts_transaction() {
        let store = InMemoryFastStore::new();
        let id = ItemId::new(1);
        store.set_count(id, 10).await.unwrap();

        let mut session = store.session().await.unwrap();
        session.watch(id).await.unwrap();
        store.set_count(id, 9).await.unwrap();

        assert_eq!(session.decrement_atomic(id, 1).await, DecrementResult::Aborted);
        assert_eq!(store.count(id), Some(9));
    }

    #[tokio::test]
    async fn own_seed_aborts_until_rewatched() {
        let store = InMemoryFastStore::new();
        let id = ItemId::new(1);

        let mut session = store.session().await.unwrap();
        session.watch(id).await.unwrap();
        assert!(session.seed_count(id, 5).await.unwrap());
        assert_eq!(session.decrement_atomic(id, 1).await, DecrementResult::Aborted);

        session.watch(id).await.unwrap();
        assert_eq!(session.decrement_atomic(id, 1).await, DecrementResult::Committed(4));
    }

    #[tokio::test]
    async fn seed_does_not_overwrite() {
        let store = InMemoryFastStore::new();
        let id = ItemId::new(1);
        store.set_count(id, 3).await.unwrap();

        let mut session = store.session().await.unwrap();
        assert!(!session.seed_count(id, 100).await.unwrap());
        assert_eq!(store.count(id), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn lock_expires_after_ttl() {
        let store = InMemoryFastStore::new();
        let id = ItemId::new(1);
        let ttl = Duration::from_secs(5);

        assert!(store.acquire_lock(id, ttl).await.unwrap());
        assert!(!store.acquire_lock(id, ttl).await.unwrap());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!store.is_locked(id));
        assert!(store.acquire_lock(id, ttl).await.unwrap());
    }

    #[tokio::test]
    async fn injected_faults_are_consumed() {
        let store = InMemoryFastStore::new();
        let id = ItemId::new(1);
        store.set_count(id, 10).await.unwrap();
        store.abort_next_decrements(1);

        let mut session = store.session().await.unwrap();
        assert_eq!(session.decrement_atomic(id, 1).await, DecrementResult::Aborted);
        assert_eq!(session.decrement_atomic(id, 1).await, DecrementResult::Committed(9));
    }
}
