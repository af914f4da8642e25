//! Fast store abstraction: shared counters, optimistic transactions and a
//! lease lock.
//!
//! # Sessions
//!
//! A WATCH read-set belongs to a connection, so optimistic operations go
//! through a [`FastSession`] obtained from [`FastStore::session`]. One
//! session serves exactly one reservation attempt and is dropped after the
//! commit or abort, which discards its read-set.
//!
//! # Locks
//!
//! [`FastStore::acquire_lock`] is set-if-absent with expiry and
//! [`FastStore::release_lock`] is an unconditional delete. No owner token is
//! stored: once a lease expires another caller may take it, and a slow first
//! holder may then delete the second holder's lock. The optimistic
//! transaction is what keeps the counter correct in that window.
//!
//! # Implementations
//!
//! - `RedisFastStore` in `stockguard-redis`
//! - `InMemoryFastStore` in `stockguard-testing`

use crate::error::StoreError;
use crate::item::ItemId;
use std::future::Future;
use std::time::Duration;

/// Result of [`FastSession::decrement_atomic`].
///
/// The three outcomes are kept apart even though the orchestrator reports
/// both failures the same way, so telemetry can tell a racing writer from a
/// store fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecrementResult {
    /// Transaction applied; carries the new count.
    Committed(i64),
    /// A watched key changed since `watch`; nothing was applied.
    Aborted,
    /// The store or transport errored; nothing is known to be applied.
    Failed(StoreError),
}

/// Shared low-latency key-value store.
///
/// Cloning must yield a handle to the same store, so a lock taken through
/// one clone can be released through another.
pub trait FastStore: Clone + Send + Sync + 'static {
    /// Per-attempt optimistic session.
    type Session: FastSession;

    /// Open a session on a connection dedicated to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if no connection can be opened.
    fn session(&self) -> impl Future<Output = Result<Self::Session, StoreError>> + Send;

    /// Connectivity check.
    ///
    /// # Errors
    ///
    /// Returns error if the store does not answer.
    fn ping(&self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Read the cached count. `None` means the key was never hydrated.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or a non-integer value.
    fn get_count(&self, item_id: ItemId)
    -> impl Future<Output = Result<Option<i64>, StoreError>> + Send;

    /// Overwrite the cached count.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure.
    fn set_count(
        &self,
        item_id: ItemId,
        value: i64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Try to take the lease lock for `item_id`. `Ok(false)` means another
    /// caller holds it.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure.
    fn acquire_lock(
        &self,
        item_id: ItemId,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Delete the lock key, whoever holds it.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure.
    fn release_lock(&self, item_id: ItemId) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Optimistic read-modify-write scope over one connection.
pub trait FastSession: Send {
    /// Add the stock key of `item_id` to the read-set.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure.
    fn watch(&mut self, item_id: ItemId) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Clear the read-set.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure.
    fn unwatch(&mut self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Read the cached count on this session's connection.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or a non-integer value.
    fn get_count(
        &mut self,
        item_id: ItemId,
    ) -> impl Future<Output = Result<Option<i64>, StoreError>> + Send;

    /// Seed the cached count if the key is still absent. Returns `true` if
    /// this call wrote the value.
    ///
    /// Any write to a watched key, including one from this session, aborts
    /// the next transaction, so callers re-arm the read-set after seeding.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure.
    fn seed_count(
        &mut self,
        item_id: ItemId,
        value: i64,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Decrement inside a transaction guarded by the read-set.
    fn decrement_atomic(
        &mut self,
        item_id: ItemId,
        quantity: u32,
    ) -> impl Future<Output = DecrementResult> + Send;
}
