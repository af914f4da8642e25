//! In-memory durable ledger with failure injection.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use stockguard_core::{DecrementOutcome, DurableLedger, ItemId, LedgerError, StockRecord, TaskId};

#[derive(Debug, Default)]
struct State {
    records: BTreeMap<ItemId, StockRecord>,
    applied: HashSet<TaskId>,
    next_id: i64,
}

#[derive(Debug, Default)]
struct Inner {
    state: RwLock<State>,
    find_calls: AtomicUsize,
    decrement_calls: AtomicUsize,
    failures_pending: AtomicU32,
    always_fail: AtomicBool,
}

/// Shared in-memory [`DurableLedger`]. Clones share state.
///
/// Deduplicates decrements by task id like the PostgreSQL ledger.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    inner: Arc<Inner>,
}

impl InMemoryLedger {
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item with the next free id.
    pub fn insert(&self, name: &str, stock: u32) -> ItemId {
        let mut state = self.inner.state.write().unwrap();
        state.next_id += 1;
        let id = ItemId::new(state.next_id);
        state.records.insert(
            id,
            StockRecord {
                id,
                name: name.to_string(),
                stock,
                deleted: false,
                updated_at: Utc::now(),
            },
        );
        id
    }

    /// Mark a record deleted. It stays in storage but is never purchasable.
    pub fn soft_delete(&self, item_id: ItemId) {
        if let Some(record) = self.inner.state.write().unwrap().records.get_mut(&item_id) {
            record.deleted = true;
        }
    }

    /// Overwrite stored stock, bypassing the trait.
    pub fn set_stock(&self, item_id: ItemId, stock: u32) {
        if let Some(record) = self.inner.state.write().unwrap().records.get_mut(&item_id) {
            record.stock = stock;
        }
    }

    /// Stored stock, deleted or not.
    #[must_use]
    pub fn stock(&self, item_id: ItemId) -> Option<u32> {
        self.inner
            .state
            .read()
            .unwrap()
            .records
            .get(&item_id)
            .map(|r| r.stock)
    }

    /// Fail the next `n` ledger operations with [`LedgerError::Unavailable`].
    pub fn fail_next(&self, n: u32) {
        self.inner.failures_pending.store(n, Ordering::SeqCst);
    }

    /// Fail every ledger operation until turned off.
    pub fn fail_always(&self, fail: bool) {
        self.inner.always_fail.store(fail, Ordering::SeqCst);
    }

    /// `find` calls so far.
    #[must_use]
    pub fn find_calls(&self) -> usize {
        self.inner.find_calls.load(Ordering::SeqCst)
    }

    /// `decrement_stock` calls so far.
    #[must_use]
    pub fn decrement_calls(&self) -> usize {
        self.inner.decrement_calls.load(Ordering::SeqCst)
    }

    /// Distinct task ids applied.
    #[must_use]
    pub fn applied_tasks(&self) -> usize {
        self.inner.state.read().unwrap().applied.len()
    }

    fn injected_failure(&self) -> Result<(), LedgerError> {
        let pending = self
            .inner
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if pending || self.inner.always_fail.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

impl DurableLedger for InMemoryLedger {
    async fn find(&self, item_id: ItemId) -> Result<Option<StockRecord>, LedgerError> {
        self.inner.find_calls.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()?;
        let state = self.inner.state.read().unwrap();
        Ok(state
            .records
            .get(&item_id)
            .filter(|r| r.is_purchasable())
            .cloned())
    }

    async fn list_active(&self) -> Result<Vec<StockRecord>, LedgerError> {
        self.injected_failure()?;
        let state = self.inner.state.read().unwrap();
        Ok(state
            .records
            .values()
            .filter(|r| r.is_purchasable())
            .cloned()
            .collect())
    }

    async fn decrement_stock(
        &self,
        item_id: ItemId,
        quantity: u32,
        task_id: TaskId,
    ) -> Result<DecrementOutcome, LedgerError> {
        self.inner.decrement_calls.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()?;
        let mut state = self.inner.state.write().unwrap();
        if state.applied.contains(&task_id) {
            return Ok(DecrementOutcome::AlreadyApplied);
        }
        let Some(record) = state.records.get_mut(&item_id).filter(|r| r.is_purchasable()) else {
            return Ok(DecrementOutcome::NotFound);
        };
        let previous = record.stock;
        let current = record.stock_after(quantity);
        record.stock = current;
        record.updated_at = Utc::now();
        state.applied.insert(task_id);
        Ok(DecrementOutcome::Applied { previous, current })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decrement_clamps_and_dedups() {
        let ledger = InMemoryLedger::new();
        let id = ledger.insert("Super Device", 2);
        let task = TaskId::new();

        let first = ledger.decrement_stock(id, 5, task).await.unwrap();
        assert_eq!(first, DecrementOutcome::Applied { previous: 2, current: 0 });

        let again = ledger.decrement_stock(id, 5, task).await.unwrap();
        assert_eq!(again, DecrementOutcome::AlreadyApplied);
        assert_eq!(ledger.stock(id), Some(0));
    }

    #[tokio::test]
    async fn deleted_records_are_invisible() {
        let ledger = InMemoryLedger::new();
        let id = ledger.insert("Retired", 4);
        ledger.soft_delete(id);

        assert_eq!(ledger.find(id).await.unwrap(), None);
        assert!(ledger.list_active().await.unwrap().is_empty());
        assert_eq!(
            ledger.decrement_stock(id, 1, TaskId::new()).await.unwrap(),
            DecrementOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn injected_failures_run_out() {
        let ledger = InMemoryLedger::new();
        let id = ledger.insert("Fashion Gadget", 1);
        ledger.fail_next(1);

        assert!(ledger.find(id).await.is_err());
        assert!(ledger.find(id).await.unwrap().is_some());
        assert_eq!(ledger.find_calls(), 2);
    }
}
