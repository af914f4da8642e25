//! Durable ledger: the source of truth for baseline stock.
//!
//! The reservation workflow reads it only when the fast store has no count
//! for an item. Only the reconciliation worker writes to it.

use crate::error::LedgerError;
use crate::item::{ItemId, StockRecord};
use crate::task::TaskId;
use std::future::Future;

/// Result of [`DurableLedger::decrement_stock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecrementOutcome {
    /// Stock was reduced (clamped at zero).
    Applied {
        /// Stock before the write
        previous: u32,
        /// Stock after the write
        current: u32,
    },
    /// This task id was applied before; nothing changed.
    AlreadyApplied,
    /// No purchasable record exists.
    NotFound,
}

/// Persistent record store.
pub trait DurableLedger: Send + Sync {
    /// Load a purchasable record. Missing and soft-deleted records both
    /// yield `None`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unavailable`] when the store cannot be reached.
    fn find(
        &self,
        item_id: ItemId,
    ) -> impl Future<Output = Result<Option<StockRecord>, LedgerError>> + Send;

    /// Every purchasable record, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn list_active(&self) -> impl Future<Output = Result<Vec<StockRecord>, LedgerError>> + Send;

    /// Apply `stock = max(0, stock - quantity)` once per `task_id`.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails; nothing is applied in that case.
    fn decrement_stock(
        &self,
        item_id: ItemId,
        quantity: u32,
        task_id: TaskId,
    ) -> impl Future<Output = Result<DecrementOutcome, LedgerError>> + Send;
}
