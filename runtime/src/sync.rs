//! Overwrite fast-store counts from the durable ledger.
//!
//! Operational tool for cold starts and after manual ledger edits. The
//! ledger lags the fast store by whatever is still queued on the
//! stock-updates lane, so run it only once that lane has drained; otherwise
//! units sold but not yet reconciled become sellable again.

use stockguard_core::{DurableLedger, FastStore, ItemId, LedgerError, StockRecord, StoreError};
use thiserror::Error;

/// Failure syncing a single item.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// No purchasable record for the item.
    #[error("Item {0} not found")]
    NotFound(ItemId),

    /// Ledger read failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Fast store write failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Totals from [`StockSynchronizer::sync_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Items written to the fast store
    pub synced: usize,
    /// Items with no purchasable ledger record
    pub missing: Vec<ItemId>,
    /// Items whose ledger read or store write failed
    pub failed: Vec<ItemId>,
}

/// Copies ledger stock into the fast store.
pub struct StockSynchronizer<'a, S, L> {
    store: &'a S,
    ledger: &'a L,
}

impl<'a, S: FastStore, L: DurableLedger> StockSynchronizer<'a, S, L> {
    /// Borrow the two stores.
    #[must_use]
    pub const fn new(store: &'a S, ledger: &'a L) -> Self {
        Self { store, ledger }
    }

    /// Sync one item and return the stock written.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] for missing or soft-deleted records,
    /// otherwise the ledger or store error.
    pub async fn sync_item(&self, item_id: ItemId) -> Result<u32, SyncError> {
        let record = self
            .ledger
            .find(item_id)
            .await?
            .ok_or(SyncError::NotFound(item_id))?;
        self.write(&record).await?;
        Ok(record.stock)
    }

    /// Sync the given items, collecting per-item results.
    pub async fn sync_items(&self, item_ids: &[ItemId]) -> SyncReport {
        let mut report = SyncReport::default();
        for &item_id in item_ids {
            match self.sync_item(item_id).await {
                Ok(_) => report.synced += 1,
                Err(SyncError::NotFound(_)) => {
                    tracing::warn!(item_id = %item_id, "Item not found; skipping sync");
                    report.missing.push(item_id);
                }
                Err(SyncError::Ledger(e)) => {
                    tracing::error!(item_id = %item_id, error = %e, "Failed to read item for sync");
                    report.failed.push(item_id);
                }
                Err(SyncError::Store(_)) => report.failed.push(item_id),
            }
        }
        report
    }

    /// Sync every purchasable item. Per-item failures are logged and
    /// reported, never abort the batch.
    ///
    /// # Errors
    ///
    /// Returns error only if the ledger cannot list the items.
    pub async fn sync_all(&self) -> Result<SyncReport, LedgerError> {
        let records = self.ledger.list_active().await?;
        let mut report = SyncReport::default();
        for record in &records {
            match self.write(record).await {
                Ok(()) => report.synced += 1,
                Err(_) => report.failed.push(record.id),
            }
        }
        tracing::info!(
            synced = report.synced,
            missing = report.missing.len(),
            failed = report.failed.len(),
            "Stock synchronization complete"
        );
        Ok(report)
    }

    async fn write(&self, record: &StockRecord) -> Result<(), StoreError> {
        match self.store.set_count(record.id, i64::from(record.stock)).await {
            Ok(()) => {
                tracing::info!(item_id = %record.id, stock = record.stock, "Item stock synchronized");
                metrics::counter!("stock_sync_items_total").increment(1);
                Ok(())
            }
            Err(e) => {
                tracing::error!(item_id = %record.id, error = %e, "Failed to sync item stock");
                Err(e)
            }
        }
    }
}
