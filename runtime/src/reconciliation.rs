//! Reconciliation worker: applies confirmed fast-store decrements to the
//! durable ledger.
//!
//! # Per-task behavior
//!
//! - Record present: `stock = max(0, stock - quantity)`. A ledger stock lower
//!   than the quantity is pre-existing drift; it is logged as a warning and
//!   the clamped write still happens.
//! - Record missing or soft-deleted: logged as an integrity error and not
//!   retried, since retrying cannot create the record.
//! - Ledger unavailable: retried with a fixed delay up to the configured
//!   number of attempts, then handed to the [`DeadLetterSink`]. A dead task is
//!   stock that was sold but never persisted, so it is always surfaced.
//!
//! Failures here never reach the caller that made the sale.

use crate::retry::{Backoff, RetryPolicy, retry_with_predicate};
use std::sync::Arc;
use stockguard_core::{
    DeadLetterSink, DecrementOutcome, DurableLedger, LedgerError, ReconciliationConfig,
    ReconciliationTask,
};
use thiserror::Error;

/// Why a single attempt did not apply the task.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconciliationError {
    /// Ledger unreachable or query failed; worth retrying.
    #[error("Transient ledger failure: {0}")]
    Transient(LedgerError),

    /// Ledger returned data that retrying will not change.
    #[error("Permanent ledger failure: {0}")]
    Permanent(LedgerError),

    /// No purchasable record for the item.
    #[error("Record missing")]
    RecordMissing,
}

impl ReconciliationError {
    /// Whether another attempt may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<LedgerError> for ReconciliationError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::Unavailable(_) | LedgerError::DatabaseError(_) => Self::Transient(error),
            LedgerError::CorruptRecord { .. } => Self::Permanent(error),
        }
    }
}

/// What happened to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    /// Ledger stock reduced.
    Applied {
        /// Stock before
        previous: u32,
        /// Stock after
        current: u32,
    },
    /// Task id already applied; nothing changed.
    Duplicate,
    /// Record missing; logged, not retried.
    RecordMissing,
    /// Retries exhausted or permanent failure; handed to the dead-letter sink.
    Dead,
}

/// Applies [`ReconciliationTask`]s to a [`DurableLedger`].
pub struct ReconciliationWorker<L> {
    ledger: Arc<L>,
    dead_letters: Arc<dyn DeadLetterSink>,
    policy: RetryPolicy,
}

impl<L: DurableLedger> ReconciliationWorker<L> {
    /// Create a worker using the configured attempts and fixed delay.
    #[must_use]
    pub fn new(
        ledger: Arc<L>,
        dead_letters: Arc<dyn DeadLetterSink>,
        config: &ReconciliationConfig,
    ) -> Self {
        Self::with_policy(
            ledger,
            dead_letters,
            RetryPolicy::new(config.max_retries, Backoff::Fixed(config.retry_delay())),
        )
    }

    /// Create a worker with an explicit retry policy.
    #[must_use]
    pub fn with_policy(
        ledger: Arc<L>,
        dead_letters: Arc<dyn DeadLetterSink>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            dead_letters,
            policy,
        }
    }

    /// Apply one task, retrying transient failures.
    pub async fn handle(&self, task: ReconciliationTask) -> ReconciliationOutcome {
        let mut attempt = task.attempt;
        let result = retry_with_predicate(
            &self.policy,
            || {
                attempt += 1;
                if attempt > task.attempt + 1 {
                    metrics::counter!("reconciliation_retries_total").increment(1);
                }
                let current = ReconciliationTask {
                    attempt,
                    ..task.clone()
                };
                async move { self.apply_once(&current).await }
            },
            ReconciliationError::is_transient,
        )
        .await;

        match result {
            Ok(outcome) => outcome,
            Err(ReconciliationError::RecordMissing) => ReconciliationOutcome::RecordMissing,
            Err(error) => {
                let dead = ReconciliationTask { attempt, ..task };
                self.bury(&dead, &error).await;
                ReconciliationOutcome::Dead
            }
        }
    }

    async fn apply_once(
        &self,
        task: &ReconciliationTask,
    ) -> Result<ReconciliationOutcome, ReconciliationError> {
        let item_id = task.item_id;

        let Some(record) = self.ledger.find(item_id).await? else {
            tracing::error!(
                item_id = %item_id,
                task_id = %task.task_id,
                quantity = task.quantity,
                "Item not found for stock update"
            );
            metrics::counter!("reconciliation_missing_records_total").increment(1);
            return Err(ReconciliationError::RecordMissing);
        };

        if record.stock < task.quantity {
            tracing::warn!(
                item_id = %item_id,
                task_id = %task.task_id,
                ledger_stock = record.stock,
                quantity = task.quantity,
                "Ledger stock below sold quantity; clamping at zero"
            );
            metrics::counter!("ledger_drift_total").increment(1);
        }

        match self
            .ledger
            .decrement_stock(item_id, task.quantity, task.task_id)
            .await?
        {
            DecrementOutcome::Applied { previous, current } => {
                tracing::info!(
                    item_id = %item_id,
                    task_id = %task.task_id,
                    quantity = task.quantity,
                    previous,
                    current,
                    attempt = task.attempt,
                    "Ledger stock updated"
                );
                metrics::counter!("reconciliation_applied_total").increment(1);
                Ok(ReconciliationOutcome::Applied { previous, current })
            }
            DecrementOutcome::AlreadyApplied => {
                tracing::info!(
                    item_id = %item_id,
                    task_id = %task.task_id,
                    "Reconciliation task already applied; skipping"
                );
                metrics::counter!("reconciliation_duplicates_total").increment(1);
                Ok(ReconciliationOutcome::Duplicate)
            }
            DecrementOutcome::NotFound => {
                tracing::error!(
                    item_id = %item_id,
                    task_id = %task.task_id,
                    "Item disappeared before stock update"
                );
                metrics::counter!("reconciliation_missing_records_total").increment(1);
                Err(ReconciliationError::RecordMissing)
            }
        }
    }

    async fn bury(&self, task: &ReconciliationTask, error: &ReconciliationError) {
        let reason = error.to_string();
        tracing::error!(
            alert = true,
            item_id = %task.item_id,
            task_id = %task.task_id,
            quantity = task.quantity,
            attempts = task.attempt,
            error = %reason,
            "Reconciliation exhausted; sold stock not persisted"
        );
        metrics::counter!("reconciliation_dead_total").increment(1);

        if let Err(e) = self.dead_letters.bury(task, &reason).await {
            tracing::error!(
                alert = true,
                item_id = %task.item_id,
                task_id = %task.task_id,
                quantity = task.quantity,
                error = %e,
                "Failed to record dead reconciliation task"
            );
        }
    }
}
