//! Dead letters for reconciliation tasks.
//!
//! A dead task is stock that was sold in the fast store but never persisted
//! in the ledger. Entries stay `pending` until an operator applies the
//! quantity by hand (`resolved`) or decides it must not be applied
//! (`discarded`).

use crate::ledger::ledger_error;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::future::Future;
use std::pin::Pin;
use stockguard_core::{
    DeadLetterError, DeadLetterSink, ItemId, LedgerError, ReconciliationTask, TaskId,
};
use uuid::Uuid;

/// Status of a dead reconciliation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterStatus {
    /// Waiting for an operator
    Pending,
    /// Quantity applied manually
    Resolved,
    /// Deliberately not applied
    Discarded,
}

impl DeadLetterStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Discarded => "discarded",
        }
    }

    /// Parse status from database string.
    ///
    /// # Errors
    ///
    /// Returns error if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, LedgerError> {
        match s {
            "pending" => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            "discarded" => Ok(Self::Discarded),
            _ => Err(LedgerError::DatabaseError(format!(
                "Invalid dead letter status: {s}"
            ))),
        }
    }
}

/// A row of `failed_reconciliations`.
#[derive(Debug, Clone)]
pub struct FailedReconciliation {
    /// Entry id
    pub id: i64,
    /// Task that failed
    pub task_id: TaskId,
    /// Item whose stock was sold
    pub item_id: ItemId,
    /// Units sold but not persisted
    pub quantity: i32,
    /// Attempts made before giving up
    pub attempts: i32,
    /// Last failure
    pub error_message: String,
    /// When the task was buried
    pub failed_at: DateTime<Utc>,
    /// Current status
    pub status: DeadLetterStatus,
    /// When an operator closed the entry
    pub resolved_at: Option<DateTime<Utc>>,
    /// Who closed it
    pub resolved_by: Option<String>,
    /// Operator notes
    pub resolution_notes: Option<String>,
}

/// `PostgreSQL` dead-letter store for reconciliation tasks.
///
/// # Example
///
/// ```no_run
/// use stockguard_postgres::DeadLetterQueue;
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let dlq = DeadLetterQueue::new(pool);
///
/// for entry in dlq.list_pending(100).await? {
///     println!("item {} lost {} units", entry.item_id, entry.quantity);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DeadLetterQueue {
    pool: PgPool,
}

impl DeadLetterQueue {
    /// Create a dead-letter queue on the given pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record a dead task.
    ///
    /// # Returns
    ///
    /// The id of the created entry.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] if the insert fails.
    pub async fn add_entry(
        &self,
        task: &ReconciliationTask,
        error_message: &str,
    ) -> Result<i64, LedgerError> {
        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO failed_reconciliations (
                task_id, item_id, quantity, attempts, error_message
            ) VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            ",
        )
        .bind(*task.task_id.as_uuid())
        .bind(task.item_id.get())
        .bind(i64::from(task.quantity))
        .bind(i64::from(task.attempt))
        .bind(error_message)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| ledger_error(&e))?;

        tracing::warn!(
            dlq_id = id,
            task_id = %task.task_id,
            item_id = %task.item_id,
            quantity = task.quantity,
            error = error_message,
            "Reconciliation task added to dead letters"
        );

        Ok(id)
    }

    /// List pending entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] if the query fails.
    pub async fn list_pending(&self, limit: usize) -> Result<Vec<FailedReconciliation>, LedgerError> {
        self.list_by_status(DeadLetterStatus::Pending, limit).await
    }

    /// List entries by status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] if the query fails.
    pub async fn list_by_status(
        &self,
        status: DeadLetterStatus,
        limit: usize,
    ) -> Result<Vec<FailedReconciliation>, LedgerError> {
        let rows = sqlx::query(
            r"
            SELECT
                id, task_id, item_id, quantity, attempts, error_message,
                failed_at, status, resolved_at, resolved_by, resolution_notes
            FROM failed_reconciliations
            WHERE status = $1
            ORDER BY failed_at ASC
            LIMIT $2
            ",
        )
        .bind(status.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ledger_error(&e))?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    /// Mark an entry resolved.
    ///
    /// # Arguments
    ///
    /// * `id` - The entry id
    /// * `resolved_by` - Who resolved it
    /// * `notes` - What was done
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] if the update fails.
    pub async fn mark_resolved(
        &self,
        id: i64,
        resolved_by: &str,
        notes: Option<&str>,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r"
            UPDATE failed_reconciliations
            SET status = 'resolved',
                resolved_at = NOW(),
                resolved_by = $1,
                resolution_notes = $2
            WHERE id = $3
            ",
        )
        .bind(resolved_by)
        .bind(notes)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| ledger_error(&e))?;

        tracing::info!(dlq_id = id, resolved_by, "Dead letter marked as resolved");
        Ok(())
    }

    /// Mark an entry discarded.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] if the update fails.
    pub async fn mark_discarded(&self, id: i64, reason: &str) -> Result<(), LedgerError> {
        sqlx::query(
            r"
            UPDATE failed_reconciliations
            SET status = 'discarded',
                resolved_at = NOW(),
                resolution_notes = $1
            WHERE id = $2
            ",
        )
        .bind(reason)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| ledger_error(&e))?;

        tracing::warn!(dlq_id = id, reason, "Dead letter marked as discarded");
        Ok(())
    }

    /// Count pending entries.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] if the query fails.
    pub async fn count_pending(&self) -> Result<i64, LedgerError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM failed_reconciliations WHERE status = 'pending'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| ledger_error(&e))?;

        Ok(count)
    }

    fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<FailedReconciliation, LedgerError> {
        let status: String = row.get("status");
        let task_id: Uuid = row.get("task_id");

        Ok(FailedReconciliation {
            id: row.get("id"),
            task_id: TaskId::from_uuid(task_id),
            item_id: ItemId::new(row.get("item_id")),
            quantity: row.get("quantity"),
            attempts: row.get("attempts"),
            error_message: row.get("error_message"),
            failed_at: row.get("failed_at"),
            status: DeadLetterStatus::parse(&status)?,
            resolved_at: row.get("resolved_at"),
            resolved_by: row.get("resolved_by"),
            resolution_notes: row.get("resolution_notes"),
        })
    }
}

impl DeadLetterSink for DeadLetterQueue {
    fn bury<'a>(
        &'a self,
        task: &'a ReconciliationTask,
        reason: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeadLetterError>> + Send + 'a>> {
        Box::pin(async move {
            self.add_entry(task, reason)
                .await
                .map(|_| ())
                .map_err(|e| DeadLetterError(e.to_string()))
        })
    }
}
