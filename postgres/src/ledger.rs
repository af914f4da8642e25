//! `PostgreSQL` durable ledger.
//!
//! Stock lives in `items.stock` (`CHECK (stock >= 0)`); soft-deleted rows
//! carry a `deleted_at` timestamp. Every applied reconciliation inserts its
//! task id into `stock_reconciliations` in the same transaction as the stock
//! update, so a redelivered task is applied at most once.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use stockguard_core::{DecrementOutcome, DurableLedger, ItemId, LedgerError, StockRecord, TaskId};

/// Map a sqlx error onto the ledger taxonomy.
pub(crate) fn ledger_error(error: &sqlx::Error) -> LedgerError {
    match error {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            LedgerError::Unavailable(error.to_string())
        }
        _ => LedgerError::DatabaseError(error.to_string()),
    }
}

fn record_from_row(row: &PgRow) -> Result<StockRecord, LedgerError> {
    let id: i64 = row.get("id");
    let stock: i32 = row.get("stock");
    let deleted_at: Option<DateTime<Utc>> = row.get("deleted_at");
    let stock = u32::try_from(stock).map_err(|_| LedgerError::CorruptRecord {
        item_id: id,
        reason: format!("negative stock {stock}"),
    })?;

    Ok(StockRecord {
        id: ItemId::new(id),
        name: row.get("name"),
        stock,
        deleted: deleted_at.is_some(),
        updated_at: row.get("updated_at"),
    })
}

/// [`DurableLedger`] over the `items` table.
///
/// # Example
///
/// ```no_run
/// use stockguard_postgres::PostgresLedger;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let ledger = PostgresLedger::new("postgres://localhost/stockguard", 10).await?;
/// stockguard_postgres::run_migrations(ledger.pool()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Connect with a pool of at most `max_connections`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unavailable`] if the database cannot be reached.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| LedgerError::Unavailable(format!("Failed to connect to database: {e}")))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a new item and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] if the insert fails.
    pub async fn create_item(&self, name: &str, stock: u32) -> Result<ItemId, LedgerError> {
        let (id,): (i64,) =
            sqlx::query_as("INSERT INTO items (name, stock) VALUES ($1, $2) RETURNING id")
                .bind(name)
                .bind(i64::from(stock))
                .fetch_one(&self.pool)
                .await
                .map_err(|e| ledger_error(&e))?;
        tracing::info!(item_id = id, name, stock, "Item created");
        Ok(ItemId::new(id))
    }

    /// Soft-delete an item. Returns `false` if it was missing or already
    /// deleted.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] if the update fails.
    pub async fn soft_delete(&self, item_id: ItemId) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            "UPDATE items SET deleted_at = now(), updated_at = now() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(item_id.get())
        .execute(&self.pool)
        .await
        .map_err(|e| ledger_error(&e))?;
        Ok(result.rows_affected() == 1)
    }

    /// Insert the demo catalog when `items` is empty. Returns the number of
    /// rows inserted.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DatabaseError`] if a query fails.
    pub async fn seed_demo_catalog(&self) -> Result<usize, LedgerError> {
        let (existing,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ledger_error(&e))?;
        if existing > 0 {
            tracing::info!(existing, "Catalog already populated; skipping seed");
            return Ok(0);
        }

        let catalog = [("Fashion Gadget", 100), ("Super Device", 50)];
        for (name, stock) in catalog {
            self.create_item(name, stock).await?;
        }
        Ok(catalog.len())
    }
}

impl DurableLedger for PostgresLedger {
    async fn find(&self, item_id: ItemId) -> Result<Option<StockRecord>, LedgerError> {
        let row = sqlx::query(
            "SELECT id, name, stock, updated_at, deleted_at FROM items WHERE id = $1",
        )
        .bind(item_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ledger_error(&e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let record = record_from_row(&row)?;
        Ok(record.is_purchasable().then_some(record))
    }

    async fn list_active(&self) -> Result<Vec<StockRecord>, LedgerError> {
        let rows = sqlx::query(
            r"
            SELECT id, name, stock, updated_at, deleted_at
            FROM items
            WHERE deleted_at IS NULL
            ORDER BY id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ledger_error(&e))?;

        rows.iter().map(record_from_row).collect()
    }

    async fn decrement_stock(
        &self,
        item_id: ItemId,
        quantity: u32,
        task_id: TaskId,
    ) -> Result<DecrementOutcome, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(|e| ledger_error(&e))?;

        let claimed = sqlx::query(
            r"
            INSERT INTO stock_reconciliations (task_id, item_id, quantity)
            SELECT $1, id, $3 FROM items WHERE id = $2 AND deleted_at IS NULL
            ON CONFLICT (task_id) DO NOTHING
            ",
        )
        .bind(*task_id.as_uuid())
        .bind(item_id.get())
        .bind(i64::from(quantity))
        .execute(&mut *tx)
        .await
        .map_err(|e| ledger_error(&e))?
        .rows_affected();

        if claimed == 0 {
            let (seen,): (bool,) = sqlx::query_as(
                "SELECT EXISTS (SELECT 1 FROM stock_reconciliations WHERE task_id = $1)",
            )
            .bind(*task_id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| ledger_error(&e))?;
            tx.rollback().await.map_err(|e| ledger_error(&e))?;
            return Ok(if seen {
                DecrementOutcome::AlreadyApplied
            } else {
                DecrementOutcome::NotFound
            });
        }

        let (previous,): (i32,) =
            sqlx::query_as("SELECT stock FROM items WHERE id = $1 FOR UPDATE")
                .bind(item_id.get())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| ledger_error(&e))?;
        let previous = u32::try_from(previous).map_err(|_| LedgerError::CorruptRecord {
            item_id: item_id.get(),
            reason: format!("negative stock {previous}"),
        })?;
        let current = previous.saturating_sub(quantity);

        sqlx::query("UPDATE items SET stock = $1, updated_at = now() WHERE id = $2")
            .bind(i64::from(current))
            .bind(item_id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| ledger_error(&e))?;

        tx.commit().await.map_err(|e| ledger_error(&e))?;
        Ok(DecrementOutcome::Applied { previous, current })
    }
}
