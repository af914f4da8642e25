//! Embedded schema migrations.
//!
//! Every script is idempotent (`IF NOT EXISTS`), so applying them again is
//! a no-op.

use crate::ledger::ledger_error;
use sqlx::PgPool;
use stockguard_core::LedgerError;

const MIGRATIONS: &[(&str, &str)] = &[
    ("0001_items", include_str!("../migrations/0001_items.sql")),
    (
        "0002_stock_reconciliations",
        include_str!("../migrations/0002_stock_reconciliations.sql"),
    ),
    (
        "0003_failed_reconciliations",
        include_str!("../migrations/0003_failed_reconciliations.sql"),
    ),
];

/// Apply every migration in order.
///
/// # Errors
///
/// Returns [`LedgerError::DatabaseError`] naming the first script that failed.
pub async fn run_migrations(pool: &PgPool) -> Result<(), LedgerError> {
    for (name, sql) in MIGRATIONS {
        sqlx::raw_sql(sql).execute(pool).await.map_err(|e| {
            LedgerError::DatabaseError(format!("Migration {name} failed: {}", ledger_error(&e)))
        })?;
        tracing::info!(migration = name, "Migration applied");
    }
    Ok(())
}
