//! `PostgreSQL` adapters for stockguard.
//!
//! This crate provides the durable side of the system:
//!
//! - [`PostgresLedger`]: the [`DurableLedger`](stockguard_core::DurableLedger)
//!   over the `items` table, with task-id deduplication
//! - [`DeadLetterQueue`]: the [`DeadLetterSink`](stockguard_core::DeadLetterSink)
//!   over `failed_reconciliations`
//! - [`run_migrations`]: embedded schema
//!
//! # Example
//!
//! ```ignore
//! use stockguard_postgres::{PostgresLedger, run_migrations};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let ledger = PostgresLedger::new("postgres://localhost/stockguard", 10).await?;
//!     run_migrations(ledger.pool()).await?;
//!     ledger.seed_demo_catalog().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod dead_letter_queue;
mod ledger;
mod migrations;

pub use dead_letter_queue::{DeadLetterQueue, DeadLetterStatus, FailedReconciliation};
pub use ledger::PostgresLedger;
pub use migrations::run_migrations;
