//! # Stockguard Core
//!
//! Domain types and collaborator traits for selling a finite, shared stock
//! to many concurrent buyers without overselling.
//!
//! ## Core Concepts
//!
//! - **Fast store**: low-latency shared counter used for admission decisions
//!   ([`FastStore`], [`FastSession`])
//! - **Durable ledger**: slower source of truth for baseline stock
//!   ([`DurableLedger`])
//! - **Reconciliation task**: asynchronous unit of work that applies a
//!   confirmed fast-store decrement to the ledger ([`ReconciliationTask`])
//! - **Task queue**: at-least-once lane between the two ([`TaskQueue`],
//!   [`TaskSource`], [`DeadLetterSink`])
//!
//! This crate performs no I/O. Implementations live in `stockguard-redis`,
//! `stockguard-postgres` and `stockguard-testing`; the workflow that
//! composes them lives in `stockguard-runtime`.
//!
//! ## Example
//!
//! ```
//! use stockguard_core::{ItemId, PurchaseRequest, Requester};
//!
//! let request = PurchaseRequest::new(ItemId::new(7), 3, Requester::User(42), 1000)?;
//! assert_eq!(request.quantity(), 3);
//! # Ok::<(), stockguard_core::RequestError>(())
//! ```

pub mod config;
pub mod error;
pub mod fast_store;
pub mod item;
pub mod ledger;
pub mod queue;
pub mod task;

pub use config::{DelayRange, LockPolicy, ReconciliationConfig, ReservationConfig};
pub use error::{
    DeadLetterError, LedgerError, PurchaseError, QueueError, RequestError, StoreError,
};
pub use fast_store::{DecrementResult, FastSession, FastStore};
pub use item::{ItemId, PurchaseRequest, Requester, StockRecord};
pub use ledger::{DecrementOutcome, DurableLedger};
pub use queue::{DeadLetterSink, Delivery, TaskQueue, TaskSource};
pub use task::{ReconciliationTask, TaskId, STOCK_UPDATES_LANE};
