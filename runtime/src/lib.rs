//! # Stockguard Runtime
//!
//! The reservation workflow and its background machinery.
//!
//! ## Core Components
//!
//! - **[`LockCoordinator`]**: per-item lease with jittered retry and guaranteed release
//! - **[`ReservationOrchestrator`]**: lock, hydrate, validate, commit, dispatch
//! - **[`ReconciliationWorker`]**: applies sold quantities to the durable ledger
//! - **[`ReconciliationPool`]**: consumer loops over a task source
//! - **[`StockSynchronizer`]**: copies ledger stock into the fast store
//!
//! ## Example
//!
//! ```ignore
//! use stockguard_runtime::ReservationOrchestrator;
//!
//! let orchestrator = ReservationOrchestrator::new(store, ledger, queue, &config);
//! match orchestrator.purchase(&request).await {
//!     Ok(receipt) => println!("{} left", receipt.remaining),
//!     Err(e) => println!("{}: {}", e.error_code(), e.public_message()),
//! }
//! ```

/// In-process task lane
pub mod lane;

/// Item lock coordination
pub mod lock;

/// Prometheus metrics export
pub mod metrics;

/// Reconciliation consumer pool
pub mod pool;

/// Ledger reconciliation worker
pub mod reconciliation;

/// Purchase state machine
pub mod reservation;

/// Retry policies
pub mod retry;

/// Ledger to fast-store synchronization
pub mod sync;

/// Rate-limited logging
pub mod throttle;

pub use lane::ChannelTaskLane;
pub use lock::{LockCoordinator, LockGuard, LockUnavailable};
pub use self::metrics::{MetricsError, MetricsServer, register_metrics};
pub use pool::ReconciliationPool;
pub use reconciliation::{ReconciliationError, ReconciliationOutcome, ReconciliationWorker};
pub use reservation::{ReservationOrchestrator, ReservationReceipt, ReservationStage};
pub use retry::{Backoff, RetryPolicy, retry_with_predicate};
pub use sync::{StockSynchronizer, SyncError, SyncReport};
pub use throttle::LogThrottle;
