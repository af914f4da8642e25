//! # Stockguard Testing
//!
//! In-memory fakes of every collaborator trait, with fault injection and
//! call counters, so the reservation workflow can be exercised without Redis
//! or PostgreSQL.
//!
//! ## Example
//!
//! ```ignore
//! use stockguard_testing::{InMemoryFastStore, InMemoryLedger, RecordingTaskQueue};
//!
//! let store = InMemoryFastStore::new();
//! let ledger = Arc::new(InMemoryLedger::new());
//! let item = ledger.insert("Fashion Gadget", 100);
//! let queue = Arc::new(RecordingTaskQueue::new());
//! let orchestrator = ReservationOrchestrator::new(store, ledger, queue, &config);
//! ```

/// In-memory fast store
pub mod fast_store;

/// In-memory durable ledger
pub mod ledger;

/// Recording queue and dead-letter sink
pub mod queue;

pub use fast_store::{InMemoryFastStore, InMemorySession};
pub use ledger::InMemoryLedger;
pub use queue::{BuriedTask, MemoryDeadLetterSink, RecordingTaskQueue};

/// Install a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; later calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("stockguard=debug")),
        )
        .with_test_writer()
        .try_init();
}
