//! Consumer pool for the stock-updates lane.
//!
//! Each consumer runs a receive-handle-ack loop:
//!
//! ```text
//! loop {
//!     select {
//!         shutdown  => exit
//!         receive() => Some(task) => worker.handle(task); ack
//!                      None       => poll again
//!                      Closed     => exit
//!                      Err        => log, back off, poll again
//!     }
//! }
//! ```
//!
//! A task being handled is never interrupted by shutdown; the consumer exits
//! after acknowledging it.

use crate::reconciliation::{ReconciliationOutcome, ReconciliationWorker};
use std::sync::Arc;
use std::time::Duration;
use stockguard_core::{DurableLedger, QueueError, TaskSource};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A fixed number of consumers sharing one [`TaskSource`].
pub struct ReconciliationPool<L> {
    worker: Arc<ReconciliationWorker<L>>,
    source: Arc<dyn TaskSource>,
    concurrency: usize,
    error_backoff: Duration,
}

impl<L: DurableLedger + 'static> ReconciliationPool<L> {
    /// Create a pool of `concurrency` consumers (at least one).
    #[must_use]
    pub fn new(
        worker: Arc<ReconciliationWorker<L>>,
        source: Arc<dyn TaskSource>,
        concurrency: usize,
    ) -> Self {
        Self {
            worker,
            source,
            concurrency: concurrency.max(1),
            error_backoff: Duration::from_secs(5),
        }
    }

    /// Delay after a receive error before polling again (default: 5s).
    #[must_use]
    pub const fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Spawn every consumer on the current runtime.
    ///
    /// Consumers stop when `shutdown` broadcasts or is dropped, or when the
    /// source reports [`QueueError::Closed`].
    #[must_use]
    pub fn spawn(self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        info!(concurrency = self.concurrency, "Starting reconciliation consumers");
        (0..self.concurrency)
            .map(|consumer| {
                let worker = Arc::clone(&self.worker);
                let source = Arc::clone(&self.source);
                let shutdown = shutdown.subscribe();
                let backoff = self.error_backoff;
                tokio::spawn(run_consumer(consumer, worker, source, shutdown, backoff))
            })
            .collect()
    }
}

async fn run_consumer<L: DurableLedger>(
    consumer: usize,
    worker: Arc<ReconciliationWorker<L>>,
    source: Arc<dyn TaskSource>,
    mut shutdown: broadcast::Receiver<()>,
    error_backoff: Duration,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!(consumer, "Reconciliation consumer received shutdown signal");
                break;
            }
            received = source.receive() => match received {
                Ok(Some(delivery)) => {
                    let outcome = worker.handle(delivery.task.clone()).await;
                    if matches!(outcome, ReconciliationOutcome::Dead) {
                        warn!(consumer, task_id = %delivery.task.task_id, "Task moved to dead letters");
                    }
                    if let Err(e) = source.ack(&delivery).await {
                        error!(
                            consumer,
                            task_id = %delivery.task.task_id,
                            error = %e,
                            "Failed to acknowledge task; it may be redelivered"
                        );
                    }
                }
                Ok(None) => {}
                Err(QueueError::Closed) => {
                    info!(consumer, "Task lane closed");
                    break;
                }
                Err(e) => {
                    error!(consumer, error = %e, "Failed to receive task");
                    tokio::time::sleep(error_backoff).await;
                }
            }
        }
    }
    info!(consumer, "Reconciliation consumer stopped");
}
