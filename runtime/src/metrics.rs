//! Prometheus metrics export.
//!
//! Components record through the `metrics` macros directly; this module
//! installs the Prometheus recorder and describes every metric.
//!
//! # Example
//!
//! ```rust,no_run
//! use stockguard_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! // Scrape http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics recorder
    #[error("Failed to install metrics recorder: {0}")]
    Install(String),
}

/// Prometheus scrape endpoint.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a server bound to `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the global recorder and spawn the HTTP listener.
    ///
    /// Must be called from inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or bound. A recorder
    /// installed earlier in the process is tolerated: the call logs a
    /// warning and leaves [`Self::handle`] empty.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        match metrics::set_global_recorder(recorder) {
            Ok(()) => {
                tokio::spawn(async move {
                    if let Err(e) = exporter.await {
                        tracing::error!(error = ?e, "Metrics exporter stopped");
                    }
                });
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                if message.contains("already") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(message))
                }
            }
        }
    }

    /// Handle of the installed recorder, if this server installed it.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Describe every metric recorded by the stockguard crates.
pub fn register_metrics() {
    // Reservation
    describe_counter!("reservation_attempts_total", "Purchase attempts started");
    describe_counter!(
        "reservation_outcomes_total",
        "Purchase attempts by outcome (ok or error code)"
    );
    describe_histogram!(
        "reservation_duration_seconds",
        "Time from lock request to purchase result"
    );
    describe_counter!(
        "fast_store_transaction_aborts_total",
        "Guarded decrements aborted by a concurrent write"
    );
    describe_counter!(
        "fast_store_transaction_failures_total",
        "Guarded decrements that failed in transport"
    );
    describe_counter!(
        "reconciliation_enqueue_failures_total",
        "Committed sales whose reconciliation task could not be enqueued"
    );

    // Locks
    describe_counter!("lock_acquire_failures_total", "Failed lock acquisition attempts");
    describe_counter!("lock_unavailable_total", "Lock acquisitions that exhausted retries");
    describe_counter!("lock_release_failures_total", "Lock releases that failed");

    // Reconciliation
    describe_counter!("reconciliation_applied_total", "Tasks applied to the ledger");
    describe_counter!("reconciliation_retries_total", "Task re-attempts after a transient failure");
    describe_counter!("reconciliation_duplicates_total", "Redelivered tasks skipped");
    describe_counter!(
        "reconciliation_missing_records_total",
        "Tasks whose ledger record was missing"
    );
    describe_counter!("reconciliation_dead_total", "Tasks moved to dead letters");
    describe_counter!("ledger_drift_total", "Ledger stock found below the sold quantity");
    describe_counter!(
        "task_payloads_dropped_total",
        "Queued payloads that could not be decoded"
    );

    // Retry
    describe_counter!("retry_attempts_total", "Retries scheduled by a retry policy");
    describe_counter!("retry_exhausted_total", "Operations that exhausted their retry policy");

    // Sync
    describe_counter!("stock_sync_items_total", "Items copied from the ledger to the fast store");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn server_starts_without_handle() {
        let server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[tokio::test]
    async fn start_renders_recorded_metrics() {
        let mut server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        server.start().unwrap();

        metrics::counter!("reservation_attempts_total").increment(1);

        // Another test may have installed the recorder first.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("reservation_attempts_total"));
        }
    }
}
