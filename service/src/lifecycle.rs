//! Process lifecycle and graceful shutdown.
//!
//! When a shutdown signal is received (Ctrl+C or SIGTERM):
//! 1. Shutdown is broadcast to every consumer
//! 2. Each consumer finishes the task it is handling and exits
//! 3. The process waits for the consumers, bounded by a timeout

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// A handler that cannot be installed is logged and never fires; the other
/// one still does.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

/// Broadcast shutdown and wait for every consumer.
///
/// Gives each consumer `timeout` to finish its current task. Returns the
/// number of consumers that did not stop cleanly.
pub async fn await_shutdown(
    shutdown_tx: &broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
    timeout: Duration,
) -> usize {
    // No receivers left is fine: every consumer already exited.
    let _ = shutdown_tx.send(());

    let mut unclean = 0;
    for (idx, handle) in handles.into_iter().enumerate() {
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => info!(consumer = idx, "Consumer stopped gracefully"),
            Ok(Err(e)) => {
                unclean += 1;
                warn!(consumer = idx, error = %e, "Consumer task failed");
            }
            Err(_) => {
                unclean += 1;
                warn!(consumer = idx, "Consumer shutdown timed out");
            }
        }
    }
    unclean
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn consumers_that_listen_stop_cleanly() {
        let (shutdown_tx, _) = broadcast::channel(1);
        let handles = (0..3)
            .map(|_| {
                let mut rx = shutdown_tx.subscribe();
                tokio::spawn(async move {
                    let _ = rx.recv().await;
                })
            })
            .collect();

        let unclean = await_shutdown(&shutdown_tx, handles, Duration::from_secs(1)).await;
        assert_eq!(unclean, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_consumer_times_out() {
        let (shutdown_tx, _) = broadcast::channel(1);
        let stuck = tokio::spawn(std::future::pending::<()>());

        let unclean = await_shutdown(&shutdown_tx, vec![stuck], Duration::from_secs(10)).await;
        assert_eq!(unclean, 1);
    }
}
