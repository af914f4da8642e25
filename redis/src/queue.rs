//! Reliable task queue on Redis lists.
//!
//! # Lists
//!
//! - `queue:stock_updates` → pending task payloads (JSON)
//! - `queue:stock_updates:processing` → payloads taken by a consumer but not
//!   yet acknowledged
//!
//! Producers `LPUSH` onto the pending list. Consumers `BLMOVE` the oldest
//! payload into the processing list and `LREM` it once handled, so a consumer
//! that dies mid-task leaves the payload behind for
//! [`RedisTaskQueue::recover_in_flight`] to requeue.

use crate::fast_store::store_error;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{AsyncCommands, Client, Direction};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use stockguard_core::{
    Delivery, QueueError, ReconciliationTask, STOCK_UPDATES_LANE, StoreError, TaskQueue,
    TaskSource,
};
use tokio::sync::Mutex;

fn transport(error: &redis::RedisError) -> QueueError {
    QueueError::Transport(store_error(error).to_string())
}

/// [`TaskQueue`] and [`TaskSource`] over two Redis lists.
pub struct RedisTaskQueue {
    conn_manager: ConnectionManager,
    // Blocking pops get their own connection so they never stall producers.
    blocking: Mutex<MultiplexedConnection>,
    pending_key: String,
    processing_key: String,
    block_timeout: Duration,
}

impl RedisTaskQueue {
    /// Connect to Redis using the `stock_updates` lane.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the server cannot be reached.
    pub async fn new(redis_url: &str) -> Result<Self, StoreError> {
        Self::for_lane(redis_url, STOCK_UPDATES_LANE).await
    }

    /// Connect to Redis using a named lane.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the server cannot be reached.
    pub async fn for_lane(redis_url: &str, lane: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url).map_err(|e| {
            StoreError::Connection(format!("Failed to create Redis client: {e}"))
        })?;
        let conn_manager = ConnectionManager::new(client.clone()).await.map_err(|e| {
            StoreError::Connection(format!("Failed to create Redis connection manager: {e}"))
        })?;
        let blocking = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| store_error(&e))?;

        Ok(Self {
            conn_manager,
            blocking: Mutex::new(blocking),
            pending_key: format!("queue:{lane}"),
            processing_key: format!("queue:{lane}:processing"),
            block_timeout: Duration::from_secs(1),
        })
    }

    /// How long `receive` blocks before returning `Ok(None)` (default: 1s).
    #[must_use]
    pub const fn with_block_timeout(mut self, timeout: Duration) -> Self {
        self.block_timeout = timeout;
        self
    }

    /// Move every unacknowledged payload back to the pending list.
    ///
    /// Call once at startup, before any consumer runs; otherwise tasks in
    /// flight on a live consumer would be delivered twice.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Transport`] if a move fails. Payloads already
    /// moved stay moved.
    pub async fn recover_in_flight(&self) -> Result<usize, QueueError> {
        let mut conn = self.conn_manager.clone();
        let mut recovered = 0;
        loop {
            let moved: Option<String> = conn
                .lmove(
                    &self.processing_key,
                    &self.pending_key,
                    Direction::Left,
                    Direction::Right,
                )
                .await
                .map_err(|e| transport(&e))?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }
        if recovered > 0 {
            tracing::warn!(recovered, queue = %self.pending_key, "Requeued unacknowledged tasks");
        }
        Ok(recovered)
    }

    /// Payloads waiting to be received.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Transport`] if the query fails.
    pub async fn pending(&self) -> Result<usize, QueueError> {
        let mut conn = self.conn_manager.clone();
        conn.llen(&self.pending_key).await.map_err(|e| transport(&e))
    }

    /// Payloads received but not acknowledged.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Transport`] if the query fails.
    pub async fn in_flight(&self) -> Result<usize, QueueError> {
        let mut conn = self.conn_manager.clone();
        conn.llen(&self.processing_key).await.map_err(|e| transport(&e))
    }
}

impl TaskQueue for RedisTaskQueue {
    fn enqueue<'a>(
        &'a self,
        task: &'a ReconciliationTask,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + 'a>> {
        Box::pin(async move {
            let payload = task.to_payload()?;
            let mut conn = self.conn_manager.clone();
            let _: () = conn
                .lpush(&self.pending_key, payload)
                .await
                .map_err(|e| transport(&e))?;
            tracing::debug!(task_id = %task.task_id, item_id = %task.item_id, "Task enqueued");
            Ok(())
        })
    }
}

impl TaskSource for RedisTaskQueue {
    fn receive(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Delivery>, QueueError>> + Send + '_>> {
        Box::pin(async move {
            let payload: Option<String> = {
                let mut conn = self.blocking.lock().await;
                conn.blmove(
                    &self.pending_key,
                    &self.processing_key,
                    Direction::Right,
                    Direction::Left,
                    self.block_timeout.as_secs_f64(),
                )
                .await
                .map_err(|e| transport(&e))?
            };

            let Some(payload) = payload else {
                return Ok(None);
            };

            match ReconciliationTask::from_payload(&payload) {
                Ok(task) => Ok(Some(Delivery {
                    task,
                    receipt: payload,
                })),
                Err(e) => {
                    tracing::error!(
                        alert = true,
                        error = %e,
                        payload = %payload,
                        "Undecodable task payload; dropping it"
                    );
                    metrics::counter!("task_payloads_dropped_total").increment(1);
                    let mut conn = self.conn_manager.clone();
                    let _: () = conn
                        .lrem(&self.processing_key, 1, &payload)
                        .await
                        .map_err(|e| transport(&e))?;
                    Ok(None)
                }
            }
        })
    }

    fn ack<'a>(
        &'a self,
        delivery: &'a Delivery,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + 'a>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let removed: i64 = conn
                .lrem(&self.processing_key, 1, &delivery.receipt)
                .await
                .map_err(|e| transport(&e))?;
            if removed == 0 {
                tracing::warn!(task_id = %delivery.task.task_id, "Acknowledged task was not in flight");
            }
            Ok(())
        })
    }
}
