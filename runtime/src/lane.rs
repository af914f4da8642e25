//! In-process task lane backed by a bounded tokio channel.
//!
//! Suitable for single-process deployments and tests. Tasks live only in
//! memory, so a crash loses whatever is queued; use the Redis queue when the
//! lane must survive restarts.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use stockguard_core::{Delivery, QueueError, ReconciliationTask, TaskQueue, TaskSource};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};

/// Bounded in-memory lane implementing both [`TaskQueue`] and [`TaskSource`].
///
/// `enqueue` fails with [`QueueError::Full`] at capacity instead of waiting.
///
/// Clones share the same channel.
#[derive(Clone)]
pub struct ChannelTaskLane {
    sender: mpsc::Sender<ReconciliationTask>,
    receiver: Arc<Mutex<mpsc::Receiver<ReconciliationTask>>>,
    poll_interval: Duration,
}

impl ChannelTaskLane {
    /// Create a lane holding at most `capacity` pending tasks.
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            poll_interval: Duration::from_secs(1),
        }
    }

    /// How long `receive` waits before returning `Ok(None)` (default: 1s).
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Refuse new tasks. Tasks already queued can still be received; after
    /// that `receive` reports [`QueueError::Closed`].
    pub async fn close(&self) {
        self.receiver.lock().await.close();
    }

    /// Tasks waiting to be received.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}

impl TaskQueue for ChannelTaskLane {
    fn enqueue<'a>(
        &'a self,
        task: &'a ReconciliationTask,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + 'a>> {
        Box::pin(async move {
            // Never wait for room: callers enqueue while holding an item lock.
            self.sender.try_send(task.clone()).map_err(|e| match e {
                TrySendError::Full(_) => QueueError::Full,
                TrySendError::Closed(_) => QueueError::Closed,
            })?;
            tracing::debug!(task_id = %task.task_id, item_id = %task.item_id, "Task enqueued in memory");
            Ok(())
        })
    }
}

impl TaskSource for ChannelTaskLane {
    fn receive(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Delivery>, QueueError>> + Send + '_>> {
        Box::pin(async move {
            let mut receiver = self.receiver.lock().await;
            match tokio::time::timeout(self.poll_interval, receiver.recv()).await {
                Ok(Some(task)) => Ok(Some(Delivery {
                    receipt: task.task_id.to_string(),
                    task,
                })),
                Ok(None) => Err(QueueError::Closed),
                Err(_) => Ok(None),
            }
        })
    }

    fn ack<'a>(
        &'a self,
        _delivery: &'a Delivery,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use stockguard_core::ItemId;

    #[tokio::test]
    async fn delivers_in_fifo_order() {
        let lane = ChannelTaskLane::bounded(8);
        let first = ReconciliationTask::new(ItemId::new(1), 1);
        let second = ReconciliationTask::new(ItemId::new(2), 2);
        lane.enqueue(&first).await.unwrap();
        lane.enqueue(&second).await.unwrap();
        assert_eq!(lane.pending(), 2);

        let got = lane.receive().await.unwrap().expect("first task");
        assert_eq!(got.task, first);
        let got = lane.receive().await.unwrap().expect("second task");
        assert_eq!(got.task, second);
        assert_eq!(lane.pending(), 0);
    }

    #[tokio::test]
    async fn idle_receive_times_out_with_none() {
        let lane = ChannelTaskLane::bounded(1).with_poll_interval(Duration::from_millis(10));
        assert_eq!(lane.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn closed_lane_rejects_enqueue_and_drains() {
        let lane = ChannelTaskLane::bounded(4);
        let task = ReconciliationTask::new(ItemId::new(1), 1);
        lane.enqueue(&task).await.unwrap();
        lane.close().await;

        assert_eq!(lane.enqueue(&task).await, Err(QueueError::Closed));
        assert!(lane.receive().await.unwrap().is_some());
        assert_eq!(lane.receive().await, Err(QueueError::Closed));
    }

    #[tokio::test]
    async fn full_lane_rejects_without_waiting() {
        let lane = ChannelTaskLane::bounded(1);
        lane.enqueue(&ReconciliationTask::new(ItemId::new(1), 1)).await.unwrap();

        let overflow = ReconciliationTask::new(ItemId::new(1), 2);
        assert_eq!(lane.enqueue(&overflow).await, Err(QueueError::Full));
        assert_eq!(lane.pending(), 1);

        lane.receive().await.unwrap().expect("queued task");
        lane.enqueue(&overflow).await.unwrap();
    }
}
