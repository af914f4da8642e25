//! Task queue and dead-letter abstractions.
//!
//! ```text
//! Orchestrator ──enqueue──▶ [ stock_updates lane ] ──receive──▶ Worker pool
//!                                                     ◀──ack───
//!                                                       │
//!                                          retries exhausted
//!                                                       ▼
//!                                               DeadLetterSink
//! ```
//!
//! Delivery is at-least-once: a task may be received again if a consumer
//! dies between `receive` and `ack`. The ledger deduplicates by task id.
//!
//! # Dyn Compatibility
//!
//! These traits return boxed futures so the orchestrator and the worker pool
//! can hold them as `Arc<dyn TaskQueue>` / `Arc<dyn TaskSource>` /
//! `Arc<dyn DeadLetterSink>` and swap backends at wiring time.

use crate::error::{DeadLetterError, QueueError};
use crate::task::ReconciliationTask;
use std::future::Future;
use std::pin::Pin;

/// A received task plus whatever the backend needs to acknowledge it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Decoded task
    pub task: ReconciliationTask,
    /// Backend receipt (the raw payload for list-based queues)
    pub receipt: String,
}

/// Producer side of the lane.
pub trait TaskQueue: Send + Sync {
    /// Schedule a task.
    ///
    /// # Errors
    ///
    /// Returns error if the task could not be handed to the backend. The
    /// caller must treat this as fatal: the stock has already moved.
    fn enqueue<'a>(
        &'a self,
        task: &'a ReconciliationTask,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + 'a>>;
}

/// Consumer side of the lane.
pub trait TaskSource: Send + Sync {
    /// Wait for the next task. `Ok(None)` means the wait timed out with
    /// nothing to do, so the caller can check for shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] once the lane can never yield again.
    fn receive(&self) -> Pin<Box<dyn Future<Output = Result<Option<Delivery>, QueueError>> + Send + '_>>;

    /// Confirm a delivery was handled so it is not redelivered.
    ///
    /// # Errors
    ///
    /// Returns error if the backend could not record the acknowledgement.
    fn ack<'a>(
        &'a self,
        delivery: &'a Delivery,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + 'a>>;
}

/// Operator-facing sink for tasks that exhausted their retries.
pub trait DeadLetterSink: Send + Sync {
    /// Record a dead task with the last failure reason.
    ///
    /// # Errors
    ///
    /// Returns error if the record could not be written.
    fn bury<'a>(
        &'a self,
        task: &'a ReconciliationTask,
        reason: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeadLetterError>> + Send + 'a>>;
}
