//! Recording task queue and dead-letter sink.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use stockguard_core::{DeadLetterError, DeadLetterSink, QueueError, ReconciliationTask, TaskQueue};

/// [`TaskQueue`] that keeps every enqueued task for inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingTaskQueue {
    tasks: Arc<Mutex<Vec<ReconciliationTask>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingTaskQueue {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every enqueue with a transport error.
    pub fn fail_enqueues(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Tasks enqueued so far.
    #[must_use]
    pub fn tasks(&self) -> Vec<ReconciliationTask> {
        self.tasks.lock().unwrap().clone()
    }

    /// Number of tasks enqueued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    /// Whether nothing was enqueued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TaskQueue for RecordingTaskQueue {
    fn enqueue<'a>(
        &'a self,
        task: &'a ReconciliationTask,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + 'a>> {
        Box::pin(async move {
            if self.fail.load(Ordering::SeqCst) {
                return Err(QueueError::Transport("injected enqueue failure".to_string()));
            }
            self.tasks.lock().unwrap().push(task.clone());
            Ok(())
        })
    }
}

/// A task handed to a [`MemoryDeadLetterSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuriedTask {
    /// The dead task
    pub task: ReconciliationTask,
    /// Last failure reason
    pub reason: String,
}

/// [`DeadLetterSink`] that keeps buried tasks in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDeadLetterSink {
    buried: Arc<Mutex<Vec<BuriedTask>>>,
    fail: Arc<AtomicBool>,
}

impl MemoryDeadLetterSink {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every bury.
    pub fn fail_writes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Tasks buried so far.
    #[must_use]
    pub fn buried(&self) -> Vec<BuriedTask> {
        self.buried.lock().unwrap().clone()
    }
}

impl DeadLetterSink for MemoryDeadLetterSink {
    fn bury<'a>(
        &'a self,
        task: &'a ReconciliationTask,
        reason: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeadLetterError>> + Send + 'a>> {
        Box::pin(async move {
            if self.fail.load(Ordering::SeqCst) {
                return Err(DeadLetterError("injected dead letter failure".to_string()));
            }
            self.buried.lock().unwrap().push(BuriedTask {
                task: task.clone(),
                reason: reason.to_string(),
            });
            Ok(())
        })
    }
}
