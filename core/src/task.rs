//! Reconciliation tasks.

use crate::error::QueueError;
use crate::item::ItemId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Name of the lane that carries stock updates, isolated from other work.
pub const STOCK_UPDATES_LANE: &str = "stock_updates";

/// Unique id of a reconciliation task, used to apply it at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A confirmed fast-store decrement waiting to reach the ledger.
///
/// Created once per successful commit. `attempt` counts how many times a
/// worker has tried it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationTask {
    /// Idempotency key
    pub task_id: TaskId,
    /// Item whose stock moved
    pub item_id: ItemId,
    /// Units sold
    pub quantity: u32,
    /// Attempts made so far
    pub attempt: u32,
}

impl ReconciliationTask {
    /// New task with a fresh id and no attempts.
    #[must_use]
    pub fn new(item_id: ItemId, quantity: u32) -> Self {
        Self {
            task_id: TaskId::new(),
            item_id,
            quantity,
            attempt: 0,
        }
    }

    /// Encode as a queue payload.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Serialization`] if encoding fails.
    pub fn to_payload(&self) -> Result<String, QueueError> {
        serde_json::to_string(self).map_err(|e| QueueError::Serialization(e.to_string()))
    }

    /// Decode a queue payload.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Serialization`] if the payload is not a task.
    pub fn from_payload(payload: &str) -> Result<Self, QueueError> {
        serde_json::from_str(payload).map_err(|e| QueueError::Serialization(e.to_string()))
    }
}
