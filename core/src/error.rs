//! Error taxonomy for reservations and their collaborators.

use thiserror::Error;

/// Caller-visible outcome of a failed purchase attempt.
///
/// Business errors carry the detail the caller needs to render a precise
/// message. Infrastructure errors are logged with full context where they
/// happen and only cross the trust boundary as a generic message; see
/// [`PurchaseError::public_message`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PurchaseError {
    // ═══════════════════════════════════════════════════════════
    // Business Errors
    // ═══════════════════════════════════════════════════════════
    /// Cached count is lower than the requested quantity.
    #[error("Insufficient stock: {current_stock} left")]
    InsufficientStock {
        /// Count observed in the fast store
        current_stock: i64,
    },

    /// Baseline record is missing or soft-deleted.
    #[error("Item not found")]
    RecordNotFound,

    /// Request rejected before any store was touched.
    #[error(transparent)]
    InvalidRequest(#[from] RequestError),

    // ═══════════════════════════════════════════════════════════
    // Infrastructure Errors
    // ═══════════════════════════════════════════════════════════
    /// Lock retries exhausted.
    #[error("Lock unavailable")]
    LockUnavailable,

    /// Watched key changed or the transaction itself failed.
    #[error("Concurrency conflict")]
    ConcurrencyConflict,

    /// Fast store connectivity check failed.
    #[error("Fast store unavailable")]
    StoreUnavailable,

    /// Decrement committed but the reconciliation task was not scheduled.
    #[error("Reconciliation task could not be enqueued")]
    EnqueueFailed,

    /// Anything else (ledger outage during hydration, unexpected faults).
    #[error("Unknown error")]
    Unknown,
}

impl PurchaseError {
    /// Returns `true` for errors caused by the state of the catalog rather
    /// than by the infrastructure.
    ///
    /// # Examples
    ///
    /// ```
    /// # use stockguard_core::PurchaseError;
    /// assert!(PurchaseError::RecordNotFound.is_business_error());
    /// assert!(!PurchaseError::LockUnavailable.is_business_error());
    /// ```
    #[must_use]
    pub const fn is_business_error(&self) -> bool {
        matches!(
            self,
            Self::InsufficientStock { .. } | Self::RecordNotFound | Self::InvalidRequest(_)
        )
    }

    /// Returns `true` if retrying the same request later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockUnavailable | Self::ConcurrencyConflict | Self::StoreUnavailable
        )
    }

    /// Stable machine-readable code for the excluded HTTP layer.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::RecordNotFound => "ITEM_NOT_FOUND",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::LockUnavailable | Self::ConcurrencyConflict | Self::StoreUnavailable => {
                "SYSTEM_BUSY"
            }
            Self::EnqueueFailed | Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Message safe to show to the caller.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::InsufficientStock { current_stock } => {
                format!("Insufficient stock, {current_stock} left")
            }
            Self::RecordNotFound => "Item not found".to_string(),
            Self::InvalidRequest(e) => e.to_string(),
            Self::LockUnavailable | Self::ConcurrencyConflict | Self::StoreUnavailable => {
                "System busy, please retry".to_string()
            }
            Self::EnqueueFailed | Self::Unknown => "Purchase failed".to_string(),
        }
    }

    /// Current stock carried by [`PurchaseError::InsufficientStock`].
    #[must_use]
    pub const fn current_stock(&self) -> Option<i64> {
        match self {
            Self::InsufficientStock { current_stock } => Some(*current_stock),
            _ => None,
        }
    }
}

/// Rejected purchase input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Item ids are positive.
    #[error("Invalid item id: {0}")]
    InvalidItemId(i64),

    /// Quantity outside the allowed range.
    #[error("Quantity {actual} outside {min}..={max}")]
    QuantityOutOfRange {
        /// Smallest allowed quantity
        min: u32,
        /// Largest allowed quantity
        max: u32,
        /// Quantity that was requested
        actual: u32,
    },
}

/// Fast store transport or protocol failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Could not reach the store.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A command was rejected or timed out.
    #[error("Command failed: {0}")]
    Command(String),

    /// The store returned something we could not interpret.
    #[error("Unexpected reply: {0}")]
    Protocol(String),
}

/// Durable ledger failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Ledger unreachable; transient.
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// Query failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A row violated the record invariants.
    #[error("Corrupt record for item {item_id}: {reason}")]
    CorruptRecord {
        /// Offending item
        item_id: i64,
        /// What was wrong
        reason: String,
    },
}

/// Task queue failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The lane has no consumers or producers left.
    #[error("Queue closed")]
    Closed,

    /// The lane is at capacity; the task was not accepted.
    #[error("Queue full")]
    Full,

    /// Payload could not be encoded or decoded.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Network or backend error.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Failure to record a dead task.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Dead letter write failed: {0}")]
pub struct DeadLetterError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_exposes_count() {
        let err = PurchaseError::InsufficientStock { current_stock: 4 };
        assert_eq!(err.current_stock(), Some(4));
        assert_eq!(err.error_code(), "INSUFFICIENT_STOCK");
        assert_eq!(err.public_message(), "Insufficient stock, 4 left");
        assert!(err.is_business_error());
        assert!(!err.is_retryable());
    }

    #[test]
    fn infrastructure_errors_share_generic_message() {
        for err in [
            PurchaseError::LockUnavailable,
            PurchaseError::ConcurrencyConflict,
            PurchaseError::StoreUnavailable,
        ] {
            assert_eq!(err.error_code(), "SYSTEM_BUSY");
            assert_eq!(err.public_message(), "System busy, please retry");
            assert!(err.is_retryable());
            assert!(!err.is_business_error());
        }
    }

    #[test]
    fn enqueue_failure_is_not_retryable() {
        let err = PurchaseError::EnqueueFailed;
        assert!(!err.is_retryable());
        assert_eq!(err.error_code(), "UNKNOWN_ERROR");
        assert_eq!(err.current_stock(), None);
    }

    #[test]
    fn invalid_request_is_a_business_error() {
        let err = PurchaseError::from(RequestError::QuantityOutOfRange {
            min: 1,
            max: 5,
            actual: 50,
        });
        assert!(err.is_business_error());
        assert!(!err.is_retryable());
        assert_eq!(err.error_code(), "INVALID_REQUEST");
        assert_eq!(err.public_message(), "Quantity 50 outside 1..=5");
    }

    #[test]
    fn store_error_display() {
        let err = StoreError::Connection("refused".to_string());
        assert_eq!(err.to_string(), "Connection failed: refused");
    }
}
