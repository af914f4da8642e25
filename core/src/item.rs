//! Items, durable stock records and purchase requests.

use crate::error::RequestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a sellable item.
///
/// Shared by the fast store keys, the lock keys and the ledger rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(i64);

impl ItemId {
    /// Wrap a raw identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Fast store key holding the cached stock count.
    #[must_use]
    pub fn stock_key(self) -> String {
        format!("item:{}:stock", self.0)
    }

    /// Fast store key holding the reservation lock.
    #[must_use]
    pub fn lock_key(self) -> String {
        format!("item:{}:lock", self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ItemId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Durable stock record owned by the ledger.
///
/// `stock` is unsigned, so a record can never report negative stock; the
/// ledger clamps decrements at zero before writing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    /// Item identifier
    pub id: ItemId,
    /// Display name
    pub name: String,
    /// Units left according to the ledger
    pub stock: u32,
    /// Soft-delete marker; deleted records are never purchasable
    pub deleted: bool,
    /// Last time the row changed
    pub updated_at: DateTime<Utc>,
}

impl StockRecord {
    /// Whether the record may back a purchase.
    #[must_use]
    pub const fn is_purchasable(&self) -> bool {
        !self.deleted
    }

    /// Stock left after removing `quantity`, clamped at zero.
    #[must_use]
    pub const fn stock_after(&self, quantity: u32) -> u32 {
        self.stock.saturating_sub(quantity)
    }
}

/// Who is asking. Only used for log context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Requester {
    /// Authenticated user id
    User(i64),
    /// Anonymous caller
    Guest,
}

impl fmt::Display for Requester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "{id}"),
            Self::Guest => f.write_str("guest"),
        }
    }
}

/// A validated purchase attempt. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseRequest {
    item_id: ItemId,
    quantity: u32,
    requester: Requester,
}

impl PurchaseRequest {
    /// Build a request, rejecting non-positive ids and quantities outside
    /// `1..=max_quantity`.
    ///
    /// # Errors
    ///
    /// - [`RequestError::InvalidItemId`] if `item_id` is not positive
    /// - [`RequestError::QuantityOutOfRange`] if `quantity` is zero or above `max_quantity`
    pub fn new(
        item_id: ItemId,
        quantity: u32,
        requester: Requester,
        max_quantity: u32,
    ) -> Result<Self, RequestError> {
        if item_id.get() <= 0 {
            return Err(RequestError::InvalidItemId(item_id.get()));
        }
        if quantity == 0 || quantity > max_quantity {
            return Err(RequestError::QuantityOutOfRange {
                min: 1,
                max: max_quantity,
                actual: quantity,
            });
        }
        Ok(Self {
            item_id,
            quantity,
            requester,
        })
    }

    /// Item being bought.
    #[must_use]
    pub const fn item_id(&self) -> ItemId {
        self.item_id
    }

    /// Units requested.
    #[must_use]
    pub const fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Caller identity for logs.
    #[must_use]
    pub const fn requester(&self) -> &Requester {
        &self.requester
    }
}
