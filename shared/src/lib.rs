use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label recorded on every order created by the place-order workflow.
pub const ORDER_KIND_SELLING: &str = "selling";

/// Confirmation attached to a successful cancellation.
pub const STOCK_RETURNED: &str = "stock returned";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub user_name: String,
    pub user_role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub user_name: String,
    pub user_role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub status: String,
    /// Price of one unit in the smallest currency unit.
    pub unit_price: i64,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub status: String,
    pub unit_price: i64,
    pub stock: i64,
}

/// Descriptive fields an item update may touch. Stock is deliberately absent:
/// it only moves through the stock-delta operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdate {
    pub status: Option<String>,
    pub unit_price: Option<i64>,
}

impl ItemUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.unit_price.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub item_id: i64,
    pub quantity: i32,
    pub total_price: i64,
    pub order_kind: String,
    pub created_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_id: i64,
    pub item_id: i64,
    pub quantity: i32,
    pub total_price: i64,
    pub order_kind: String,
}

/// Inbound order request. There is no total field: any total a client sends
/// is dropped during deserialization and recomputed from the item price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub user_id: i64,
    pub item_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReceipt {
    pub order_id: i64,
    pub item_id: i64,
    pub restored: i64,
    pub confirmation: String,
}

impl CancelReceipt {
    pub fn new(order: &Order) -> Self {
        Self {
            order_id: order.id,
            item_id: order.item_id,
            restored: i64::from(order.quantity),
            confirmation: STOCK_RETURNED.to_string(),
        }
    }
}

/// `quantity × unit_price`, or `None` when the product does not fit in an `i64`.
pub fn total_price(quantity: i32, unit_price: i64) -> Option<i64> {
    i64::from(quantity).checked_mul(unit_price)
}
