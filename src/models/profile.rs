//! Profile aggregate cached by the profile cache
//!
//! A profile carries a label and a small ordered list of nested orders.
//! Both types round-trip through serde_json for the remote tier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An order nested inside a [`Profile`]. Ids are unique within one profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Opaque order body
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates an order stamped with `now` for both timestamps.
    pub fn new(id: impl Into<String>, value: Value, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            value,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The cached aggregate: identity, a scalar label, and nested orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub orders: Vec<Order>,
}

impl Profile {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            orders: Vec::new(),
        }
    }

    pub fn with_orders(mut self, orders: Vec<Order>) -> Self {
        self.orders = orders;
        self
    }

    /// Looks up a nested order by id.
    pub fn order(&self, order_id: &str) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == order_id)
    }

    /// Appends an order. An order with the same id is replaced in place so ids
    /// stay unique.
    pub(crate) fn push_order(&mut self, order: Order) {
        match self.orders.iter_mut().find(|o| o.id == order.id) {
            Some(existing) => *existing = order,
            None => self.orders.push(order),
        }
    }

    /// Replaces the value of an existing order. Returns false if no order has `order_id`.
    pub(crate) fn replace_order_value(
        &mut self,
        order_id: &str,
        value: Value,
        now: DateTime<Utc>,
    ) -> bool {
        match self.orders.iter_mut().find(|o| o.id == order_id) {
            Some(order) => {
                order.value = value;
                order.updated_at = now;
                true
            }
            None => false,
        }
    }

    /// Removes the first order with `order_id`, keeping the others in order.
    pub(crate) fn drop_order(&mut self, order_id: &str) -> bool {
        match self.orders.iter().position(|o| o.id == order_id) {
            Some(idx) => {
                self.orders.remove(idx);
                true
            }
            None => false,
        }
    }
}
