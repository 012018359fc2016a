//! Order rows as the order service stores them.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, ShopId, UserId};
use serde::{Deserialize, Serialize};

use crate::{OrderStatus, OrderStoreError, Result};

/// One line of an order. Created with the order and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i32,
    /// Unit price at the time the order was placed.
    pub item_price: Money,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    /// Returns the line total.
    pub fn subtotal(&self) -> Money {
        self.item_price.multiply(self.quantity)
    }
}

/// An order together with its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub shop_id: ShopId,
    pub total_price: Money,
    pub status: OrderStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Returns the number of units across all items.
    pub fn total_items(&self) -> i64 {
        self.items.iter().map(|item| i64::from(item.quantity)).sum()
    }

    /// Returns true if the order is past its expiry at `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Returns how long until the order expires, or `None` if it already has.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        (self.expires_at - now).to_std().ok().filter(|d| !d.is_zero())
    }
}

/// A line of an order about to be inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: i32,
    pub item_price: Money,
}

/// An order about to be inserted. New orders always start out pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_id: UserId,
    pub shop_id: ShopId,
    pub total_price: Money,
    pub expires_at: DateTime<Utc>,
    pub items: Vec<NewOrderItem>,
}

impl NewOrder {
    /// Checks the shape of the order. Prices are not checked here.
    pub fn validate(&self) -> Result<()> {
        if !self.user_id.is_valid() || !self.shop_id.is_valid() {
            return Err(OrderStoreError::InvalidOrder(
                "user and shop ids must be positive".to_string(),
            ));
        }
        if self.items.is_empty() {
            return Err(OrderStoreError::InvalidOrder(
                "an order needs at least one item".to_string(),
            ));
        }
        for item in &self.items {
            if !item.product_id.is_valid() || item.quantity <= 0 {
                return Err(OrderStoreError::InvalidOrder(format!(
                    "invalid item: product {} quantity {}",
                    item.product_id, item.quantity
                )));
            }
        }
        Ok(())
    }
}
