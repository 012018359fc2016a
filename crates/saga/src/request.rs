//! Order placement request and response bodies.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, ShopId, UserId};
use serde::{Deserialize, Serialize};

use orders::OrderStatus;

use crate::error::{Result, SagaError};

/// One requested line: a product, how many units, and the unit price the
/// buyer saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: i32,
    pub price: Money,
}

/// A buyer's request to place an order with one shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: UserId,
    pub shop_id: ShopId,
    /// Declared total; must equal the sum of authoritative price × quantity.
    pub total_price: Money,
    pub items: Vec<OrderLine>,
}

impl CreateOrderRequest {
    /// Checks the request shape before any lookup.
    pub fn validate(&self) -> Result<()> {
        if !self.user_id.is_valid() {
            return Err(SagaError::Validation(format!(
                "invalid user id {}",
                self.user_id
            )));
        }
        if !self.shop_id.is_valid() {
            return Err(SagaError::Validation(format!(
                "invalid shop id {}",
                self.shop_id
            )));
        }
        if self.items.is_empty() {
            return Err(SagaError::Validation(
                "order must contain at least one item".to_string(),
            ));
        }
        if self.total_price.is_negative() {
            return Err(SagaError::Validation(
                "total price cannot be negative".to_string(),
            ));
        }
        for line in &self.items {
            if !line.product_id.is_valid() {
                return Err(SagaError::Validation(format!(
                    "invalid product id {}",
                    line.product_id
                )));
            }
            if line.quantity <= 0 {
                return Err(SagaError::Validation(format!(
                    "quantity for product {} must be greater than 0",
                    line.product_id
                )));
            }
            if line.price.is_negative() {
                return Err(SagaError::Validation(format!(
                    "price for product {} cannot be negative",
                    line.product_id
                )));
            }
        }
        Ok(())
    }

    /// Distinct product ids in ascending order.
    pub fn product_ids(&self) -> Vec<ProductId> {
        let mut ids: Vec<ProductId> = self.items.iter().map(|l| l.product_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Requested units per product, summing repeated lines.
    pub fn quantities(&self) -> BTreeMap<ProductId, i64> {
        let mut wanted = BTreeMap::new();
        for line in &self.items {
            *wanted.entry(line.product_id).or_insert(0) += i64::from(line.quantity);
        }
        wanted
    }
}

/// Summary of a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    pub order_id: OrderId,
    pub total_price: Money,
    pub total_items: i64,
    pub status: OrderStatus,
    pub expires_at: DateTime<Utc>,
}
