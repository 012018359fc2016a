//! Order status machine.

use std::str::FromStr;

use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::OrderStoreError;

/// The status of an order in its lifecycle.
///
/// Status transitions:
/// ```text
/// Pending ──┬──► Confirmed ──► Shipped ──► Delivered
///           │        │
///           │        └──────────────────► Cancelled
///           ├──► Cancelled
///           └──► Expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Stock is held and the order awaits confirmation.
    #[default]
    Pending,

    /// The order was confirmed and its held stock sold.
    Confirmed,

    /// The order has left the shop.
    Shipped,

    /// The order reached the buyer (terminal state).
    Delivered,

    /// The order was cancelled (terminal state).
    Cancelled,

    /// The order was never confirmed in time and its hold was released
    /// (terminal state).
    Expired,
}

impl OrderStatus {
    /// Returns true if the order can be confirmed in this status.
    pub fn can_confirm(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if the order can expire in this status.
    pub fn can_expire(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if the order can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }

    /// Returns true if moving from this status to `next` is allowed.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match next {
            OrderStatus::Pending => false,
            OrderStatus::Confirmed => self.can_confirm(),
            OrderStatus::Shipped => matches!(self, OrderStatus::Confirmed),
            OrderStatus::Delivered => matches!(self, OrderStatus::Shipped),
            OrderStatus::Cancelled => self.can_cancel(),
            OrderStatus::Expired => self.can_expire(),
        }
    }

    /// Checks that order `order_id` may move from this status to `next`.
    pub fn ensure_transition(
        &self,
        order_id: OrderId,
        next: OrderStatus,
    ) -> Result<(), OrderStoreError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(OrderStoreError::InvalidTransition {
                order_id,
                from: *self,
                to: next,
            })
        }
    }

    /// Returns the status name as stored in the `orders.status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Expired => "expired",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = OrderStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "expired" => Ok(OrderStatus::Expired),
            other => Err(OrderStoreError::CorruptRow(format!(
                "unknown order status '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
