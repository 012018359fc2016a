//! Saga error types.

use common::{OrderId, ProductId, ShopId};
use ledger::LedgerError;
use orders::{OrderStatus, OrderStoreError};
use thiserror::Error;

/// Errors that can occur when delivering or scheduling expiry notifications.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scheduler was shut down and accepts no more notifications.
    #[error("Expiry scheduler is closed")]
    Closed,

    /// The notification could not be published.
    #[error("Failed to publish expiry notification: {0}")]
    Publish(String),
}

/// Errors that can occur during saga operations.
///
/// Every variant belongs to exactly one class callers can tell apart:
/// validation, not found, conflict, remote failure or internal.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The request is malformed or disagrees with authoritative product data.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// One or more requested products do not exist.
    #[error("Products not found: {product_ids:?}")]
    ProductsNotFound { product_ids: Vec<ProductId> },

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A product belongs to a different shop than the order.
    #[error("Product {product_id} belongs to shop {actual}, not shop {expected}")]
    ShopMismatch {
        product_id: ProductId,
        expected: ShopId,
        actual: ShopId,
    },

    /// A product does not have enough sellable stock.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: i32,
        available: i32,
    },

    /// The order is not in a status that allows the operation.
    #[error("Order {order_id} is {status}")]
    InvalidState {
        order_id: OrderId,
        status: OrderStatus,
    },

    /// The order outlived its hold and can no longer be confirmed.
    #[error("Order {0} has expired")]
    OrderExpired(OrderId),

    /// The stock ledger could not be reached, failed, or timed out.
    #[error("Stock ledger call failed: {0}")]
    RemoteFailure(String),

    /// A local storage or invariant failure.
    #[error("Internal error: {0}")]
    Internal(String),

    /// An expiry notification could not be scheduled.
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

impl SagaError {
    /// Returns a short label for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            SagaError::Validation(_) => "validation",
            SagaError::ProductsNotFound { .. } | SagaError::OrderNotFound(_) => "not_found",
            SagaError::ShopMismatch { .. } => "shop_mismatch",
            SagaError::InsufficientStock { .. } => "insufficient_stock",
            SagaError::InvalidState { .. } | SagaError::OrderExpired(_) => "conflict",
            SagaError::RemoteFailure(_) => "remote_failure",
            SagaError::Internal(_) | SagaError::Scheduler(_) => "internal",
        }
    }

    /// Returns true if the outcome of the remote call is unknown, so a hold
    /// may have been applied even though the call failed.
    pub fn is_remote_failure(&self) -> bool {
        matches!(self, SagaError::RemoteFailure(_))
    }
}

impl From<LedgerError> for SagaError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::ProductNotFound(product_id) => SagaError::ProductsNotFound {
                product_ids: vec![product_id],
            },
            LedgerError::InsufficientStock {
                product_id,
                requested,
                available,
            } => SagaError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            LedgerError::InvalidQuantity { .. }
            | LedgerError::InvalidProduct(_)
            | LedgerError::EmptyHold => SagaError::Validation(err.to_string()),
            LedgerError::HoldExists(_)
            | LedgerError::InvalidTransition { .. }
            | LedgerError::CorruptRow(_) => SagaError::Internal(err.to_string()),
            LedgerError::Remote(_)
            | LedgerError::Http(_)
            | LedgerError::Database(_)
            | LedgerError::Migration(_)
            | LedgerError::Serialization(_) => SagaError::RemoteFailure(err.to_string()),
        }
    }
}

impl From<OrderStoreError> for SagaError {
    fn from(err: OrderStoreError) -> Self {
        match err {
            OrderStoreError::NotFound(order_id) => SagaError::OrderNotFound(order_id),
            OrderStoreError::InvalidOrder(msg) => SagaError::Validation(msg),
            OrderStoreError::InvalidTransition { order_id, from, .. } => SagaError::InvalidState {
                order_id,
                status: from,
            },
            other => SagaError::Internal(other.to_string()),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_rejections_keep_their_class() {
        let err: SagaError = LedgerError::InsufficientStock {
            product_id: ProductId::new(1),
            requested: 2,
            available: 1,
        }
        .into();
        assert_eq!(err.reason(), "insufficient_stock");

        let err: SagaError = LedgerError::ProductNotFound(ProductId::new(9)).into();
        assert!(matches!(err, SagaError::ProductsNotFound { ref product_ids } if product_ids.len() == 1));
        assert_eq!(err.reason(), "not_found");
    }

    #[test]
    fn test_unreachable_ledger_is_remote_failure() {
        let err: SagaError = LedgerError::Remote("connection refused".into()).into();
        assert!(err.is_remote_failure());
        assert_eq!(err.reason(), "remote_failure");
    }

    #[test]
    fn test_store_errors_map_to_classes() {
        let err: SagaError = OrderStoreError::NotFound(OrderId::new(4)).into();
        assert!(matches!(err, SagaError::OrderNotFound(_)));

        let err: SagaError = OrderStoreError::CorruptRow("bad status".into()).into();
        assert_eq!(err.reason(), "internal");

        let err: SagaError = OrderStoreError::InvalidTransition {
            order_id: OrderId::new(4),
            from: OrderStatus::Expired,
            to: OrderStatus::Confirmed,
        }
        .into();
        assert!(matches!(
            err,
            SagaError::InvalidState {
                status: OrderStatus::Expired,
                ..
            }
        ));
        assert_eq!(err.reason(), "conflict");
    }
}
