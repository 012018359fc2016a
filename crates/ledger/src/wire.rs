//! JSON bodies exchanged between the order service and the product service.

use common::{OrderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::{HoldItem, HoldStockAudit, LedgerError, Product};

pub const CODE_PRODUCT_NOT_FOUND: &str = "product_not_found";
pub const CODE_INSUFFICIENT_STOCK: &str = "insufficient_stock";
pub const CODE_INVALID_QUANTITY: &str = "invalid_quantity";
pub const CODE_INVALID_PRODUCT: &str = "invalid_product";
pub const CODE_EMPTY_HOLD: &str = "empty_hold";
pub const CODE_HOLD_EXISTS: &str = "hold_exists";
pub const CODE_INTERNAL: &str = "internal";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldStockRequest {
    pub order_id: OrderId,
    pub items: Vec<HoldItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldStockResponse {
    pub order_id: OrderId,
    pub audits: Vec<HoldStockAudit>,
}

/// Body of the release and commit calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SettleStockRequest {
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductListResponse {
    pub products: Vec<Product>,
}

/// Error body returned by the product service.
///
/// `code` is machine readable so the client can rebuild the precise
/// [`LedgerError`] instead of a generic remote failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<i32>,
}

impl ErrorBody {
    fn new(error: &LedgerError, code: &str) -> Self {
        Self {
            error: error.to_string(),
            code: code.to_string(),
            order_id: None,
            product_id: None,
            requested: None,
            available: None,
        }
    }

    /// Describes a ledger error for the wire.
    pub fn from_error(error: &LedgerError) -> Self {
        match error {
            LedgerError::ProductNotFound(product_id) => Self {
                product_id: Some(*product_id),
                ..Self::new(error, CODE_PRODUCT_NOT_FOUND)
            },
            LedgerError::InsufficientStock {
                product_id,
                requested,
                available,
            } => Self {
                product_id: Some(*product_id),
                requested: Some(*requested),
                available: Some(*available),
                ..Self::new(error, CODE_INSUFFICIENT_STOCK)
            },
            LedgerError::InvalidQuantity {
                product_id,
                quantity,
            } => Self {
                product_id: Some(*product_id),
                requested: Some(*quantity),
                ..Self::new(error, CODE_INVALID_QUANTITY)
            },
            LedgerError::InvalidProduct(_) => Self::new(error, CODE_INVALID_PRODUCT),
            LedgerError::EmptyHold => Self::new(error, CODE_EMPTY_HOLD),
            LedgerError::HoldExists(order_id) => Self {
                order_id: Some(*order_id),
                ..Self::new(error, CODE_HOLD_EXISTS)
            },
            _ => Self::new(error, CODE_INTERNAL),
        }
    }

    /// Rebuilds the ledger error this body describes.
    pub fn into_error(self) -> LedgerError {
        match (self.code.as_str(), self.product_id, self.order_id) {
            (CODE_PRODUCT_NOT_FOUND, Some(product_id), _) => {
                LedgerError::ProductNotFound(product_id)
            }
            (CODE_INSUFFICIENT_STOCK, Some(product_id), _) => LedgerError::InsufficientStock {
                product_id,
                requested: self.requested.unwrap_or_default(),
                available: self.available.unwrap_or_default(),
            },
            (CODE_INVALID_QUANTITY, Some(product_id), _) => LedgerError::InvalidQuantity {
                product_id,
                quantity: self.requested.unwrap_or_default(),
            },
            (CODE_INVALID_PRODUCT, _, _) => LedgerError::InvalidProduct(self.error),
            (CODE_EMPTY_HOLD, _, _) => LedgerError::EmptyHold,
            (CODE_HOLD_EXISTS, _, Some(order_id)) => LedgerError::HoldExists(order_id),
            _ => LedgerError::Remote(self.error),
        }
    }
}
