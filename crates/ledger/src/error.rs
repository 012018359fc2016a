use common::{OrderId, ProductId};
use thiserror::Error;

use crate::audit::AuditStatus;

/// Errors that can occur when interacting with the stock ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A referenced product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// A product does not have enough sellable stock for the requested hold.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: i32,
        available: i32,
    },

    /// A hold quantity was zero or negative.
    #[error("Invalid quantity {quantity} for product {product_id} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: i32 },

    /// A product definition was rejected.
    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    /// A hold request contained no items.
    #[error("Hold request contains no items")]
    EmptyHold,

    /// The order already has hold audits recorded against it.
    #[error("Stock is already held for order {0}")]
    HoldExists(OrderId),

    /// A hold audit was asked to move to a status its current one cannot
    /// reach.
    #[error("Hold audit cannot move from {from} to {to}")]
    InvalidTransition { from: AuditStatus, to: AuditStatus },

    /// A stored row violates a ledger invariant.
    #[error("Corrupt ledger row: {0}")]
    CorruptRow(String),

    /// The remote ledger answered with an error the client cannot classify,
    /// or could not be reached at all.
    #[error("Remote ledger error: {0}")]
    Remote(String),

    /// An HTTP transport error talking to a remote ledger.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    /// Returns true for rejections that are a definitive answer about the
    /// request itself, as opposed to failures to reach or run the ledger.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::ProductNotFound(_)
                | LedgerError::InsufficientStock { .. }
                | LedgerError::InvalidQuantity { .. }
                | LedgerError::InvalidProduct(_)
                | LedgerError::EmptyHold
                | LedgerError::HoldExists(_)
        )
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
