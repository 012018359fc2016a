//! Product rows owned by the ledger.

use std::str::FromStr;

use common::{Money, ProductId, ShopId};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Lifecycle status of a product listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[default]
    Active,
    Inactive,
    Discontinued,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Inactive => "inactive",
            ProductStatus::Discontinued => "discontinued",
        }
    }
}

impl FromStr for ProductStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProductStatus::Active),
            "inactive" => Ok(ProductStatus::Inactive),
            "discontinued" => Ok(ProductStatus::Discontinued),
            other => Err(LedgerError::CorruptRow(format!(
                "unknown product status '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A product with its inventory counters.
///
/// `stock` is what can still be sold; `on_hold_stock` is reserved by pending
/// orders. Holds and releases move units between the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub shop_id: ShopId,
    pub name: String,
    pub price: Money,
    pub stock: i32,
    pub on_hold_stock: i32,
    pub status: ProductStatus,
}

impl Product {
    /// Units currently tracked by the ledger, sellable or reserved.
    pub fn total_units(&self) -> i32 {
        self.stock + self.on_hold_stock
    }
}

/// Data needed to register a new product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub shop_id: ShopId,
    pub name: String,
    pub price: Money,
    pub stock: i32,
}

impl NewProduct {
    pub fn new(shop_id: ShopId, name: impl Into<String>, price: Money, stock: i32) -> Self {
        Self {
            shop_id,
            name: name.into(),
            price,
            stock,
        }
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if !self.shop_id.is_valid() {
            return Err(LedgerError::InvalidProduct(format!(
                "invalid shop id {}",
                self.shop_id
            )));
        }
        if self.name.trim().is_empty() {
            return Err(LedgerError::InvalidProduct("name is required".to_string()));
        }
        if self.price.is_negative() {
            return Err(LedgerError::InvalidProduct(format!(
                "price {} cannot be negative",
                self.price
            )));
        }
        if self.stock < 0 {
            return Err(LedgerError::InvalidProduct(format!(
                "stock {} cannot be negative",
                self.stock
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_its_own_representation() {
        for status in [
            ProductStatus::Active,
            ProductStatus::Inactive,
            ProductStatus::Discontinued,
        ] {
            assert_eq!(status.as_str().parse::<ProductStatus>().unwrap(), status);
        }
        assert!("archived".parse::<ProductStatus>().is_err());
    }
}
