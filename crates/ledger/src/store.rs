use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::{HoldStockAudit, LedgerError, NewProduct, Product, Result};

/// A quantity of one product to reserve for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldItem {
    pub product_id: ProductId,
    pub quantity: i32,
}

impl HoldItem {
    pub fn new(product_id: ProductId, quantity: i32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Outcome of closing the held audits of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Settlement {
    /// Number of audit rows moved out of `held`.
    pub audits_closed: usize,
    /// Units moved out of `on_hold_stock`.
    pub units: i64,
}

impl Settlement {
    /// Returns true if nothing was held, i.e. the call was a no-op.
    pub fn is_noop(&self) -> bool {
        self.audits_closed == 0
    }
}

/// Inventory operations the order saga depends on.
///
/// Implementations must take the row lock of every product they mutate, in
/// ascending [`ProductId`] order, and hold it for the whole read-modify-write.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Reads products by id without locking. Missing ids are simply absent
    /// from the result; the data may be stale by the time a hold runs.
    async fn fetch_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Reserves every item for `order_id`, all or nothing.
    ///
    /// Re-checks `quantity <= stock` under lock. On success each product has
    /// moved `quantity` units from `stock` to `on_hold_stock` and one `held`
    /// audit row exists per product.
    async fn hold_bulk(&self, order_id: OrderId, items: &[HoldItem])
    -> Result<Vec<HoldStockAudit>>;

    /// Returns every `held` unit of `order_id` to sellable stock and marks the
    /// audits `cancelled`. A no-op when nothing is held.
    async fn release_bulk(&self, order_id: OrderId) -> Result<Settlement>;

    /// Converts every `held` unit of `order_id` into sold units and marks the
    /// audits `success`. A no-op when nothing is held.
    async fn commit_bulk(&self, order_id: OrderId) -> Result<Settlement>;

    /// Returns all audit rows recorded for an order, ordered by product id.
    async fn audits_for_order(&self, order_id: OrderId) -> Result<Vec<HoldStockAudit>>;

    /// Returns the audit rows of an order that still hold stock.
    async fn held_audits_for_order(&self, order_id: OrderId) -> Result<Vec<HoldStockAudit>> {
        let audits = self.audits_for_order(order_id).await?;
        Ok(audits.into_iter().filter(HoldStockAudit::is_held).collect())
    }
}

/// Product registration, available on ledgers the product service owns.
#[async_trait]
pub trait ProductCatalog: StockLedger {
    /// Registers a product with `stock` sellable units and nothing on hold.
    async fn create_product(&self, product: NewProduct) -> Result<Product>;
}

#[async_trait]
impl<T: StockLedger + ?Sized> StockLedger for Arc<T> {
    async fn fetch_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        (**self).fetch_by_ids(ids).await
    }

    async fn hold_bulk(
        &self,
        order_id: OrderId,
        items: &[HoldItem],
    ) -> Result<Vec<HoldStockAudit>> {
        (**self).hold_bulk(order_id, items).await
    }

    async fn release_bulk(&self, order_id: OrderId) -> Result<Settlement> {
        (**self).release_bulk(order_id).await
    }

    async fn commit_bulk(&self, order_id: OrderId) -> Result<Settlement> {
        (**self).commit_bulk(order_id).await
    }

    async fn audits_for_order(&self, order_id: OrderId) -> Result<Vec<HoldStockAudit>> {
        (**self).audits_for_order(order_id).await
    }
}

#[async_trait]
impl<T: ProductCatalog + ?Sized> ProductCatalog for Arc<T> {
    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        (**self).create_product(product).await
    }
}

/// Validates hold items and merges duplicate products.
///
/// The returned map iterates in ascending product id, which is the lock
/// acquisition order every ledger implementation uses.
pub fn normalize_hold_items(items: &[HoldItem]) -> Result<BTreeMap<ProductId, i32>> {
    if items.is_empty() {
        return Err(LedgerError::EmptyHold);
    }

    let mut merged = BTreeMap::new();
    for item in items {
        if item.quantity <= 0 {
            return Err(LedgerError::InvalidQuantity {
                product_id: item.product_id,
                quantity: item.quantity,
            });
        }
        let entry = merged.entry(item.product_id).or_insert(0i32);
        *entry = entry
            .checked_add(item.quantity)
            .ok_or(LedgerError::InvalidQuantity {
                product_id: item.product_id,
                quantity: item.quantity,
            })?;
    }
    Ok(merged)
}
