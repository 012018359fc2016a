use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, ProductId};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    AuditStatus, HoldItem, HoldStockAudit, LedgerError, NewProduct, Product, ProductCatalog,
    ProductStatus, Result, Settlement, StockLedger, normalize_hold_items,
};

#[derive(Default)]
struct Tables {
    products: RwLock<HashMap<ProductId, Arc<Mutex<Product>>>>,
    audits: Mutex<Vec<HoldStockAudit>>,
    /// Stands in for the row locks on an order's audit rows.
    order_locks: Mutex<HashMap<OrderId, Arc<Mutex<()>>>>,
    next_product_id: AtomicI64,
    next_audit_id: AtomicI64,
    unavailable: AtomicBool,
}

/// In-memory stock ledger for testing and single-node deployments.
///
/// Every product row sits behind its own mutex, so holds touching disjoint
/// products run in parallel while overlapping ones serialize. Row locks are
/// always taken in ascending product id order, the same discipline as
/// `SELECT ... ORDER BY id FOR UPDATE` in the PostgreSQL ledger.
#[derive(Clone, Default)]
pub struct InMemoryStockLedger {
    inner: Arc<Tables>,
}

impl InMemoryStockLedger {
    /// Creates a new empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail as if the ledger were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns a snapshot of a product row.
    pub async fn product(&self, id: ProductId) -> Option<Product> {
        let row = self.inner.products.read().await.get(&id).cloned()?;
        let product = row.lock().await.clone();
        Some(product)
    }

    /// Returns the total number of audit rows.
    pub async fn audit_count(&self) -> usize {
        self.inner.audits.lock().await.len()
    }

    async fn enter(&self) -> Result<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Remote("stock ledger unavailable".to_string()));
        }
        Ok(())
    }

    async fn lock_order(&self, order_id: OrderId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.order_locks.lock().await;
            locks.entry(order_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Locks product rows in the order given, which callers keep ascending.
    async fn lock_products(
        &self,
        ids: impl Iterator<Item = ProductId>,
    ) -> Result<Vec<OwnedMutexGuard<Product>>> {
        let rows = {
            let products = self.inner.products.read().await;
            ids.map(|id| {
                products
                    .get(&id)
                    .cloned()
                    .ok_or(LedgerError::ProductNotFound(id))
            })
            .collect::<Result<Vec<_>>>()?
        };

        let mut guards = Vec::with_capacity(rows.len());
        for row in rows {
            guards.push(row.lock_owned().await);
        }
        Ok(guards)
    }

    /// Closes every held audit of an order with `outcome`.
    async fn settle(&self, order_id: OrderId, outcome: AuditStatus) -> Result<Settlement> {
        self.enter().await?;
        if !AuditStatus::Held.can_transition_to(outcome) {
            return Err(LedgerError::InvalidTransition {
                from: AuditStatus::Held,
                to: outcome,
            });
        }
        let _order_guard = self.lock_order(order_id).await;

        let mut held: Vec<(i64, ProductId, i32)> = self
            .inner
            .audits
            .lock()
            .await
            .iter()
            .filter(|a| a.order_id == order_id && a.is_held())
            .map(|a| (a.id, a.product_id, a.quantity))
            .collect();

        if held.is_empty() {
            tracing::debug!(%order_id, "no held stock to settle");
            return Ok(Settlement::default());
        }
        held.sort_by_key(|(_, product_id, _)| *product_id);

        let mut rows = self
            .lock_products(held.iter().map(|(_, product_id, _)| *product_id))
            .await?;

        for (row, (_, product_id, quantity)) in rows.iter().zip(&held) {
            if row.on_hold_stock < *quantity {
                return Err(LedgerError::CorruptRow(format!(
                    "product {product_id} has {} units on hold, audit expects {quantity}",
                    row.on_hold_stock
                )));
            }
        }

        let mut units = 0i64;
        for (row, (_, _, quantity)) in rows.iter_mut().zip(&held) {
            row.on_hold_stock -= quantity;
            if outcome == AuditStatus::Cancelled {
                row.stock += quantity;
            }
            units += i64::from(*quantity);
        }

        let mut audits = self.inner.audits.lock().await;
        for audit in audits.iter_mut() {
            if held.iter().any(|(id, _, _)| *id == audit.id) {
                audit.status = outcome;
            }
        }

        Ok(Settlement {
            audits_closed: held.len(),
            units,
        })
    }
}

#[async_trait]
impl StockLedger for InMemoryStockLedger {
    async fn fetch_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        self.enter().await?;

        let rows: Vec<_> = {
            let products = self.inner.products.read().await;
            ids.iter().filter_map(|id| products.get(id).cloned()).collect()
        };

        let mut found = Vec::with_capacity(rows.len());
        for row in rows {
            found.push(row.lock().await.clone());
        }
        found.sort_by_key(|p| p.id);
        found.dedup_by_key(|p| p.id);
        Ok(found)
    }

    async fn hold_bulk(
        &self,
        order_id: OrderId,
        items: &[HoldItem],
    ) -> Result<Vec<HoldStockAudit>> {
        self.enter().await?;
        let wanted = normalize_hold_items(items)?;
        let _order_guard = self.lock_order(order_id).await;

        if self
            .inner
            .audits
            .lock()
            .await
            .iter()
            .any(|a| a.order_id == order_id)
        {
            return Err(LedgerError::HoldExists(order_id));
        }

        let mut rows = self.lock_products(wanted.keys().copied()).await?;

        for (row, (product_id, quantity)) in rows.iter().zip(&wanted) {
            if *quantity > row.stock {
                return Err(LedgerError::InsufficientStock {
                    product_id: *product_id,
                    requested: *quantity,
                    available: row.stock,
                });
            }
        }

        let now = Utc::now();
        let mut audits = self.inner.audits.lock().await;
        let mut created = Vec::with_capacity(wanted.len());
        for (row, (product_id, quantity)) in rows.iter_mut().zip(&wanted) {
            row.stock -= quantity;
            row.on_hold_stock += quantity;

            let audit = HoldStockAudit {
                id: self.inner.next_audit_id.fetch_add(1, Ordering::SeqCst) + 1,
                order_id,
                product_id: *product_id,
                quantity: *quantity,
                status: AuditStatus::Held,
                created_at: now,
            };
            audits.push(audit.clone());
            created.push(audit);
        }

        Ok(created)
    }

    async fn release_bulk(&self, order_id: OrderId) -> Result<Settlement> {
        self.settle(order_id, AuditStatus::Cancelled).await
    }

    async fn commit_bulk(&self, order_id: OrderId) -> Result<Settlement> {
        self.settle(order_id, AuditStatus::Success).await
    }

    async fn audits_for_order(&self, order_id: OrderId) -> Result<Vec<HoldStockAudit>> {
        self.enter().await?;
        let mut audits: Vec<_> = self
            .inner
            .audits
            .lock()
            .await
            .iter()
            .filter(|a| a.order_id == order_id)
            .cloned()
            .collect();
        audits.sort_by_key(|a| a.product_id);
        Ok(audits)
    }
}

#[async_trait]
impl ProductCatalog for InMemoryStockLedger {
    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        product.validate()?;

        let id = ProductId::new(self.inner.next_product_id.fetch_add(1, Ordering::SeqCst) + 1);
        let created = Product {
            id,
            shop_id: product.shop_id,
            name: product.name,
            price: product.price,
            stock: product.stock,
            on_hold_stock: 0,
            status: ProductStatus::Active,
        };

        self.inner
            .products
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(created.clone())));
        Ok(created)
    }
}
