use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, ShopId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    AuditStatus, HoldItem, HoldStockAudit, LedgerError, NewProduct, Product, ProductCatalog,
    Result, Settlement, StockLedger, normalize_hold_items,
};

const PRODUCT_COLUMNS: &str = "id, shop_id, name, price, stock, on_hold_stock, status";
const AUDIT_COLUMNS: &str = "id, order_id, product_id, quantity, status, created_at";

/// PostgreSQL-backed stock ledger.
///
/// Product rows are locked with `SELECT ... ORDER BY id FOR UPDATE`, so the
/// lock acquisition order is ascending product id for every caller.
#[derive(Clone)]
pub struct PostgresStockLedger {
    pool: PgPool,
}

impl PostgresStockLedger {
    /// Creates a new PostgreSQL stock ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the ledger migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations/ledger")
            .run(&self.pool)
            .await?;
        Ok(())
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        let status: String = row.try_get("status")?;
        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            shop_id: ShopId::new(row.try_get("shop_id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price")?),
            stock: row.try_get("stock")?,
            on_hold_stock: row.try_get("on_hold_stock")?,
            status: status.parse()?,
        })
    }

    fn row_to_audit(row: PgRow) -> Result<HoldStockAudit> {
        let status: String = row.try_get("status")?;
        Ok(HoldStockAudit {
            id: row.try_get("id")?,
            order_id: OrderId::new(row.try_get("order_id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity: row.try_get("quantity")?,
            status: status.parse()?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }

    /// Locks the given product rows in ascending id order.
    async fn lock_products(
        tx: &mut Transaction<'static, Postgres>,
        ids: &[i64],
    ) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        ))
        .bind(ids)
        .fetch_all(&mut **tx)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    /// Closes every held audit of an order with `outcome`.
    async fn settle(&self, order_id: OrderId, outcome: AuditStatus) -> Result<Settlement> {
        if !AuditStatus::Held.can_transition_to(outcome) {
            return Err(LedgerError::InvalidTransition {
                from: AuditStatus::Held,
                to: outcome,
            });
        }
        let mut tx = self.pool.begin().await?;

        // Locking the audit rows makes a concurrent settle of the same order
        // wait here and then see the rows as no longer held.
        let held: Vec<HoldStockAudit> = sqlx::query(&format!(
            "SELECT {AUDIT_COLUMNS} FROM hold_stock_audit \
             WHERE order_id = $1 AND status = 'held' ORDER BY product_id FOR UPDATE"
        ))
        .bind(order_id.value())
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(Self::row_to_audit)
        .collect::<Result<_>>()?;

        if held.is_empty() {
            tx.commit().await?;
            tracing::debug!(%order_id, "no held stock to settle");
            return Ok(Settlement::default());
        }

        let ids: Vec<i64> = held.iter().map(|a| a.product_id.value()).collect();
        let products = Self::lock_products(&mut tx, &ids).await?;

        for audit in &held {
            let product = products
                .iter()
                .find(|p| p.id == audit.product_id)
                .ok_or(LedgerError::ProductNotFound(audit.product_id))?;
            if product.on_hold_stock < audit.quantity {
                return Err(LedgerError::CorruptRow(format!(
                    "product {} has {} units on hold, audit expects {}",
                    product.id, product.on_hold_stock, audit.quantity
                )));
            }
        }

        let restock = outcome == AuditStatus::Cancelled;
        let mut units = 0i64;
        for audit in &held {
            sqlx::query(
                r#"
                UPDATE products
                SET on_hold_stock = on_hold_stock - $2,
                    stock = stock + CASE WHEN $3 THEN $2 ELSE 0 END,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(audit.product_id.value())
            .bind(audit.quantity)
            .bind(restock)
            .execute(&mut *tx)
            .await?;
            units += i64::from(audit.quantity);
        }

        let audit_ids: Vec<i64> = held.iter().map(|a| a.id).collect();
        sqlx::query("UPDATE hold_stock_audit SET status = $2 WHERE id = ANY($1) AND status = 'held'")
            .bind(&audit_ids)
            .bind(outcome.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Settlement {
            audits_closed: held.len(),
            units,
        })
    }
}

#[async_trait]
impl StockLedger for PostgresStockLedger {
    async fn fetch_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let raw: Vec<i64> = ids.iter().map(ProductId::value).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(&raw)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    #[tracing::instrument(skip(self, items), fields(items = items.len()))]
    async fn hold_bulk(
        &self,
        order_id: OrderId,
        items: &[HoldItem],
    ) -> Result<Vec<HoldStockAudit>> {
        let wanted = normalize_hold_items(items)?;
        let ids: Vec<i64> = wanted.keys().map(ProductId::value).collect();

        let mut tx = self.pool.begin().await?;

        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM hold_stock_audit WHERE order_id = $1")
                .bind(order_id.value())
                .fetch_one(&mut *tx)
                .await?;
        if existing > 0 {
            return Err(LedgerError::HoldExists(order_id));
        }

        let products = Self::lock_products(&mut tx, &ids).await?;

        for (product_id, quantity) in &wanted {
            let product = products
                .iter()
                .find(|p| p.id == *product_id)
                .ok_or(LedgerError::ProductNotFound(*product_id))?;
            if *quantity > product.stock {
                return Err(LedgerError::InsufficientStock {
                    product_id: *product_id,
                    requested: *quantity,
                    available: product.stock,
                });
            }
        }

        let mut created = Vec::with_capacity(wanted.len());
        for (product_id, quantity) in &wanted {
            sqlx::query(
                r#"
                UPDATE products
                SET stock = stock - $2, on_hold_stock = on_hold_stock + $2, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(product_id.value())
            .bind(*quantity)
            .execute(&mut *tx)
            .await?;

            let row = sqlx::query(&format!(
                "INSERT INTO hold_stock_audit (order_id, product_id, quantity, status) \
                 VALUES ($1, $2, $3, 'held') RETURNING {AUDIT_COLUMNS}"
            ))
            .bind(order_id.value())
            .bind(product_id.value())
            .bind(*quantity)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                // A concurrent hold for the same order won the race.
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_order_product_hold")
                {
                    return LedgerError::HoldExists(order_id);
                }
                LedgerError::Database(e)
            })?;
            created.push(Self::row_to_audit(row)?);
        }

        tx.commit().await?;
        Ok(created)
    }

    #[tracing::instrument(skip(self))]
    async fn release_bulk(&self, order_id: OrderId) -> Result<Settlement> {
        self.settle(order_id, AuditStatus::Cancelled).await
    }

    #[tracing::instrument(skip(self))]
    async fn commit_bulk(&self, order_id: OrderId) -> Result<Settlement> {
        self.settle(order_id, AuditStatus::Success).await
    }

    async fn audits_for_order(&self, order_id: OrderId) -> Result<Vec<HoldStockAudit>> {
        let rows = sqlx::query(&format!(
            "SELECT {AUDIT_COLUMNS} FROM hold_stock_audit WHERE order_id = $1 ORDER BY product_id"
        ))
        .bind(order_id.value())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_audit).collect()
    }
}

#[async_trait]
impl ProductCatalog for PostgresStockLedger {
    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        product.validate()?;

        let row = sqlx::query(&format!(
            "INSERT INTO products (shop_id, name, price, stock, on_hold_stock, status) \
             VALUES ($1, $2, $3, $4, 0, 'active') RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(product.shop_id.value())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(product.stock)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_product(row)
    }
}
