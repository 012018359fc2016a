use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, ShopId, UserId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    NewOrder, Order, OrderItem, OrderStatus, OrderStore, OrderStoreError, OrderTx, Result,
};

const ORDER_COLUMNS: &str =
    "id, user_id, shop_id, total_price, status, expires_at, created_at, updated_at";
const ITEM_COLUMNS: &str = "id, order_id, product_id, quantity, item_price, created_at";

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the order store migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations/orders")
            .run(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
    let status: String = row.try_get("status")?;
    Ok(Order {
        id: OrderId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        shop_id: ShopId::new(row.try_get("shop_id")?),
        total_price: Money::from_cents(row.try_get("total_price")?),
        status: status.parse()?,
        expires_at: row.try_get::<DateTime<Utc>, _>("expires_at")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        items,
    })
}

fn row_to_item(row: PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: row.try_get("id")?,
        order_id: OrderId::new(row.try_get("order_id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        quantity: row.try_get("quantity")?,
        item_price: Money::from_cents(row.try_get("item_price")?),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

async fn load_items<'e, E>(executor: E, id: OrderId) -> Result<Vec<OrderItem>>
where
    E: sqlx::PgExecutor<'e>,
{
    let rows = sqlx::query(&format!(
        "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id"
    ))
    .bind(id.value())
    .fetch_all(executor)
    .await?;

    rows.into_iter().map(row_to_item).collect()
}

struct PostgresOrderTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl OrderTx for PostgresOrderTx {
    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order> {
        order.validate()?;

        let row = sqlx::query(&format!(
            "INSERT INTO orders (user_id, shop_id, total_price, status, expires_at) \
             VALUES ($1, $2, $3, 'pending', $4) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.user_id.value())
        .bind(order.shop_id.value())
        .bind(order.total_price.cents())
        .bind(order.expires_at)
        .fetch_one(&mut *self.tx)
        .await?;
        let id = OrderId::new(row.try_get("id")?);

        let mut items = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let item_row = sqlx::query(&format!(
                "INSERT INTO order_items (order_id, product_id, quantity, item_price) \
                 VALUES ($1, $2, $3, $4) RETURNING {ITEM_COLUMNS}"
            ))
            .bind(id.value())
            .bind(item.product_id.value())
            .bind(item.quantity)
            .bind(item.item_price.cents())
            .fetch_one(&mut *self.tx)
            .await?;
            items.push(row_to_item(item_row)?);
        }

        row_to_order(&row, items)
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.value())
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let items = load_items(&mut *self.tx, id).await?;
        row_to_order(&row, items).map(Some)
    }

    async fn update_status(&mut self, id: OrderId, status: OrderStatus) -> Result<()> {
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(id.value())
                .fetch_optional(&mut *self.tx)
                .await?;
        let current: OrderStatus = current.ok_or(OrderStoreError::NotFound(id))?.parse()?;
        current.ensure_transition(id, status)?;

        sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.value())
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn begin(&self) -> Result<Box<dyn OrderTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresOrderTx { tx }))
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let items = load_items(&self.pool, id).await?;
        row_to_order(&row, items).map(Some)
    }

    async fn overdue_pending(
        &self,
        now: DateTime<Utc>,
        after: Option<OrderId>,
        limit: usize,
    ) -> Result<Vec<OrderId>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM orders WHERE status = 'pending' AND expires_at <= $1 AND id > $2 \
             ORDER BY id LIMIT $3",
        )
        .bind(now)
        .bind(after.map_or(0, |id| id.value()))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(OrderId::new).collect())
    }
}
