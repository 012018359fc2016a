use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    NewOrder, Order, OrderItem, OrderStatus, OrderStore, OrderStoreError, OrderTx, Result,
};

/// A committed order row plus the lock that stands in for `FOR UPDATE`.
struct Row {
    lock: Arc<Mutex<()>>,
    committed: RwLock<Order>,
}

#[derive(Default)]
struct Tables {
    orders: RwLock<HashMap<OrderId, Arc<Row>>>,
    next_order_id: AtomicI64,
    next_item_id: AtomicI64,
}

/// In-memory order store for testing and single-node deployments.
///
/// Each order row has its own lock held by at most one transaction. Plain
/// reads see the last committed version and never wait for a lock.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    inner: Arc<Tables>,
}

impl InMemoryOrderStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.inner.orders.read().await.len()
    }
}

struct InMemoryOrderTx {
    tables: Arc<Tables>,
    locked: BTreeMap<OrderId, (Arc<Row>, OwnedMutexGuard<()>)>,
    staged: BTreeMap<OrderId, Order>,
    inserted: Vec<Order>,
}

#[async_trait]
impl OrderTx for InMemoryOrderTx {
    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order> {
        order.validate()?;

        let id = OrderId::new(self.tables.next_order_id.fetch_add(1, Ordering::SeqCst) + 1);
        let now = Utc::now();
        let items = order
            .items
            .iter()
            .map(|item| OrderItem {
                id: self.tables.next_item_id.fetch_add(1, Ordering::SeqCst) + 1,
                order_id: id,
                product_id: item.product_id,
                quantity: item.quantity,
                item_price: item.item_price,
                created_at: now,
            })
            .collect();

        let created = Order {
            id,
            user_id: order.user_id,
            shop_id: order.shop_id,
            total_price: order.total_price,
            status: OrderStatus::Pending,
            expires_at: order.expires_at,
            created_at: now,
            updated_at: now,
            items,
        };
        self.inserted.push(created.clone());
        Ok(created)
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        if let Some(order) = self.inserted.iter().find(|o| o.id == id) {
            return Ok(Some(order.clone()));
        }
        if let Some(order) = self.staged.get(&id) {
            return Ok(Some(order.clone()));
        }
        if let Some((row, _)) = self.locked.get(&id) {
            return Ok(Some(row.committed.read().await.clone()));
        }

        let Some(row) = self.tables.orders.read().await.get(&id).cloned() else {
            return Ok(None);
        };
        let guard = row.lock.clone().lock_owned().await;
        let order = row.committed.read().await.clone();
        self.locked.insert(id, (row, guard));
        Ok(Some(order))
    }

    async fn update_status(&mut self, id: OrderId, status: OrderStatus) -> Result<()> {
        let now = Utc::now();
        if let Some(order) = self.inserted.iter_mut().find(|o| o.id == id) {
            order.status.ensure_transition(id, status)?;
            order.status = status;
            order.updated_at = now;
            return Ok(());
        }

        let mut order = self
            .lock_order(id)
            .await?
            .ok_or(OrderStoreError::NotFound(id))?;
        order.status.ensure_transition(id, status)?;
        order.status = status;
        order.updated_at = now;
        self.staged.insert(id, order);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryOrderTx {
            tables,
            locked,
            staged,
            inserted,
        } = *self;

        for (id, order) in staged {
            if let Some((row, _)) = locked.get(&id) {
                *row.committed.write().await = order;
            }
        }

        if !inserted.is_empty() {
            let mut orders = tables.orders.write().await;
            for order in inserted {
                orders.insert(
                    order.id,
                    Arc::new(Row {
                        lock: Arc::new(Mutex::new(())),
                        committed: RwLock::new(order),
                    }),
                );
            }
        }

        // Row locks are released here, after every write is visible.
        drop(locked);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn begin(&self) -> Result<Box<dyn OrderTx>> {
        Ok(Box::new(InMemoryOrderTx {
            tables: self.inner.clone(),
            locked: BTreeMap::new(),
            staged: BTreeMap::new(),
            inserted: Vec::new(),
        }))
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let Some(row) = self.inner.orders.read().await.get(&id).cloned() else {
            return Ok(None);
        };
        let order = row.committed.read().await.clone();
        Ok(Some(order))
    }

    async fn overdue_pending(
        &self,
        now: DateTime<Utc>,
        after: Option<OrderId>,
        limit: usize,
    ) -> Result<Vec<OrderId>> {
        let rows: Vec<Arc<Row>> = self
            .inner
            .orders
            .read()
            .await
            .iter()
            .filter(|(id, _)| after.is_none_or(|after| **id > after))
            .map(|(_, row)| row.clone())
            .collect();

        let mut overdue = Vec::new();
        for row in rows {
            let order = row.committed.read().await;
            if order.status == OrderStatus::Pending && order.expires_at <= now {
                overdue.push(order.id);
            }
        }
        overdue.sort();
        overdue.truncate(limit);
        Ok(overdue)
    }
}
