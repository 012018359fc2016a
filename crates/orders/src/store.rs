//! Order store traits and the scoped transaction helper.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;

use crate::{NewOrder, Order, OrderStatus, OrderStoreError, Result};

/// One unit of work against the order store.
///
/// Writes stay invisible to other transactions until [`OrderTx::commit`].
/// Dropping a transaction without committing discards its writes and
/// releases its row locks.
#[async_trait]
pub trait OrderTx: Send {
    /// Inserts a pending order and its items.
    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order>;

    /// Locks the order row for the rest of the transaction and returns it.
    ///
    /// Returns `None` if no such order exists.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Sets the status of an order, locking its row if not already held.
    async fn update_status(&mut self, id: OrderId, status: OrderStatus) -> Result<()>;

    /// Makes every write of the transaction visible.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discards every write of the transaction.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Storage for orders and their items.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Opens a new transaction.
    async fn begin(&self) -> Result<Box<dyn OrderTx>>;

    /// Loads an order and its items without locking.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Lists up to `limit` pending orders whose expiry is at or before `now`,
    /// in id order, starting after the id `after`.
    async fn overdue_pending(
        &self,
        now: DateTime<Utc>,
        after: Option<OrderId>,
        limit: usize,
    ) -> Result<Vec<OrderId>>;
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for Arc<T> {
    async fn begin(&self) -> Result<Box<dyn OrderTx>> {
        (**self).begin().await
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        (**self).get_order(id).await
    }

    async fn overdue_pending(
        &self,
        now: DateTime<Utc>,
        after: Option<OrderId>,
        limit: usize,
    ) -> Result<Vec<OrderId>> {
        (**self).overdue_pending(now, after, limit).await
    }
}

/// Ends a transaction according to the outcome of its unit of work.
///
/// Commits when `result` is `Ok` and rolls back otherwise. A failed commit
/// replaces the value with the commit error; a failed rollback is logged and
/// the original error is returned.
pub async fn finish<T, E>(
    tx: Box<dyn OrderTx>,
    result: std::result::Result<T, E>,
) -> std::result::Result<T, E>
where
    E: From<OrderStoreError> + std::fmt::Display,
{
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!(error = %rollback_err, cause = %err, "rollback failed");
            }
            Err(err)
        }
    }
}
