//! Compensation handler: expires unconfirmed orders and releases their stock.

use std::time::Duration;

use chrono::Utc;
use common::OrderId;
use ledger::{AuditStatus, Settlement, StockLedger};
use orders::{OrderStatus, OrderStore, OrderTx, finish};

use crate::config::SagaConfig;
use crate::coordinator::within;
use crate::error::Result;
use crate::scheduler::ExpiryScheduler;

/// What handling one expiry notification did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompensationOutcome {
    /// The order was marked expired and its held stock released.
    Expired(Settlement),
    /// The notification arrived early and was rescheduled for the remainder.
    Deferred(Duration),
    /// The ledger had already committed the hold, so the order was marked
    /// confirmed to match it instead of expiring.
    Confirmed(Settlement),
    /// The order had already left `pending`; nothing was touched.
    AlreadySettled(OrderStatus),
    /// No such order exists. Any hold left under its id, for example by a
    /// placement that was rolled back, was released.
    Missing(Settlement),
}

/// Handles expiry notifications.
///
/// Every notification is handled under the order row lock, so duplicate
/// deliveries and concurrent workers are safe: the first one to see the
/// order pending and overdue expires it, the rest find it settled.
pub struct CompensationHandler<O, L, S>
where
    O: OrderStore,
    L: StockLedger,
    S: ExpiryScheduler,
{
    orders: O,
    ledger: L,
    scheduler: S,
    remote_timeout: Duration,
}

impl<O, L, S> CompensationHandler<O, L, S>
where
    O: OrderStore,
    L: StockLedger,
    S: ExpiryScheduler,
{
    pub fn new(orders: O, ledger: L, scheduler: S, config: &SagaConfig) -> Self {
        Self {
            orders,
            ledger,
            scheduler,
            remote_timeout: config.remote_timeout,
        }
    }

    pub fn orders(&self) -> &O {
        &self.orders
    }

    /// Handles one notification for `order_id`.
    ///
    /// An `Err` means nothing was committed and the notification must be
    /// redelivered.
    #[tracing::instrument(skip(self))]
    pub async fn handle(&self, order_id: OrderId) -> Result<CompensationOutcome> {
        let mut tx = self.orders.begin().await?;
        let result = self.compensate(tx.as_mut(), order_id).await;
        let outcome = finish(tx, result).await?;

        match outcome {
            CompensationOutcome::Expired(settlement) => {
                metrics::counter!("orders_expired_total").increment(1);
                if !settlement.is_noop() {
                    metrics::counter!("stock_releases_total").increment(1);
                }
                tracing::info!(
                    %order_id,
                    units = settlement.units,
                    "order expired, stock released"
                );
            }
            CompensationOutcome::Deferred(remaining) => {
                metrics::counter!("expiry_deferred_total").increment(1);
                tracing::debug!(
                    %order_id,
                    remaining_ms = remaining.as_millis() as u64,
                    "notification arrived early, rescheduled"
                );
            }
            CompensationOutcome::Confirmed(settlement) => {
                metrics::counter!("orders_confirmed_total").increment(1);
                tracing::warn!(
                    %order_id,
                    units = settlement.units,
                    "hold was already committed, order confirmed instead of expired"
                );
            }
            CompensationOutcome::AlreadySettled(status) => {
                tracing::debug!(%order_id, %status, "order already settled");
            }
            CompensationOutcome::Missing(settlement) if !settlement.is_noop() => {
                metrics::counter!("stock_releases_total").increment(1);
                tracing::warn!(
                    %order_id,
                    units = settlement.units,
                    "released orphaned hold of an order that does not exist"
                );
            }
            CompensationOutcome::Missing(_) => {
                tracing::debug!(%order_id, "no order and no hold to release");
            }
        }
        Ok(outcome)
    }

    async fn compensate(
        &self,
        tx: &mut dyn OrderTx,
        order_id: OrderId,
    ) -> Result<CompensationOutcome> {
        let Some(order) = tx.lock_order(order_id).await? else {
            let settlement = within(
                self.remote_timeout,
                "release_bulk",
                self.ledger.release_bulk(order_id),
            )
            .await?;
            return Ok(CompensationOutcome::Missing(settlement));
        };

        if !order.status.can_expire() {
            return Ok(CompensationOutcome::AlreadySettled(order.status));
        }

        if let Some(remaining) = order.remaining(Utc::now()) {
            self.scheduler.schedule(order_id, remaining).await?;
            return Ok(CompensationOutcome::Deferred(remaining));
        }

        // A confirmation whose commit reached the ledger but whose local
        // update was rolled back leaves the order pending with sold units.
        let audits = within(
            self.remote_timeout,
            "audits_for_order",
            self.ledger.audits_for_order(order_id),
        )
        .await?;
        if audits.iter().any(|a| a.status == AuditStatus::Success) {
            tx.update_status(order_id, OrderStatus::Confirmed).await?;
            let settlement = within(
                self.remote_timeout,
                "commit_bulk",
                self.ledger.commit_bulk(order_id),
            )
            .await?;
            return Ok(CompensationOutcome::Confirmed(settlement));
        }

        tx.update_status(order_id, OrderStatus::Expired).await?;
        let settlement = within(
            self.remote_timeout,
            "release_bulk",
            self.ledger.release_bulk(order_id),
        )
        .await?;
        Ok(CompensationOutcome::Expired(settlement))
    }
}

#[cfg(test)]
mod tests {
    use common::{Money, ProductId, ShopId, UserId};
    use ledger::{HoldItem, InMemoryStockLedger, NewProduct, ProductCatalog};
    use orders::{InMemoryOrderStore, NewOrder, NewOrderItem};

    use super::*;
    use crate::scheduler::LocalDelayQueue;

    struct Fixture {
        handler: CompensationHandler<InMemoryOrderStore, InMemoryStockLedger, LocalDelayQueue>,
        orders: InMemoryOrderStore,
        ledger: InMemoryStockLedger,
        queue: LocalDelayQueue,
        product: ProductId,
    }

    async fn fixture() -> Fixture {
        let orders = InMemoryOrderStore::new();
        let ledger = InMemoryStockLedger::new();
        let queue = LocalDelayQueue::new("order-expiry");
        let product = ledger
            .create_product(NewProduct::new(
                ShopId::new(1),
                "Widget",
                Money::from_cents(100),
                10,
            ))
            .await
            .unwrap()
            .id;
        Fixture {
            handler: CompensationHandler::new(
                orders.clone(),
                ledger.clone(),
                queue.clone(),
                &SagaConfig::default(),
            ),
            orders,
            ledger,
            queue,
            product,
        }
    }

    /// Inserts a pending order holding 4 units, as the coordinator would.
    async fn pending_order(f: &Fixture, expires_in_ms: i64) -> OrderId {
        let mut tx = f.orders.begin().await.unwrap();
        let order = tx
            .insert_order(&NewOrder {
                user_id: UserId::new(1),
                shop_id: ShopId::new(1),
                total_price: Money::from_cents(400),
                expires_at: Utc::now() + chrono::Duration::milliseconds(expires_in_ms),
                items: vec![NewOrderItem {
                    product_id: f.product,
                    quantity: 4,
                    item_price: Money::from_cents(100),
                }],
            })
            .await
            .unwrap();
        f.ledger
            .hold_bulk(order.id, &[HoldItem::new(f.product, 4)])
            .await
            .unwrap();
        tx.commit().await.unwrap();
        order.id
    }

    async fn counters(f: &Fixture) -> (i32, i32) {
        let row = f.ledger.product(f.product).await.unwrap();
        (row.stock, row.on_hold_stock)
    }

    #[tokio::test]
    async fn test_overdue_order_expires_and_releases() {
        let f = fixture().await;
        let id = pending_order(&f, -1).await;

        let outcome = f.handler.handle(id).await.unwrap();
        assert!(matches!(outcome, CompensationOutcome::Expired(s) if s.units == 4));
        assert_eq!(counters(&f).await, (10, 0));

        let order = f.orders.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Expired);
    }

    #[tokio::test]
    async fn test_second_delivery_is_a_noop() {
        let f = fixture().await;
        let id = pending_order(&f, -1).await;

        f.handler.handle(id).await.unwrap();
        let outcome = f.handler.handle(id).await.unwrap();

        assert_eq!(
            outcome,
            CompensationOutcome::AlreadySettled(OrderStatus::Expired)
        );
        assert_eq!(counters(&f).await, (10, 0));
    }

    #[tokio::test]
    async fn test_early_delivery_is_rescheduled() {
        let f = fixture().await;
        let id = pending_order(&f, 60_000).await;

        let outcome = f.handler.handle(id).await.unwrap();
        assert!(
            matches!(outcome, CompensationOutcome::Deferred(d) if d > Duration::from_secs(50))
        );
        assert_eq!(f.queue.published_count(), 1);
        assert_eq!(counters(&f).await, (6, 4));

        let order = f.orders.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_failed_release_leaves_order_pending() {
        let f = fixture().await;
        let id = pending_order(&f, -1).await;
        f.ledger.set_unavailable(true);

        assert!(f.handler.handle(id).await.is_err());
        let order = f.orders.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);

        f.ledger.set_unavailable(false);
        let outcome = f.handler.handle(id).await.unwrap();
        assert!(matches!(outcome, CompensationOutcome::Expired(_)));
        assert_eq!(counters(&f).await, (10, 0));
    }

    #[tokio::test]
    async fn test_failed_reschedule_is_retried() {
        let f = fixture().await;
        let id = pending_order(&f, 60_000).await;
        f.queue.set_fail_publish(true);

        assert!(f.handler.handle(id).await.is_err());
        assert_eq!(counters(&f).await, (6, 4));
    }

    #[tokio::test]
    async fn test_unknown_order_is_acknowledged() {
        let f = fixture().await;
        let outcome = f.handler.handle(OrderId::new(999)).await.unwrap();
        assert_eq!(outcome, CompensationOutcome::Missing(Settlement::default()));
    }

    #[tokio::test]
    async fn test_unknown_order_releases_leftover_hold() {
        let f = fixture().await;
        // A placement that rolled back after its hold landed leaves exactly this.
        f.ledger
            .hold_bulk(OrderId::new(999), &[HoldItem::new(f.product, 4)])
            .await
            .unwrap();
        assert_eq!(counters(&f).await, (6, 4));

        let outcome = f.handler.handle(OrderId::new(999)).await.unwrap();
        assert!(matches!(outcome, CompensationOutcome::Missing(s) if s.units == 4));
        assert_eq!(counters(&f).await, (10, 0));

        let again = f.handler.handle(OrderId::new(999)).await.unwrap();
        assert_eq!(again, CompensationOutcome::Missing(Settlement::default()));
    }

    #[tokio::test]
    async fn test_committed_hold_confirms_overdue_order() {
        let f = fixture().await;
        let id = pending_order(&f, -1).await;
        f.ledger.commit_bulk(id).await.unwrap();

        let outcome = f.handler.handle(id).await.unwrap();
        assert!(matches!(outcome, CompensationOutcome::Confirmed(s) if s.is_noop()));
        assert_eq!(counters(&f).await, (6, 0));

        let order = f.orders.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
    }
}
