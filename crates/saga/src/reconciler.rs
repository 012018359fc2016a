//! Periodic sweep over overdue pending orders.
//!
//! Catches orders whose expiry notification was never scheduled or got lost.
//! Each order goes through the same compensation handler as a delivered
//! notification, so racing with the consumers is harmless.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ledger::StockLedger;
use orders::OrderStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::compensation::{CompensationHandler, CompensationOutcome};
use crate::config::SagaConfig;
use crate::error::Result;
use crate::scheduler::ExpiryScheduler;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub expired: usize,
    pub failed: usize,
}

pub struct Reconciler<O, L, S>
where
    O: OrderStore,
    L: StockLedger,
    S: ExpiryScheduler,
{
    handler: Arc<CompensationHandler<O, L, S>>,
    interval: Duration,
    batch: usize,
}

impl<O, L, S> Reconciler<O, L, S>
where
    O: OrderStore + 'static,
    L: StockLedger + 'static,
    S: ExpiryScheduler + 'static,
{
    pub fn new(handler: Arc<CompensationHandler<O, L, S>>, config: &SagaConfig) -> Self {
        Self {
            handler,
            interval: config.reconcile_interval,
            batch: config.reconcile_batch.max(1),
        }
    }

    /// Runs one pass over overdue pending orders.
    ///
    /// Pages through them in id order, so orders that keep failing never hide
    /// the ones behind them. Failures are counted and left for the next pass.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = Utc::now();
        let mut report = SweepReport::default();
        let mut after = None;

        loop {
            let page = self
                .handler
                .orders()
                .overdue_pending(now, after, self.batch)
                .await?;
            report.examined += page.len();

            for &order_id in &page {
                match self.handler.handle(order_id).await {
                    Ok(CompensationOutcome::Expired(_)) => report.expired += 1,
                    Ok(_) => {}
                    Err(err) => {
                        report.failed += 1;
                        tracing::warn!(%order_id, error = %err, "sweep could not expire order");
                    }
                }
            }

            match page.last() {
                Some(&last) if page.len() == self.batch => after = Some(last),
                _ => break,
            }
        }

        if report.examined > 0 {
            tracing::info!(
                examined = report.examined,
                expired = report.expired,
                failed = report.failed,
                "reconciliation sweep finished"
            );
        }
        Ok(report)
    }

    /// Sweeps every interval until `shutdown` turns true or its sender is
    /// dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if let Err(err) = self.sweep().await {
                            tracing::error!(error = %err, "reconciliation sweep failed");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use common::{Money, OrderId, ProductId, ShopId, UserId};
    use ledger::{InMemoryStockLedger, NewProduct, ProductCatalog};
    use orders::{InMemoryOrderStore, OrderStatus};

    use super::*;
    use crate::coordinator::OrderCoordinator;
    use crate::request::{CreateOrderRequest, OrderLine};
    use crate::scheduler::LocalDelayQueue;
    use crate::testing::UnreliableLedger;

    fn one_unit(product_id: ProductId) -> CreateOrderRequest {
        CreateOrderRequest {
            user_id: UserId::new(1),
            shop_id: ShopId::new(1),
            total_price: Money::from_cents(100),
            items: vec![OrderLine {
                product_id,
                quantity: 1,
                price: Money::from_cents(100),
            }],
        }
    }

    #[tokio::test]
    async fn test_stuck_orders_do_not_hide_later_ones() {
        let config = SagaConfig {
            order_ttl: Duration::from_millis(20),
            reconcile_batch: 2,
            ..SagaConfig::default()
        };
        let orders = InMemoryOrderStore::new();
        let inner = InMemoryStockLedger::new();
        let product = inner
            .create_product(NewProduct::new(
                ShopId::new(1),
                "Widget",
                Money::from_cents(100),
                10,
            ))
            .await
            .unwrap()
            .id;
        let ledger = UnreliableLedger::new(inner.clone());
        let queue = LocalDelayQueue::new("order-expiry");
        let coordinator =
            OrderCoordinator::new(orders.clone(), ledger.clone(), queue.clone(), config.clone());

        let mut ids: Vec<OrderId> = Vec::new();
        for _ in 0..5 {
            let created = coordinator.create_order(one_unit(product)).await.unwrap();
            ids.push(created.order_id);
        }
        // The two oldest orders fill a whole page and fail on every pass.
        ledger.fail_release_for(ids[0]);
        ledger.fail_release_for(ids[1]);
        tokio::time::sleep(Duration::from_millis(40)).await;

        let handler = Arc::new(CompensationHandler::new(
            orders.clone(),
            ledger.clone(),
            queue,
            &config,
        ));
        let reconciler = Reconciler::new(handler, &config);

        let report = reconciler.sweep().await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                examined: 5,
                expired: 3,
                failed: 2,
            }
        );
        for id in &ids[2..] {
            let order = orders.get_order(*id).await.unwrap().unwrap();
            assert_eq!(order.status, OrderStatus::Expired);
        }
        let row = inner.product(product).await.unwrap();
        assert_eq!((row.stock, row.on_hold_stock), (8, 2));

        let again = reconciler.sweep().await.unwrap();
        assert_eq!((again.examined, again.failed), (2, 2));
    }

    #[tokio::test]
    async fn test_sweep_with_nothing_overdue() {
        let config = SagaConfig::default();
        let handler = Arc::new(CompensationHandler::new(
            InMemoryOrderStore::new(),
            InMemoryStockLedger::new(),
            LocalDelayQueue::new("order-expiry"),
            &config,
        ));
        let report = Reconciler::new(handler, &config).sweep().await.unwrap();
        assert_eq!(report, SweepReport::default());
    }
}
