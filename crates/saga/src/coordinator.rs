//! Order coordinator: places orders against a stock ledger owned by another
//! service.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use chrono::Utc;
use common::{Money, OrderId, ProductId};
use ledger::{HoldItem, HoldStockAudit, Product, StockLedger};
use orders::{NewOrder, NewOrderItem, Order, OrderStatus, OrderStore, OrderTx, finish};

use crate::config::SagaConfig;
use crate::error::{Result, SagaError};
use crate::request::{CreateOrderRequest, CreateOrderResponse};
use crate::scheduler::ExpiryScheduler;

/// Runs a stock ledger call, turning a timeout into a remote failure.
pub(crate) async fn within<T, F>(limit: Duration, operation: &'static str, call: F) -> Result<T>
where
    F: Future<Output = ledger::Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(SagaError::from),
        Err(_) => Err(SagaError::RemoteFailure(format!(
            "{operation} timed out after {}ms",
            limit.as_millis()
        ))),
    }
}

/// Places, confirms and looks up orders.
///
/// Placing an order reserves its stock with [`StockLedger::hold_bulk`] while
/// the local order transaction is still open. The order is committed only if
/// the hold succeeded, then an expiry notification is scheduled for the
/// order's time-to-live.
pub struct OrderCoordinator<O, L, S>
where
    O: OrderStore,
    L: StockLedger,
    S: ExpiryScheduler,
{
    orders: O,
    ledger: L,
    scheduler: S,
    config: SagaConfig,
}

impl<O, L, S> OrderCoordinator<O, L, S>
where
    O: OrderStore,
    L: StockLedger,
    S: ExpiryScheduler,
{
    /// Creates a new order coordinator.
    pub fn new(orders: O, ledger: L, scheduler: S, config: SagaConfig) -> Self {
        Self {
            orders,
            ledger,
            scheduler,
            config,
        }
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    /// Validates and places an order, holding its stock until it is confirmed
    /// or expires.
    ///
    /// Nothing is written when validation fails. When the hold fails the
    /// local transaction is rolled back and no order exists afterwards.
    #[tracing::instrument(
        skip(self, request),
        fields(user_id = %request.user_id, shop_id = %request.shop_id, items = request.items.len())
    )]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<CreateOrderResponse> {
        let start = Instant::now();
        let result = self.place_order(&request).await;
        metrics::histogram!("order_create_duration_seconds").record(start.elapsed().as_secs_f64());

        match &result {
            Ok(created) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(
                    order_id = %created.order_id,
                    total_price = %created.total_price,
                    expires_at = %created.expires_at,
                    "order created"
                );
            }
            Err(err) => {
                metrics::counter!("orders_rejected_total", "reason" => err.reason()).increment(1);
                match err {
                    SagaError::Internal(_) | SagaError::Scheduler(_) => {
                        tracing::error!(error = %err, "order creation failed")
                    }
                    _ => tracing::warn!(reason = err.reason(), error = %err, "order rejected"),
                }
            }
        }
        result
    }

    async fn place_order(&self, request: &CreateOrderRequest) -> Result<CreateOrderResponse> {
        request.validate()?;

        let product_ids = request.product_ids();
        let products = within(
            self.config.remote_timeout,
            "fetch_by_ids",
            self.ledger.fetch_by_ids(&product_ids),
        )
        .await?;
        let catalog: HashMap<ProductId, &Product> = products.iter().map(|p| (p.id, p)).collect();

        let missing: Vec<ProductId> = product_ids
            .iter()
            .filter(|id| !catalog.contains_key(id))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(SagaError::ProductsNotFound {
                product_ids: missing,
            });
        }

        let wanted = request.quantities();
        let mut total = Money::zero();
        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let product = catalog[&line.product_id];

            if product.shop_id != request.shop_id {
                return Err(SagaError::ShopMismatch {
                    product_id: product.id,
                    expected: request.shop_id,
                    actual: product.shop_id,
                });
            }
            let requested = wanted[&line.product_id];
            if requested > i64::from(product.stock) {
                return Err(SagaError::InsufficientStock {
                    product_id: product.id,
                    requested: i32::try_from(requested).unwrap_or(i32::MAX),
                    available: product.stock,
                });
            }
            if line.price != product.price {
                return Err(SagaError::Validation(format!(
                    "price for product {} is {}, not {}",
                    product.id, product.price, line.price
                )));
            }

            total = product
                .price
                .checked_multiply(line.quantity)
                .and_then(|subtotal| total.checked_add(subtotal))
                .ok_or_else(|| {
                    SagaError::Validation(format!(
                        "total price overflows at product {}",
                        product.id
                    ))
                })?;
            items.push(NewOrderItem {
                product_id: product.id,
                quantity: line.quantity,
                item_price: product.price,
            });
        }
        if total != request.total_price {
            return Err(SagaError::Validation(format!(
                "total price is {total}, not {}",
                request.total_price
            )));
        }

        let ttl = chrono::Duration::from_std(self.config.order_ttl)
            .map_err(|e| SagaError::Internal(format!("order ttl out of range: {e}")))?;
        let new_order = NewOrder {
            user_id: request.user_id,
            shop_id: request.shop_id,
            total_price: total,
            expires_at: Utc::now() + ttl,
            items,
        };
        let hold_items: Vec<HoldItem> = request
            .items
            .iter()
            .map(|line| HoldItem::new(line.product_id, line.quantity))
            .collect();

        let mut tx = self.orders.begin().await?;
        let order = match tx.insert_order(&new_order).await {
            Ok(order) => order,
            Err(err) => return finish(tx, Err(err.into())).await,
        };

        let held = self.hold_stock(order.id, &hold_items).await;
        let hold_succeeded = held.is_ok();
        if let Err(err) = finish(tx, held).await {
            // The ledger may hold stock for an order that was never committed.
            if hold_succeeded || err.is_remote_failure() {
                self.release_orphaned_hold(order.id).await;
                // A hold still in flight can land after that release, and the
                // release itself can fail. The compensation handler finds no
                // order once the TTL elapses and releases again.
                self.schedule_orphan_cleanup(order.id).await;
            }
            return Err(err);
        }

        if let Err(err) = self
            .scheduler
            .schedule(order.id, self.config.order_ttl)
            .await
        {
            tracing::warn!(
                order_id = %order.id,
                error = %err,
                "failed to schedule expiry, leaving it to the reconciliation sweep"
            );
        }

        Ok(CreateOrderResponse {
            order_id: order.id,
            total_price: order.total_price,
            total_items: order.total_items(),
            status: order.status,
            expires_at: order.expires_at,
        })
    }

    async fn hold_stock(
        &self,
        order_id: OrderId,
        items: &[HoldItem],
    ) -> Result<Vec<HoldStockAudit>> {
        let result = within(
            self.config.remote_timeout,
            "hold_bulk",
            self.ledger.hold_bulk(order_id, items),
        )
        .await;

        match &result {
            Ok(audits) => {
                metrics::counter!("stock_holds_total").increment(1);
                tracing::debug!(%order_id, audits = audits.len(), "stock held");
            }
            Err(SagaError::InsufficientStock { product_id, .. }) => {
                metrics::counter!("stock_hold_conflicts_total").increment(1);
                tracing::warn!(%order_id, %product_id, "stock ran out before the hold");
            }
            Err(_) => {}
        }
        result
    }

    async fn release_orphaned_hold(&self, order_id: OrderId) {
        match within(
            self.config.remote_timeout,
            "release_bulk",
            self.ledger.release_bulk(order_id),
        )
        .await
        {
            Ok(settlement) if !settlement.is_noop() => {
                metrics::counter!("stock_releases_total").increment(1);
                tracing::warn!(%order_id, units = settlement.units, "released orphaned hold");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(%order_id, error = %err, "failed to release orphaned hold")
            }
        }
    }

    async fn schedule_orphan_cleanup(&self, order_id: OrderId) {
        if let Err(err) = self
            .scheduler
            .schedule(order_id, self.config.order_ttl)
            .await
        {
            tracing::error!(
                %order_id,
                error = %err,
                "failed to schedule release of a possibly orphaned hold"
            );
        }
    }

    /// Confirms a pending order and converts its held stock into sold units.
    ///
    /// Takes the same order row lock as the compensation handler, so an order
    /// is either confirmed or expired, never both.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_order(&self, order_id: OrderId) -> Result<Order> {
        let mut tx = self.orders.begin().await?;
        let result = self.confirm_locked(tx.as_mut(), order_id).await;
        let order = finish(tx, result).await?;

        metrics::counter!("orders_confirmed_total").increment(1);
        tracing::info!(%order_id, "order confirmed");
        Ok(order)
    }

    async fn confirm_locked(&self, tx: &mut dyn OrderTx, order_id: OrderId) -> Result<Order> {
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or(SagaError::OrderNotFound(order_id))?;

        if !order.status.can_confirm() {
            return Err(SagaError::InvalidState {
                order_id,
                status: order.status,
            });
        }
        if order.is_overdue(Utc::now()) {
            return Err(SagaError::OrderExpired(order_id));
        }

        tx.update_status(order_id, OrderStatus::Confirmed).await?;
        let settlement = within(
            self.config.remote_timeout,
            "commit_bulk",
            self.ledger.commit_bulk(order_id),
        )
        .await?;
        tracing::debug!(%order_id, units = settlement.units, "held stock committed");

        order.status = OrderStatus::Confirmed;
        order.updated_at = Utc::now();
        Ok(order)
    }

    /// Loads an order and its items.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or(SagaError::OrderNotFound(order_id))
    }
}
