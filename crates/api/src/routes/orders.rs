//! Order placement, confirmation and lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderId;
use ledger::StockLedger;
use orders::{Order, OrderStore};
use saga::{CreateOrderRequest, CreateOrderResponse, LocalDelayQueue, OrderCoordinator};

use crate::error::ApiError;

/// Coordinator over whichever order store and stock ledger the service was
/// started with.
pub type Coordinator =
    OrderCoordinator<Arc<dyn OrderStore>, Arc<dyn StockLedger>, LocalDelayQueue>;

/// Shared application state of the order service.
pub struct OrderAppState {
    pub coordinator: Arc<Coordinator>,
}

/// POST /orders: validate, hold stock, and place a pending order.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<OrderAppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), ApiError> {
    let response = state.coordinator.create_order(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /orders/{id}: the order with its items.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<OrderAppState>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    Ok(Json(state.coordinator.get_order(order_id).await?))
}

/// POST /orders/{id}/confirm: confirm a pending order before it expires.
#[tracing::instrument(skip(state))]
pub async fn confirm(
    State(state): State<Arc<OrderAppState>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    Ok(Json(state.coordinator.confirm_order(order_id).await?))
}

pub(crate) fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let order_id = id
        .parse::<i64>()
        .map(OrderId::new)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order id {id:?}: {e}")))?;
    if !order_id.is_valid() {
        return Err(ApiError::BadRequest(format!("Invalid order id {id:?}")));
    }
    Ok(order_id)
}
