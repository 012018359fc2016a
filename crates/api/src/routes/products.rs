//! Product service endpoints: catalog reads and the stock ledger operations
//! the order service calls.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::ProductId;
use ledger::wire::{HoldStockRequest, HoldStockResponse, ProductListResponse, SettleStockRequest};
use ledger::{HoldStockAudit, NewProduct, Product, ProductCatalog, Settlement, StockLedger};
use serde::Deserialize;

use crate::error::ApiError;
use crate::routes::orders::parse_order_id;

/// Shared application state of the product service.
pub struct ProductAppState {
    pub catalog: Arc<dyn ProductCatalog>,
}

#[derive(Debug, Deserialize)]
pub struct ProductIdsQuery {
    /// Comma separated product ids.
    #[serde(default)]
    pub ids: String,
}

/// GET /products?ids=1,2: products by id, unknown ids omitted.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<ProductAppState>>,
    Query(query): Query<ProductIdsQuery>,
) -> Result<Json<ProductListResponse>, ApiError> {
    let ids = parse_product_ids(&query.ids)?;
    let products = state.catalog.fetch_by_ids(&ids).await?;
    Ok(Json(ProductListResponse { products }))
}

/// POST /products: register a product with its initial stock.
#[tracing::instrument(skip(state, req), fields(shop_id = %req.shop_id))]
pub async fn create(
    State(state): State<Arc<ProductAppState>>,
    Json(req): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = state.catalog.create_product(req).await?;
    tracing::info!(product_id = %product.id, stock = product.stock, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

/// POST /products/hold-stock: reserve every item for an order, all or nothing.
#[tracing::instrument(skip(state, req), fields(order_id = %req.order_id, items = req.items.len()))]
pub async fn hold_stock(
    State(state): State<Arc<ProductAppState>>,
    Json(req): Json<HoldStockRequest>,
) -> Result<Json<HoldStockResponse>, ApiError> {
    let audits = state.catalog.hold_bulk(req.order_id, &req.items).await?;
    Ok(Json(HoldStockResponse {
        order_id: req.order_id,
        audits,
    }))
}

/// POST /products/release-stock: return an order's held units to stock.
#[tracing::instrument(skip(state, req), fields(order_id = %req.order_id))]
pub async fn release_stock(
    State(state): State<Arc<ProductAppState>>,
    Json(req): Json<SettleStockRequest>,
) -> Result<Json<Settlement>, ApiError> {
    Ok(Json(state.catalog.release_bulk(req.order_id).await?))
}

/// POST /products/commit-stock: mark an order's held units as sold.
#[tracing::instrument(skip(state, req), fields(order_id = %req.order_id))]
pub async fn commit_stock(
    State(state): State<Arc<ProductAppState>>,
    Json(req): Json<SettleStockRequest>,
) -> Result<Json<Settlement>, ApiError> {
    Ok(Json(state.catalog.commit_bulk(req.order_id).await?))
}

/// GET /holds/{order_id}: the hold audit rows of an order.
#[tracing::instrument(skip(state))]
pub async fn holds(
    State(state): State<Arc<ProductAppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<Vec<HoldStockAudit>>, ApiError> {
    let order_id = parse_order_id(&order_id)?;
    let audits = state.catalog.audits_for_order(order_id).await?;
    Ok(Json(audits))
}

fn parse_product_ids(raw: &str) -> Result<Vec<ProductId>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>()
                .map(ProductId::new)
                .map_err(|e| ApiError::BadRequest(format!("Invalid product id {part:?}: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_product_ids() {
        let ids = parse_product_ids("3, 1,,2").unwrap();
        assert_eq!(
            ids,
            vec![ProductId::new(3), ProductId::new(1), ProductId::new(2)]
        );
        assert!(parse_product_ids("").unwrap().is_empty());
        assert!(parse_product_ids("1,x").is_err());
    }
}
