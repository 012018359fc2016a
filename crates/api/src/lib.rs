//! HTTP surfaces of the order service and the product service.
//!
//! The order service places, confirms and looks up orders through the
//! [`saga::OrderCoordinator`]. The product service owns the catalog and the
//! stock ledger, and exposes the hold, release and commit calls the order
//! service makes. Both serve `/health` and Prometheus `/metrics`.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod server;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::OrderAppState;
use routes::products::ProductAppState;

/// Creates the order service router.
pub fn create_order_app(state: Arc<OrderAppState>, metrics_handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/health", get(routes::health::orders))
        .route("/orders", post(routes::orders::create))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/confirm", post(routes::orders::confirm))
        .with_state(state)
        .merge(metrics_router(metrics_handle))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
}

/// Creates the product service router.
///
/// With an `api_key` the stock ledger endpoints require it in the
/// `X-API-Key` header; catalog reads stay open.
pub fn create_product_app(
    state: Arc<ProductAppState>,
    metrics_handle: PrometheusHandle,
    api_key: Option<String>,
) -> Router {
    let mut internal = Router::new()
        .route("/products/hold-stock", post(routes::products::hold_stock))
        .route("/products/release-stock", post(routes::products::release_stock))
        .route("/products/commit-stock", post(routes::products::commit_stock))
        .route("/holds/{order_id}", get(routes::products::holds));
    if let Some(key) = api_key {
        internal = internal.route_layer(middleware::from_fn_with_state(
            Arc::<str>::from(key),
            auth::require_api_key,
        ));
    }

    Router::new()
        .route("/health", get(routes::health::products))
        .route(
            "/products",
            get(routes::products::list).post(routes::products::create),
        )
        .merge(internal)
        .with_state(state)
        .merge(metrics_router(metrics_handle))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
}

fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(handle)
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
