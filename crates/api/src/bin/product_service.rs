//! Product service entry point.

use std::sync::Arc;

use api::config::Config;
use api::routes::products::ProductAppState;
use api::server;
use ledger::{InMemoryStockLedger, PostgresStockLedger, ProductCatalog};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    server::init_tracing(&config);
    let metrics_handle = server::install_metrics().expect("failed to install Prometheus recorder");

    let catalog: Arc<dyn ProductCatalog> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to Postgres");
            let ledger = PostgresStockLedger::new(pool);
            ledger
                .run_migrations()
                .await
                .expect("failed to run ledger migrations");
            Arc::new(ledger)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, products are kept in memory");
            Arc::new(InMemoryStockLedger::new())
        }
    };
    if config.api_key.is_none() {
        tracing::warn!("API_KEY not set, stock endpoints are unauthenticated");
    }

    let app = api::create_product_app(
        Arc::new(ProductAppState { catalog }),
        metrics_handle,
        config.api_key.clone(),
    );
    let addr = config.addr();
    tracing::info!(%addr, "starting product service");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(server::shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("product service shut down gracefully");
}
