//! Order service entry point.

use std::sync::Arc;

use api::config::Config;
use api::routes::orders::OrderAppState;
use api::server;
use ledger::{HttpStockLedger, InMemoryStockLedger, StockLedger};
use orders::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
use saga::{
    CompensationHandler, ExpiryConsumer, LocalDelayQueue, OrderCoordinator, Reconciler,
    SagaConfig,
};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    // 1. Configuration, tracing and the Prometheus recorder
    let config = Config::from_env();
    server::init_tracing(&config);
    let metrics_handle = server::install_metrics().expect("failed to install Prometheus recorder");
    let saga_config = SagaConfig::from_env();

    // 2. Order store
    let orders: Arc<dyn OrderStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to Postgres");
            let store = PostgresOrderStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run order migrations");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orders are kept in memory");
            Arc::new(InMemoryOrderStore::new())
        }
    };

    // 3. Stock ledger of the product service
    let ledger: Arc<dyn StockLedger> = match &config.product_service_url {
        Some(url) => {
            let mut client = HttpStockLedger::new(url.as_str(), saga_config.remote_timeout)
                .expect("failed to build product service client");
            if let Some(key) = &config.api_key {
                client = client.with_api_key(key.as_str());
            }
            Arc::new(client)
        }
        None => {
            tracing::warn!("PRODUCT_SERVICE_URL not set, using an in-process stock ledger");
            Arc::new(InMemoryStockLedger::new())
        }
    };

    // 4. Saga: coordinator, expiry consumers and the reconciliation sweep
    let queue = LocalDelayQueue::new(saga_config.expiry_topic.as_str());
    let coordinator = Arc::new(OrderCoordinator::new(
        orders.clone(),
        ledger.clone(),
        queue.clone(),
        saga_config.clone(),
    ));
    let handler = Arc::new(CompensationHandler::new(
        orders,
        ledger,
        queue.clone(),
        &saga_config,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers =
        ExpiryConsumer::new(handler.clone(), queue.clone(), &saga_config).spawn(shutdown_rx.clone());
    workers.push(Reconciler::new(handler, &saga_config).spawn(shutdown_rx));

    // 5. Serve until a shutdown signal arrives
    let app = api::create_order_app(Arc::new(OrderAppState { coordinator }), metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, topic = %queue.topic(), "starting order service");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(server::shutdown_signal())
        .await
        .expect("server error");

    // 6. Stop the background workers
    queue.close();
    let _ = shutdown_tx.send(true);
    for worker in workers {
        if let Err(err) = worker.await {
            tracing::error!(error = %err, "background worker panicked");
        }
    }

    tracing::info!("order service shut down gracefully");
}
