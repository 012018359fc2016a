//! Process setup shared by both service binaries.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Config;

/// Installs the global tracing subscriber. `RUST_LOG` wins over the
/// configured level when both are set.
pub fn init_tracing(config: &Config) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Installs the Prometheus recorder and returns the handle `/metrics` renders.
pub fn install_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    metrics::describe_counter!("orders_created_total", "Orders placed with stock held");
    metrics::describe_counter!(
        "orders_rejected_total",
        "Order placements rejected, labelled by reason"
    );
    metrics::describe_histogram!(
        "order_create_duration_seconds",
        metrics::Unit::Seconds,
        "Time spent placing an order"
    );
    metrics::describe_counter!("stock_holds_total", "Successful stock holds");
    metrics::describe_counter!(
        "stock_hold_conflicts_total",
        "Stock holds rejected for insufficient stock"
    );
    metrics::describe_counter!("stock_releases_total", "Holds released back to stock");
    metrics::describe_counter!("orders_confirmed_total", "Orders confirmed");
    metrics::describe_counter!("orders_expired_total", "Orders expired by compensation");
    metrics::describe_counter!(
        "expiry_deferred_total",
        "Expiry notifications that arrived early and were rescheduled"
    );
    metrics::describe_counter!(
        "expiry_redeliveries_total",
        "Expiry notifications delivered more than once"
    );
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}
