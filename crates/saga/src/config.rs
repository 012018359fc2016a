//! Saga configuration loaded from environment variables.

use std::time::Duration;

/// Settings shared by the coordinator, the compensation handler and the
/// expiry consumers.
///
/// Reads from environment variables:
/// - `ORDER_EXPIRATION_MS`: how long a pending order holds stock (default: `1000`)
/// - `REMOTE_TIMEOUT_MS`: bound on every stock ledger call (default: `30000`)
/// - `EXPIRY_TOPIC`: topic expiry notifications are published on (default: `"order-expiry"`)
/// - `EXPIRY_CHANNEL`: consumer channel name (default: `"compensation"`)
/// - `EXPIRY_WORKERS`: concurrent expiry consumers (default: `2`)
/// - `RECONCILE_INTERVAL_MS`: period of the overdue order sweep (default: `60000`)
/// - `RECONCILE_BATCH`: overdue orders fetched per page of a sweep (default: `100`)
/// - `RETRY_BACKOFF_MS`: redelivery delay after a failed compensation (default: `500`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaConfig {
    pub order_ttl: Duration,
    pub remote_timeout: Duration,
    pub expiry_topic: String,
    pub expiry_channel: String,
    pub expiry_workers: usize,
    pub reconcile_interval: Duration,
    pub reconcile_batch: usize,
    pub retry_backoff: Duration,
}

fn millis_from_env(key: &str, default: u64) -> Duration {
    Duration::from_millis(
        std::env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default),
    )
}

impl SagaConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            order_ttl: millis_from_env("ORDER_EXPIRATION_MS", 1_000),
            remote_timeout: millis_from_env("REMOTE_TIMEOUT_MS", 30_000),
            expiry_topic: std::env::var("EXPIRY_TOPIC")
                .unwrap_or_else(|_| "order-expiry".to_string()),
            expiry_channel: std::env::var("EXPIRY_CHANNEL")
                .unwrap_or_else(|_| "compensation".to_string()),
            expiry_workers: std::env::var("EXPIRY_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(2),
            reconcile_interval: millis_from_env("RECONCILE_INTERVAL_MS", 60_000),
            reconcile_batch: std::env::var("RECONCILE_BATCH")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(100),
            retry_backoff: millis_from_env("RETRY_BACKOFF_MS", 500),
        }
    }

    /// Sets the order time-to-live.
    pub fn with_order_ttl(mut self, ttl: Duration) -> Self {
        self.order_ttl = ttl;
        self
    }

    /// Sets the bound on stock ledger calls.
    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            order_ttl: Duration::from_millis(1_000),
            remote_timeout: Duration::from_millis(30_000),
            expiry_topic: "order-expiry".to_string(),
            expiry_channel: "compensation".to_string(),
            expiry_workers: 2,
            reconcile_interval: Duration::from_millis(60_000),
            reconcile_batch: 100,
            retry_backoff: Duration::from_millis(500),
        }
    }
}
