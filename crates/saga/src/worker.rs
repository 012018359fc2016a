//! Expiry consumers: pull deliveries off the delay queue and run them
//! through the compensation handler.

use std::sync::Arc;
use std::time::Duration;

use ledger::StockLedger;
use orders::OrderStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::compensation::CompensationHandler;
use crate::config::SagaConfig;
use crate::scheduler::{Delivery, ExpiryScheduler, LocalDelayQueue};

/// A pool of consumers on one delay queue.
///
/// A delivery is acked once the handler commits, and nacked for redelivery
/// after the retry back-off otherwise.
pub struct ExpiryConsumer<O, L, S>
where
    O: OrderStore,
    L: StockLedger,
    S: ExpiryScheduler,
{
    handler: Arc<CompensationHandler<O, L, S>>,
    queue: LocalDelayQueue,
    channel: String,
    workers: usize,
    retry_backoff: Duration,
}

impl<O, L, S> ExpiryConsumer<O, L, S>
where
    O: OrderStore + 'static,
    L: StockLedger + 'static,
    S: ExpiryScheduler + 'static,
{
    pub fn new(
        handler: Arc<CompensationHandler<O, L, S>>,
        queue: LocalDelayQueue,
        config: &SagaConfig,
    ) -> Self {
        Self {
            handler,
            queue,
            channel: config.expiry_channel.clone(),
            workers: config.expiry_workers.max(1),
            retry_backoff: config.retry_backoff,
        }
    }

    /// Starts the workers. They stop once `shutdown` turns true or its
    /// sender is dropped.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let consumer = Arc::new(self);
        (0..consumer.workers)
            .map(|worker| {
                let consumer = consumer.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { consumer.run(worker, shutdown).await })
            })
            .collect()
    }

    async fn run(&self, worker: usize, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            worker,
            topic = %self.queue.topic(),
            channel = %self.channel,
            "expiry consumer started"
        );

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
                delivery = self.queue.recv() => {
                    let Some(delivery) = delivery else {
                        break;
                    };
                    self.process(worker, delivery).await;
                }
            }
        }

        tracing::info!(worker, "expiry consumer stopped");
    }

    async fn process(&self, worker: usize, delivery: Delivery) {
        let notification = *delivery.notification();
        if notification.attempt > 1 {
            metrics::counter!("expiry_redeliveries_total").increment(1);
        }

        match self.handler.handle(notification.order_id).await {
            Ok(outcome) => {
                tracing::debug!(
                    worker,
                    order_id = %notification.order_id,
                    message_id = %notification.message_id,
                    ?outcome,
                    "expiry notification handled"
                );
                delivery.ack();
            }
            Err(err) => {
                tracing::warn!(
                    worker,
                    order_id = %notification.order_id,
                    message_id = %notification.message_id,
                    attempt = notification.attempt,
                    error = %err,
                    "compensation failed, requeueing"
                );
                delivery.nack(self.retry_backoff);
            }
        }
    }
}
