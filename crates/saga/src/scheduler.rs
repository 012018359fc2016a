//! Delayed expiry notifications.
//!
//! [`ExpiryScheduler`] is the publishing side: it asks for a notification
//! about an order to be delivered after a delay. Delivery is at least once,
//! unordered, and may be late. [`LocalDelayQueue`] implements both sides for
//! a single node on top of tokio timers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::OrderId;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use crate::error::SchedulerError;

/// Payload of an expiry notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryNotification {
    pub message_id: Uuid,
    pub order_id: OrderId,
    /// Delivery attempt, starting at 1.
    pub attempt: u32,
}

impl ExpiryNotification {
    pub fn new(order_id: OrderId) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            order_id,
            attempt: 1,
        }
    }
}

/// Publishes delayed expiry notifications.
#[async_trait]
pub trait ExpiryScheduler: Send + Sync {
    /// Requests a notification about `order_id` no earlier than `delay` from now.
    async fn schedule(&self, order_id: OrderId, delay: Duration) -> Result<(), SchedulerError>;
}

struct QueueState {
    topic: String,
    ready_tx: mpsc::UnboundedSender<ExpiryNotification>,
    ready_rx: Mutex<mpsc::UnboundedReceiver<ExpiryNotification>>,
    closed: AtomicBool,
    fail_publish: AtomicBool,
    published: AtomicU64,
    acked: AtomicU64,
    requeued: AtomicU64,
}

/// Single-node delay queue backed by tokio timers.
///
/// Every scheduled notification sleeps on its own timer task and then
/// becomes ready for [`LocalDelayQueue::recv`]. A [`Delivery`] that is
/// nacked or dropped without an ack goes back on the queue.
#[derive(Clone)]
pub struct LocalDelayQueue {
    state: Arc<QueueState>,
}

impl LocalDelayQueue {
    /// Creates a queue for the given topic.
    pub fn new(topic: impl Into<String>) -> Self {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(QueueState {
                topic: topic.into(),
                ready_tx,
                ready_rx: Mutex::new(ready_rx),
                closed: AtomicBool::new(false),
                fail_publish: AtomicBool::new(false),
                published: AtomicU64::new(0),
                acked: AtomicU64::new(0),
                requeued: AtomicU64::new(0),
            }),
        }
    }

    pub fn topic(&self) -> &str {
        &self.state.topic
    }

    /// Stops accepting new notifications. Timers already running still fire.
    pub fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }

    /// Makes every subsequent publish fail.
    pub fn set_fail_publish(&self, fail: bool) {
        self.state.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Number of notifications accepted by [`ExpiryScheduler::schedule`].
    pub fn published_count(&self) -> u64 {
        self.state.published.load(Ordering::SeqCst)
    }

    /// Number of deliveries acknowledged.
    pub fn acked_count(&self) -> u64 {
        self.state.acked.load(Ordering::SeqCst)
    }

    /// Number of deliveries put back for redelivery.
    pub fn requeued_count(&self) -> u64 {
        self.state.requeued.load(Ordering::SeqCst)
    }

    /// Waits for the next ready notification.
    ///
    /// Returns `None` only if the queue's channel is gone, which cannot happen
    /// while the queue is alive.
    pub async fn recv(&self) -> Option<Delivery> {
        let notification = self.state.ready_rx.lock().await.recv().await?;
        Some(Delivery {
            notification,
            queue: self.clone(),
            settled: false,
        })
    }

    fn enqueue_after(&self, notification: ExpiryNotification, delay: Duration) {
        let tx = self.state.ready_tx.clone();
        if delay.is_zero() {
            let _ = tx.send(notification);
            return;
        }
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(notification);
        });
    }

    fn requeue(&self, mut notification: ExpiryNotification, delay: Duration) {
        notification.attempt = notification.attempt.saturating_add(1);
        self.state.requeued.fetch_add(1, Ordering::SeqCst);
        self.enqueue_after(notification, delay);
    }
}

#[async_trait]
impl ExpiryScheduler for LocalDelayQueue {
    async fn schedule(&self, order_id: OrderId, delay: Duration) -> Result<(), SchedulerError> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(SchedulerError::Closed);
        }
        if self.state.fail_publish.load(Ordering::SeqCst) {
            return Err(SchedulerError::Publish(format!(
                "topic {} rejected the message",
                self.state.topic
            )));
        }

        let notification = ExpiryNotification::new(order_id);
        tracing::debug!(
            topic = %self.state.topic,
            %order_id,
            message_id = %notification.message_id,
            delay_ms = delay.as_millis() as u64,
            "expiry scheduled"
        );
        self.enqueue_after(notification, delay);
        self.state.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A notification handed to one consumer.
///
/// Must be settled with [`Delivery::ack`] or [`Delivery::nack`]; dropping it
/// unsettled redelivers it immediately.
pub struct Delivery {
    notification: ExpiryNotification,
    queue: LocalDelayQueue,
    settled: bool,
}

impl Delivery {
    pub fn notification(&self) -> &ExpiryNotification {
        &self.notification
    }

    pub fn order_id(&self) -> OrderId {
        self.notification.order_id
    }

    /// Marks the notification as handled.
    pub fn ack(mut self) {
        self.settled = true;
        self.queue.state.acked.fetch_add(1, Ordering::SeqCst);
    }

    /// Puts the notification back for redelivery after `backoff`.
    pub fn nack(mut self, backoff: Duration) {
        self.settled = true;
        self.queue.requeue(self.notification, backoff);
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if !self.settled {
            self.queue.requeue(self.notification, Duration::ZERO);
        }
    }
}
