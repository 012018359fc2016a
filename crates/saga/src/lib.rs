//! Order placement saga across the order and product services.
//!
//! There is no distributed transaction. Instead:
//! 1. The [`OrderCoordinator`] validates an order against authoritative
//!    product data, inserts it in an open local transaction, holds its stock
//!    in the remote ledger, and commits only if the hold succeeded.
//! 2. An expiry notification is scheduled for the order's time-to-live.
//! 3. The [`CompensationHandler`] receives the notification and, if the order
//!    is still pending and overdue, marks it expired and releases the hold.
//!
//! Confirmation and expiry of an order serialize on its row lock, so exactly
//! one of them wins.

pub mod compensation;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod reconciler;
pub mod request;
pub mod scheduler;
#[cfg(test)]
mod testing;
pub mod worker;

pub use compensation::{CompensationHandler, CompensationOutcome};
pub use config::SagaConfig;
pub use coordinator::OrderCoordinator;
pub use error::{Result, SagaError, SchedulerError};
pub use reconciler::{Reconciler, SweepReport};
pub use request::{CreateOrderRequest, CreateOrderResponse, OrderLine};
pub use scheduler::{Delivery, ExpiryNotification, ExpiryScheduler, LocalDelayQueue};
pub use worker::ExpiryConsumer;
