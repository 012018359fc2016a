//! Order store for the order service.
//!
//! Orders are written through [`OrderTx`] transactions. A transaction can
//! lock an order row with [`OrderTx::lock_order`]; the lock is held until the
//! transaction commits or rolls back, which is what serializes confirmation
//! and expiry of the same order.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod status;
pub mod store;

pub use error::{OrderStoreError, Result};
pub use memory::InMemoryOrderStore;
pub use model::{NewOrder, NewOrderItem, Order, OrderItem};
pub use postgres::PostgresOrderStore;
pub use status::OrderStatus;
pub use store::{OrderStore, OrderTx, finish};
