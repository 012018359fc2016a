//! Shared identifiers and value types used by the order and product services.

mod ids;
mod money;

pub use ids::{OrderId, ProductId, ShopId, UserId};
pub use money::Money;
