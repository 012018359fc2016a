//! Stock ledger for the product service.
//!
//! The ledger owns the per-product `stock` / `on_hold_stock` counters and the
//! hold audit log. Orders reserve inventory through [`StockLedger::hold_bulk`]
//! and give it back through [`StockLedger::release_bulk`]; both lock every
//! touched product row in ascending id order before mutating counters.

pub mod audit;
pub mod client;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod product;
pub mod store;
pub mod wire;

pub use audit::{AuditStatus, HoldStockAudit};
pub use client::HttpStockLedger;
pub use error::{LedgerError, Result};
pub use memory::InMemoryStockLedger;
pub use postgres::PostgresStockLedger;
pub use product::{NewProduct, Product, ProductStatus};
pub use store::{HoldItem, ProductCatalog, Settlement, StockLedger, normalize_hold_items};
