//! Hold audit log entries.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Status of a hold audit row.
///
/// ```text
/// Held ──┬──► Success
///        └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    /// Units are reserved for the order.
    Held,
    /// The order was confirmed; the reserved units are sold (terminal).
    Success,
    /// The hold was released back to sellable stock (terminal).
    Cancelled,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Held => "held",
            AuditStatus::Success => "success",
            AuditStatus::Cancelled => "cancelled",
        }
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AuditStatus::Success | AuditStatus::Cancelled)
    }

    /// Returns true if a row in this state may move to `next`.
    pub fn can_transition_to(&self, next: AuditStatus) -> bool {
        matches!(self, AuditStatus::Held) && next.is_terminal()
    }
}

impl FromStr for AuditStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "held" => Ok(AuditStatus::Held),
            "success" => Ok(AuditStatus::Success),
            "cancelled" => Ok(AuditStatus::Cancelled),
            other => Err(LedgerError::CorruptRow(format!(
                "unknown audit status '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One hold decision: `quantity` units of `product_id` reserved for `order_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldStockAudit {
    pub id: i64,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub status: AuditStatus,
    pub created_at: DateTime<Utc>,
}

impl HoldStockAudit {
    pub fn is_held(&self) -> bool {
        self.status == AuditStatus::Held
    }
}
