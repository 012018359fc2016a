//! Ledger fake for partial failures of a remote stock ledger.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{OrderId, ProductId};
use ledger::{
    HoldItem, HoldStockAudit, InMemoryStockLedger, LedgerError, Product, Settlement, StockLedger,
};

/// Wraps an in-memory ledger the way a remote one behaves when replies go
/// missing.
///
/// With a hold delay set, the hold runs on its own task and still lands after
/// the caller gave up waiting. With `lose_commit_reply`, commits are applied
/// and then reported as failed. Orders passed to `fail_release_for` cannot
/// be released at all.
#[derive(Clone, Default)]
pub(crate) struct UnreliableLedger {
    inner: InMemoryStockLedger,
    hold_delay_ms: Arc<AtomicU64>,
    lose_commit_reply: Arc<AtomicBool>,
    failing_releases: Arc<Mutex<HashSet<OrderId>>>,
}

impl UnreliableLedger {
    pub(crate) fn new(inner: InMemoryStockLedger) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub(crate) fn set_hold_delay(&self, delay: Duration) {
        self.hold_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub(crate) fn set_lose_commit_reply(&self, lose: bool) {
        self.lose_commit_reply.store(lose, Ordering::SeqCst);
    }

    pub(crate) fn fail_release_for(&self, order_id: OrderId) {
        self.failing_releases.lock().unwrap().insert(order_id);
    }
}

#[async_trait]
impl StockLedger for UnreliableLedger {
    async fn fetch_by_ids(&self, ids: &[ProductId]) -> ledger::Result<Vec<Product>> {
        self.inner.fetch_by_ids(ids).await
    }

    async fn hold_bulk(
        &self,
        order_id: OrderId,
        items: &[HoldItem],
    ) -> ledger::Result<Vec<HoldStockAudit>> {
        let delay = Duration::from_millis(self.hold_delay_ms.load(Ordering::SeqCst));
        let inner = self.inner.clone();
        let items = items.to_vec();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.hold_bulk(order_id, &items).await
        })
        .await
        .map_err(|e| LedgerError::Remote(e.to_string()))?
    }

    async fn release_bulk(&self, order_id: OrderId) -> ledger::Result<Settlement> {
        if self.failing_releases.lock().unwrap().contains(&order_id) {
            return Err(LedgerError::Remote("release rejected".to_string()));
        }
        self.inner.release_bulk(order_id).await
    }

    async fn commit_bulk(&self, order_id: OrderId) -> ledger::Result<Settlement> {
        let settlement = self.inner.commit_bulk(order_id).await?;
        if self.lose_commit_reply.load(Ordering::SeqCst) {
            return Err(LedgerError::Remote("response lost".to_string()));
        }
        Ok(settlement)
    }

    async fn audits_for_order(&self, order_id: OrderId) -> ledger::Result<Vec<HoldStockAudit>> {
        self.inner.audits_for_order(order_id).await
    }
}
