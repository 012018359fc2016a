//! HTTP client for a stock ledger hosted by the product service.

use std::time::Duration;

use async_trait::async_trait;
use common::{OrderId, ProductId};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::wire::{
    ErrorBody, HoldStockRequest, HoldStockResponse, ProductListResponse, SettleStockRequest,
};
use crate::{HoldItem, HoldStockAudit, LedgerError, Product, Result, Settlement, StockLedger};

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Stock ledger reached over HTTP.
///
/// Every request is bounded by the configured timeout. Rejections the product
/// service describes with an error code come back as the matching
/// [`LedgerError`]; anything else is a [`LedgerError::Remote`] or
/// [`LedgerError::Http`].
#[derive(Debug, Clone)]
pub struct HttpStockLedger {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl HttpStockLedger {
    /// Creates a client for the product service at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            http,
        })
    }

    /// Sends `key` in the service-to-service API key header.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = self.authorize(self.http.post(self.url(path)).json(body));
        Self::decode(request.send().await?).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.authorize(self.http.get(self.url(path)));
        Self::decode(request.send().await?).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let text = response.text().await?;
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => Err(body.into_error()),
            Err(_) => Err(LedgerError::Remote(format!(
                "product service returned status {status}: {text}"
            ))),
        }
    }
}

#[async_trait]
impl StockLedger for HttpStockLedger {
    async fn fetch_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let response: ProductListResponse = self.get(&format!("/products?ids={joined}")).await?;
        Ok(response.products)
    }

    async fn hold_bulk(
        &self,
        order_id: OrderId,
        items: &[HoldItem],
    ) -> Result<Vec<HoldStockAudit>> {
        let body = HoldStockRequest {
            order_id,
            items: items.to_vec(),
        };
        let response: HoldStockResponse = self.post("/products/hold-stock", &body).await?;
        Ok(response.audits)
    }

    async fn release_bulk(&self, order_id: OrderId) -> Result<Settlement> {
        self.post("/products/release-stock", &SettleStockRequest { order_id })
            .await
    }

    async fn commit_bulk(&self, order_id: OrderId) -> Result<Settlement> {
        self.post("/products/commit-stock", &SettleStockRequest { order_id })
            .await
    }

    async fn audits_for_order(&self, order_id: OrderId) -> Result<Vec<HoldStockAudit>> {
        self.get(&format!("/holds/{order_id}")).await
    }
}
