//! MoySklad remap API client
//!
//! Every request passes the sliding-window limiter before it is sent, inside
//! the retry loop, so re-attempts are throttled the same as first attempts.

use crate::config::MoyskladConfig;
use crate::moysklad::models::{ListResponse, MsStore, StockRow};
use msync_common::{Result, SyncError};
use msync_core::rate_limit::{RateLimiter, RequestClass};
use msync_core::transport::{self, RetryPolicy};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub struct MoyskladClient {
    http: Client,
    base_url: String,
    policy: RetryPolicy,
    limiter: Arc<Mutex<RateLimiter>>,
}

impl MoyskladClient {
    pub fn new(config: &MoyskladConfig) -> Result<Self> {
        let token = config.require_token()?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| SyncError::Config("MS_TOKEN contains invalid characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json;charset=utf-8"),
        );

        let http = Client::builder()
            .timeout(config.request_timeout())
            .gzip(true)
            .default_headers(headers)
            .build()
            .map_err(|err| SyncError::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            policy: config.retry_policy(),
            limiter: Arc::new(Mutex::new(RateLimiter::new(config.rate_limits()))),
        })
    }

    /// One warehouse listing page (normal request class).
    pub async fn fetch_stores_page(
        &self,
        offset: u64,
        limit: usize,
    ) -> Result<ListResponse<MsStore>> {
        let url = format!("{}/entity/store", self.base_url);
        debug!(offset, "requesting stores");

        transport::execute(&self.policy, || async {
            self.limiter.lock().await.acquire(RequestClass::Normal).await;
            let response = self
                .http
                .get(&url)
                .query(&[
                    ("limit", limit.to_string()),
                    ("offset", offset.to_string()),
                    ("fields", "id,name,code,externalCode,address".to_string()),
                ])
                .send()
                .await
                .map_err(transport::network)?;
            transport::read_json(response).await
        })
        .await
    }

    /// One stock-by-store report page (heavy request class).
    pub async fn fetch_stock_page(
        &self,
        offset: u64,
        limit: usize,
    ) -> Result<ListResponse<StockRow>> {
        let url = format!("{}/report/stock/byStore", self.base_url);
        debug!(offset, "requesting stock report");

        transport::execute(&self.policy, || async {
            self.limiter.lock().await.acquire(RequestClass::Heavy).await;
            let response = self
                .http
                .get(&url)
                .query(&[
                    ("limit", limit.to_string()),
                    ("offset", offset.to_string()),
                    ("stockMode", "byStore".to_string()),
                ])
                .send()
                .await
                .map_err(transport::network)?;
            transport::read_json(response).await
        })
        .await
    }
}
