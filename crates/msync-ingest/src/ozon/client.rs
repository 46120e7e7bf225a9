//! Ozon seller API client

use crate::config::OzonConfig;
use crate::ozon::models::{
    Posting, PostingsResponse, ProductItem, ProductListResponse,
};
use chrono::{DateTime, Utc};
use msync_common::{Result, SyncError};
use msync_core::transport::{self, RetryPolicy};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use serde_json::json;
use tracing::debug;

/// Date format the posting filters expect.
fn format_filter_date(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub struct OzonClient {
    http: Client,
    base_url: String,
    policy: RetryPolicy,
}

/// One FBO page: postings plus the reported total.
pub struct FboPage {
    pub postings: Vec<Posting>,
    pub total: Option<u64>,
}

/// One FBS page: postings plus the explicit more-data flag.
pub struct FbsPage {
    pub postings: Vec<Posting>,
    pub has_next: bool,
}

/// One product-list page: items plus the continuation token.
pub struct ProductPage {
    pub items: Vec<ProductItem>,
    pub last_id: Option<String>,
}

impl OzonClient {
    pub fn new(config: &OzonConfig) -> Result<Self> {
        let (client_id, api_key) = config.require_credentials()?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "Client-Id",
            HeaderValue::from_str(client_id)
                .map_err(|_| SyncError::Config("OZON_CLIENT_ID contains invalid characters".into()))?,
        );
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|_| SyncError::Config("OZON_API_KEY contains invalid characters".into()))?;
        key.set_sensitive(true);
        headers.insert("Api-Key", key);

        let http = Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()
            .map_err(|err| SyncError::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            policy: config.retry_policy(),
        })
    }

    /// One FBO posting page by offset.
    pub async fn fetch_fbo_page(
        &self,
        since: DateTime<Utc>,
        to: DateTime<Utc>,
        offset: u64,
        limit: usize,
    ) -> Result<FboPage> {
        let url = format!("{}/v2/posting/fbo/list", self.base_url);
        let body = json!({
            "dir": "ASC",
            "filter": {
                "since": format_filter_date(since),
                "to": format_filter_date(to),
            },
            "limit": limit,
            "offset": offset,
            "with": { "analytics_data": true, "financial_data": true },
        });
        debug!(offset, "requesting FBO postings");

        let response: PostingsResponse = transport::execute(&self.policy, || async {
            let response = self
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(transport::network)?;
            transport::read_json(response).await
        })
        .await?;

        let result = response
            .result
            .ok_or_else(|| SyncError::Decode("posting response carries no result".into()))?;

        Ok(FboPage {
            postings: result.postings,
            total: result.total,
        })
    }

    /// One FBS posting page by continuation token.
    pub async fn fetch_fbs_page(
        &self,
        since: DateTime<Utc>,
        to: DateTime<Utc>,
        last_id: Option<&str>,
        limit: usize,
    ) -> Result<FbsPage> {
        let url = format!("{}/v3/posting/fbs/list", self.base_url);
        let body = json!({
            "dir": "ASC",
            "filter": {
                "since": format_filter_date(since),
                "to": format_filter_date(to),
            },
            "limit": limit,
            "last_id": last_id,
            "with": { "analytics_data": true, "financial_data": true },
        });
        debug!(last_id = last_id.unwrap_or("-"), "requesting FBS postings");

        let response: PostingsResponse = transport::execute(&self.policy, || async {
            let response = self
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(transport::network)?;
            transport::read_json(response).await
        })
        .await?;

        let result = response
            .result
            .ok_or_else(|| SyncError::Decode("posting response carries no result".into()))?;

        Ok(FbsPage {
            has_next: result.has_next.unwrap_or(false),
            postings: result.postings,
        })
    }

    /// One product-list page by continuation token.
    pub async fn fetch_products_page(
        &self,
        last_id: Option<&str>,
        limit: usize,
    ) -> Result<ProductPage> {
        let url = format!("{}/v3/product/list", self.base_url);
        let body = json!({
            "filter": { "visibility": "ALL" },
            "limit": limit,
            "last_id": last_id.unwrap_or(""),
        });

        let response: ProductListResponse = transport::execute(&self.policy, || async {
            let response = self
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(transport::network)?;
            transport::read_json(response).await
        })
        .await?;

        let result = response
            .result
            .ok_or_else(|| SyncError::Decode("product list response carries no result".into()))?;

        Ok(ProductPage {
            items: result.items,
            last_id: result.last_id.filter(|id| !id.is_empty()),
        })
    }

    /// Connectivity probe: a one-record FBO request over the last day.
    pub async fn probe(&self) -> bool {
        let to = Utc::now();
        let since = to - chrono::Duration::days(1);
        self.fetch_fbo_page(since, to, 0, 1).await.is_ok()
    }
}
