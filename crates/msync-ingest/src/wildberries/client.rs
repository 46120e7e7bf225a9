//! Wildberries HTTP client
//!
//! One client covers the statistics, content and seller-analytics APIs; they
//! share the bearer token but differ in base URL and retry posture, so each
//! method picks its policy.

use crate::config::WbConfig;
use crate::wildberries::models::{
    CardsResponse, RemainsDownload, RemainsStatusResponse, RemainsTaskResponse, WbOrder,
    WbRemainItem,
};
use chrono::{DateTime, SecondsFormat, Utc};
use msync_common::{Result, SyncError};
use msync_core::pagination::ReportStatus;
use msync_core::transport::{self, RetryPolicy};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info};

pub struct WbClient {
    http: Client,
    stats_url: String,
    content_url: String,
    analytics_url: String,
    orders_policy: RetryPolicy,
    cards_policy: RetryPolicy,
    report_policy: RetryPolicy,
    cards_limit: usize,
}

impl WbClient {
    pub fn new(config: &WbConfig) -> Result<Self> {
        let token = config.require_token()?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(token)
            .map_err(|_| SyncError::Config("WB_API_TOKEN contains invalid characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()
            .map_err(|err| SyncError::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            stats_url: config.stats_url.clone(),
            content_url: config.content_url.clone(),
            analytics_url: config.analytics_url.clone(),
            orders_policy: config.orders_retry_policy(),
            cards_policy: config.cards_retry_policy(),
            report_policy: config.report_retry_policy(),
            cards_limit: config.cards_limit,
        })
    }

    /// Supplier orders changed since `date_from` (statistics API).
    ///
    /// `flag=0` returns everything changed from the given instant: new orders
    /// and updates to old ones alike.
    pub async fn fetch_orders(&self, date_from: DateTime<Utc>) -> Result<Vec<WbOrder>> {
        let url = format!("{}/api/v1/supplier/orders", self.stats_url);
        let date_from = date_from.to_rfc3339_opts(SecondsFormat::Millis, true);

        transport::execute(&self.orders_policy, || async {
            let response = self
                .http
                .get(&url)
                .query(&[("dateFrom", date_from.as_str()), ("flag", "0")])
                .send()
                .await
                .map_err(transport::network)?;
            transport::read_json(response).await
        })
        .await
    }

    /// One page of product cards (content API). `updated_at`/`nm_id` echo the
    /// cursor of the previous response; both absent requests the first page.
    pub async fn fetch_cards_page(
        &self,
        updated_at: Option<&str>,
        nm_id: Option<i64>,
    ) -> Result<CardsResponse> {
        let url = format!("{}/content/v2/get/cards/list", self.content_url);

        let mut cursor = json!({ "limit": self.cards_limit });
        if let (Some(updated_at), Some(nm_id)) = (updated_at, nm_id) {
            cursor["updatedAt"] = json!(updated_at);
            cursor["nmID"] = json!(nm_id);
        }
        let body = json!({
            "settings": {
                "cursor": cursor,
                "filter": { "withPhoto": -1 },
            }
        });

        transport::execute(&self.cards_policy, || async {
            let response = self
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(transport::network)?;
            transport::read_json(response).await
        })
        .await
    }

    /// Content API connectivity probe: fetch a single card.
    pub async fn probe_cards(&self) -> bool {
        self.fetch_cards_page(None, None).await.is_ok()
    }

    /// Create a warehouse-remains report task (seller-analytics API).
    pub async fn create_remains_report(&self) -> Result<String> {
        let url = format!("{}/api/v1/warehouse_remains", self.analytics_url);
        info!("creating warehouse remains report task");

        let response: RemainsTaskResponse = transport::execute(&self.report_policy, || async {
            let response = self.http.get(&url).send().await.map_err(transport::network)?;
            transport::read_json(response).await
        })
        .await?;

        response
            .data
            .and_then(|data| data.task_id)
            .ok_or_else(|| SyncError::Decode("report response carries no task id".into()))
    }

    /// Report task status. A 404 means the task handle expired server-side.
    pub async fn remains_report_status(&self, task_id: &str) -> Result<ReportStatus> {
        let url = format!(
            "{}/api/v1/warehouse_remains/tasks/{}/status",
            self.analytics_url, task_id
        );

        let response: RemainsStatusResponse = transport::execute(&self.report_policy, || async {
            let response = self.http.get(&url).send().await.map_err(transport::network)?;
            transport::read_json(response).await
        })
        .await
        .map_err(|err| expired_on_404(err, task_id))?;

        let raw = response
            .status()
            .ok_or_else(|| SyncError::Decode("status response carries no status".into()))?;
        debug!(task_id, status = raw, "report status");

        ReportStatus::parse(raw)
            .ok_or_else(|| SyncError::Decode(format!("unknown report status: {raw}")))
    }

    /// Download a finished report.
    pub async fn download_remains_report(&self, task_id: &str) -> Result<Vec<WbRemainItem>> {
        let url = format!(
            "{}/api/v1/warehouse_remains/tasks/{}/download",
            self.analytics_url, task_id
        );

        let download: RemainsDownload = transport::execute(&self.report_policy, || async {
            let response = self.http.get(&url).send().await.map_err(transport::network)?;
            transport::read_json(response).await
        })
        .await
        .map_err(|err| expired_on_404(err, task_id))?;

        Ok(download.into_items())
    }
}

fn expired_on_404(err: SyncError, task_id: &str) -> SyncError {
    match err {
        SyncError::Request { status: 404, .. } => SyncError::ReportExpired(task_id.to_string()),
        other => other,
    }
}
