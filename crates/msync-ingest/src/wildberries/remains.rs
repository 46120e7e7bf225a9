//! Warehouse remains sync (seller-analytics report API)
//!
//! Task-based feed: create a report task, poll its status until `done`,
//! download the result, flatten it to one row per product/size/warehouse and
//! upsert. Not paginated.

use crate::config::AppConfig;
use crate::db;
use crate::wildberries::client::WbClient;
use crate::wildberries::models::{normalize_remains, WbRemainItem};
use crate::wildberries::storage::WbRemainStore;
use async_trait::async_trait;
use msync_common::Result;
use msync_core::pagination::{fetch_report, ReportStatus, ReportTask};
use msync_core::run::{RunCounters, SyncRun};
use msync_core::upsert::{TxMode, UpsertEngine};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

struct RemainsReportTask<'a> {
    client: &'a WbClient,
}

#[async_trait]
impl ReportTask for RemainsReportTask<'_> {
    type Record = WbRemainItem;

    async fn create(&mut self) -> Result<String> {
        self.client.create_remains_report().await
    }

    async fn status(&mut self, task_id: &str) -> Result<ReportStatus> {
        self.client.remains_report_status(task_id).await
    }

    async fn download(&mut self, task_id: &str) -> Result<Vec<WbRemainItem>> {
        self.client.download_remains_report(task_id).await
    }
}

/// Run one warehouse-remains sync.
pub async fn sync_remains(pool: PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let wb = &config.wildberries;
    let client = WbClient::new(wb)?;
    let poll_config = wb.report_poll_config();
    let counters = Arc::new(RunCounters::default());

    let run = SyncRun::new(pool.clone(), "wb-remains");
    let body_counters = counters.clone();

    run.execute(counters, async {
        db::test_connection(&pool).await?;

        let mut task = RemainsReportTask { client: &client };
        let items = fetch_report(&mut task, &poll_config).await?;
        body_counters.add_pages(1);
        info!(items = items.len(), "report downloaded");

        let remains = normalize_remains(items);
        info!(rows = remains.len(), "report flattened per warehouse");

        let engine = UpsertEngine::new(TxMode::WholeBatch);
        let mut store = WbRemainStore::new(pool.clone());
        let outcome = engine.upsert(&mut store, &remains).await?;
        body_counters.add_records(outcome.success_count as i64);

        info!(saved = outcome.success_count, "remains persisted");
        Ok(())
    })
    .await
}
