//! Ozon product stocks sync
//!
//! Token-cursor pagination over `/v3/product/list`; more-data is signaled by
//! a non-empty `last_id` in the response.

use crate::config::AppConfig;
use crate::db;
use crate::ozon::client::OzonClient;
use crate::ozon::models::OzonStock;
use crate::ozon::storage::OzonStockStore;
use async_trait::async_trait;
use msync_common::{Result, SyncError};
use msync_core::pagination::{BatchSink, FetchedPage, PageCursor, PageDriver, PageFetcher};
use msync_core::run::{RunCounters, SyncRun};
use msync_core::upsert::{TxMode, UpsertEngine};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

struct StocksFetcher<'a> {
    client: &'a OzonClient,
    limit: usize,
}

#[async_trait]
impl PageFetcher for StocksFetcher<'_> {
    type Record = OzonStock;

    async fn fetch(&mut self, cursor: &PageCursor) -> Result<FetchedPage<OzonStock>> {
        let last_id = match cursor {
            PageCursor::Token { last_id } => last_id.as_deref(),
            other => {
                return Err(SyncError::Internal(format!(
                    "stocks feed drives a token cursor, got {other:?}"
                )))
            },
        };

        let page = self.client.fetch_products_page(last_id, self.limit).await?;
        let records: Vec<OzonStock> = page.items.iter().map(OzonStock::from_item).collect();
        let has_more = page.last_id.is_some() && !records.is_empty();

        Ok(FetchedPage {
            records,
            next: PageCursor::Token {
                last_id: page.last_id.or_else(|| last_id.map(str::to_string)),
            },
            has_more,
        })
    }
}

struct StocksSink {
    engine: UpsertEngine,
    store: OzonStockStore,
    counters: Arc<RunCounters>,
}

#[async_trait]
impl BatchSink<OzonStock> for StocksSink {
    async fn apply(&mut self, records: Vec<OzonStock>, _cursor: &PageCursor) -> Result<()> {
        self.counters.add_pages(1);

        let outcome = self.engine.upsert(&mut self.store, &records).await?;
        self.counters.add_records(outcome.success_count as i64);
        for failure in &outcome.failures {
            warn!(sku = %failure.key, error = %failure.error, "stock line rejected");
        }
        Ok(())
    }
}

/// Run one product stocks sync.
pub async fn sync_stocks(pool: PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let ozon = &config.ozon;
    let client = OzonClient::new(ozon)?;
    let driver = PageDriver::new(ozon.stocks_page_limit, ozon.pagination_delay());
    let counters = Arc::new(RunCounters::default());

    let run = SyncRun::new(pool.clone(), "ozon-stocks");
    let body_counters = counters.clone();

    run.execute(counters, async {
        db::test_connection(&pool).await?;

        let mut fetcher = StocksFetcher {
            client: &client,
            limit: ozon.stocks_page_limit,
        };
        let mut sink = StocksSink {
            engine: UpsertEngine::new(TxMode::PerRecord),
            store: OzonStockStore::new(pool.clone()),
            counters: body_counters,
        };

        let stats = driver
            .drain_all(PageCursor::Token { last_id: None }, &mut fetcher, &mut sink)
            .await?;

        info!(
            pages = stats.page_count,
            records = stats.total_records,
            "product stocks drained"
        );
        Ok(())
    })
    .await
}
