//! MoySklad stock sync
//!
//! One run covers four steps: refresh the warehouse list, open a snapshot,
//! drain the stock-by-store report into per-store detail lines, then upsert
//! the per-product aggregates folded across the whole report.

use crate::config::AppConfig;
use crate::db;
use crate::moysklad::client::MoyskladClient;
use crate::moysklad::models::{
    normalize_stock_rows, MsStore, ProductTotal, StockRow,
};
use crate::moysklad::storage::{
    create_snapshot, MsStoreStore, ProductTotalStore, StockDetailStore,
};
use async_trait::async_trait;
use msync_common::{Result, SyncError};
use msync_core::pagination::{BatchSink, FetchedPage, PageCursor, PageDriver, PageFetcher};
use msync_core::run::{RunCounters, SyncRun};
use msync_core::upsert::{TxMode, UpsertEngine};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

struct StoresFetcher<'a> {
    client: &'a MoyskladClient,
    limit: usize,
}

#[async_trait]
impl PageFetcher for StoresFetcher<'_> {
    type Record = MsStore;

    async fn fetch(&mut self, cursor: &PageCursor) -> Result<FetchedPage<MsStore>> {
        let offset = match cursor {
            PageCursor::Offset { offset, .. } => *offset,
            other => {
                return Err(SyncError::Internal(format!(
                    "store feed drives an offset cursor, got {other:?}"
                )))
            },
        };

        let response = self.client.fetch_stores_page(offset, self.limit).await?;
        let returned = response.rows.len() as u64;
        let total = response.meta.and_then(|meta| meta.size);

        Ok(FetchedPage {
            records: response.rows,
            next: PageCursor::Offset {
                offset: offset + returned,
                total,
            },
            has_more: false,
        })
    }
}

struct StoresSink {
    engine: UpsertEngine,
    store: MsStoreStore,
    saved: u64,
}

#[async_trait]
impl BatchSink<MsStore> for StoresSink {
    async fn apply(&mut self, records: Vec<MsStore>, _cursor: &PageCursor) -> Result<()> {
        let outcome = self.engine.upsert(&mut self.store, &records).await?;
        self.saved += outcome.success_count as u64;
        Ok(())
    }
}

struct StockReportFetcher<'a> {
    client: &'a MoyskladClient,
    limit: usize,
}

#[async_trait]
impl PageFetcher for StockReportFetcher<'_> {
    type Record = StockRow;

    async fn fetch(&mut self, cursor: &PageCursor) -> Result<FetchedPage<StockRow>> {
        let offset = match cursor {
            PageCursor::Offset { offset, .. } => *offset,
            other => {
                return Err(SyncError::Internal(format!(
                    "stock report drives an offset cursor, got {other:?}"
                )))
            },
        };

        let response = self.client.fetch_stock_page(offset, self.limit).await?;
        let returned = response.rows.len() as u64;
        let total = response.meta.and_then(|meta| meta.size);

        Ok(FetchedPage {
            records: response.rows,
            next: PageCursor::Offset {
                offset: offset + returned,
                total,
            },
            has_more: false,
        })
    }
}

/// Persists detail lines per page and folds the running product totals.
struct StockReportSink {
    engine: UpsertEngine,
    details: StockDetailStore,
    snapshot_id: i64,
    totals: HashMap<Uuid, ProductTotal>,
    counters: Arc<RunCounters>,
}

#[async_trait]
impl BatchSink<StockRow> for StockReportSink {
    async fn apply(&mut self, records: Vec<StockRow>, _cursor: &PageCursor) -> Result<()> {
        self.counters.add_pages(1);
        self.counters.add_records(records.len() as i64);

        let details = normalize_stock_rows(&records, self.snapshot_id, &mut self.totals);
        if details.is_empty() {
            return Ok(());
        }

        let outcome = self.engine.upsert(&mut self.details, &details).await?;
        info!(
            snapshot_id = self.snapshot_id,
            details = outcome.success_count,
            "detail lines persisted"
        );
        Ok(())
    }
}

/// Run one full MoySklad stock sync.
pub async fn sync_stocks(pool: PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let ms = &config.moysklad;
    let client = MoyskladClient::new(ms)?;
    let counters = Arc::new(RunCounters::default());

    let run = SyncRun::new(pool.clone(), "moysklad-stocks");
    let body_counters = counters.clone();

    run.execute(counters, async {
        db::test_connection(&pool).await?;

        // Warehouse list first, under the normal rate class.
        let stores_driver = PageDriver::new(ms.page_limit, ms.pagination_delay());
        let mut stores_fetcher = StoresFetcher {
            client: &client,
            limit: ms.page_limit,
        };
        let mut stores_sink = StoresSink {
            engine: UpsertEngine::new(TxMode::WholeBatch),
            store: MsStoreStore::new(pool.clone()),
            saved: 0,
        };
        stores_driver
            .drain_all(
                PageCursor::Offset {
                    offset: 0,
                    total: None,
                },
                &mut stores_fetcher,
                &mut stores_sink,
            )
            .await?;
        info!(stores = stores_sink.saved, "warehouses refreshed");

        let snapshot_id = create_snapshot(&pool).await?;
        info!(snapshot_id, "snapshot opened");

        // The stock report counts against the heavy ceiling; pages are paced
        // far apart.
        let report_driver = PageDriver::new(ms.page_limit, ms.heavy_delay());
        let mut report_fetcher = StockReportFetcher {
            client: &client,
            limit: ms.page_limit,
        };
        let mut report_sink = StockReportSink {
            engine: UpsertEngine::new(TxMode::WholeBatch),
            details: StockDetailStore::new(pool.clone()),
            snapshot_id,
            totals: HashMap::new(),
            counters: body_counters,
        };
        let stats = report_driver
            .drain_all(
                PageCursor::Offset {
                    offset: 0,
                    total: None,
                },
                &mut report_fetcher,
                &mut report_sink,
            )
            .await?;
        info!(
            pages = stats.page_count,
            rows = stats.total_records,
            products = report_sink.totals.len(),
            "stock report drained"
        );

        // Aggregates fold across every page, so they go last.
        let totals: Vec<(ProductTotal, i64)> = report_sink
            .totals
            .into_values()
            .map(|total| (total, snapshot_id))
            .collect();
        let engine = UpsertEngine::new(TxMode::WholeBatch);
        let mut total_store = ProductTotalStore::new(pool.clone());
        let outcome = engine.upsert(&mut total_store, &totals).await?;
        info!(aggregates = outcome.success_count, "product totals persisted");

        Ok(())
    })
    .await
}
