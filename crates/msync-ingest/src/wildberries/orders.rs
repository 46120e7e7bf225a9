//! Supplier orders sync (statistics API)
//!
//! Composite-cursor pagination: every page covers changes since `dateFrom`,
//! the next page starts 1ms after the last record's `lastChangeDate`, and a
//! page below the 80k cap ends the feed. The API allows one request per
//! minute, so pages are paced a little above that.
//!
//! The API only accepts `dateFrom`; the upper window bound is enforced
//! client-side before persisting.

use crate::config::AppConfig;
use crate::db;
use crate::wildberries::client::WbClient;
use crate::wildberries::models::WbOrder;
use crate::wildberries::storage::WbOrderStore;
use crate::window::SyncWindow;
use async_trait::async_trait;
use msync_common::{Result, SyncError};
use msync_core::pagination::{BatchSink, FetchedPage, PageCursor, PageDriver, PageFetcher};
use msync_core::run::{RunCounters, SyncRun};
use msync_core::upsert::{TxMode, UpsertEngine};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, info};

struct OrdersFetcher<'a> {
    client: &'a WbClient,
    page_limit: usize,
}

#[async_trait]
impl PageFetcher for OrdersFetcher<'_> {
    type Record = WbOrder;

    async fn fetch(&mut self, cursor: &PageCursor) -> Result<FetchedPage<WbOrder>> {
        let date_from = match cursor {
            PageCursor::Composite { date_from, .. } => *date_from,
            other => {
                return Err(SyncError::Internal(format!(
                    "orders feed drives a composite cursor, got {other:?}"
                )))
            },
        };

        let orders = self.client.fetch_orders(date_from).await?;
        let has_more = orders.len() >= self.page_limit;
        let next = match orders.last() {
            Some(last) => PageCursor::Composite {
                date_from: last.last_change_date + chrono::Duration::milliseconds(1),
                last_id: None,
            },
            None => cursor.clone(),
        };

        Ok(FetchedPage {
            records: orders,
            next,
            has_more,
        })
    }
}

struct OrdersSink {
    engine: UpsertEngine,
    store: WbOrderStore,
    window: SyncWindow,
    counters: Arc<RunCounters>,
}

#[async_trait]
impl BatchSink<WbOrder> for OrdersSink {
    async fn apply(&mut self, records: Vec<WbOrder>, _cursor: &PageCursor) -> Result<()> {
        self.counters.add_pages(1);

        let received = records.len();
        let filtered: Vec<WbOrder> = records
            .into_iter()
            .filter(|order| self.window.contains(order.date))
            .collect();
        debug!(received, in_window = filtered.len(), "order page filtered to window");

        if filtered.is_empty() {
            return Ok(());
        }

        let outcome = self.engine.upsert(&mut self.store, &filtered).await?;
        self.counters.add_records(outcome.success_count as i64);
        Ok(())
    }
}

/// Run one supplier-orders sync over the trailing window.
pub async fn sync_orders(pool: PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let wb = &config.wildberries;
    let window = SyncWindow::trailing_days(wb.window_days);
    info!(
        from = %window.date_from,
        to = %window.date_to,
        "starting supplier orders sync"
    );

    let client = WbClient::new(wb)?;
    let driver = PageDriver::new(wb.page_limit, wb.pagination_delay());
    let counters = Arc::new(RunCounters::default());

    let run = SyncRun::new(pool.clone(), "wb-orders").with_window(window.date_from, window.date_to);
    let body_counters = counters.clone();

    run.execute(counters, async {
        db::test_connection(&pool).await?;

        let mut fetcher = OrdersFetcher {
            client: &client,
            page_limit: wb.page_limit,
        };
        let mut sink = OrdersSink {
            engine: UpsertEngine::new(TxMode::WholeBatch),
            store: WbOrderStore::new(pool.clone()),
            window,
            counters: body_counters,
        };

        let stats = driver
            .drain_all(
                PageCursor::Composite {
                    date_from: window.date_from,
                    last_id: None,
                },
                &mut fetcher,
                &mut sink,
            )
            .await?;

        info!(
            pages = stats.page_count,
            records = stats.total_records,
            "orders feed drained"
        );
        Ok(())
    })
    .await
}
