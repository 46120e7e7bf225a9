//! Ozon postings sync
//!
//! Two feeds over the same trailing window, one run each:
//!
//! - FBO paginates by offset against the reported total
//! - FBS paginates by a `last_id` token with an explicit `has_next` flag; the
//!   loop guard covers providers that echo an unchanged token

use crate::config::AppConfig;
use crate::db;
use crate::ozon::client::OzonClient;
use crate::ozon::models::{Posting, Scheme};
use crate::ozon::storage::OzonOrderStore;
use crate::window::SyncWindow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use msync_common::{Result, SyncError};
use msync_core::pagination::{BatchSink, FetchedPage, PageCursor, PageDriver, PageFetcher};
use msync_core::run::{RunCounters, SyncRun};
use msync_core::upsert::{TxMode, UpsertEngine};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

struct FboFetcher<'a> {
    client: &'a OzonClient,
    since: DateTime<Utc>,
    to: DateTime<Utc>,
    limit: usize,
}

#[async_trait]
impl PageFetcher for FboFetcher<'_> {
    type Record = Posting;

    async fn fetch(&mut self, cursor: &PageCursor) -> Result<FetchedPage<Posting>> {
        let offset = match cursor {
            PageCursor::Offset { offset, .. } => *offset,
            other => {
                return Err(SyncError::Internal(format!(
                    "FBO feed drives an offset cursor, got {other:?}"
                )))
            },
        };

        let page = self
            .client
            .fetch_fbo_page(self.since, self.to, offset, self.limit)
            .await?;
        let returned = page.postings.len() as u64;

        Ok(FetchedPage {
            records: page.postings,
            next: PageCursor::Offset {
                offset: offset + returned,
                total: page.total,
            },
            has_more: false,
        })
    }
}

struct FbsFetcher<'a> {
    client: &'a OzonClient,
    since: DateTime<Utc>,
    to: DateTime<Utc>,
    limit: usize,
}

#[async_trait]
impl PageFetcher for FbsFetcher<'_> {
    type Record = Posting;

    async fn fetch(&mut self, cursor: &PageCursor) -> Result<FetchedPage<Posting>> {
        let last_id = match cursor {
            PageCursor::Token { last_id } => last_id.as_deref(),
            other => {
                return Err(SyncError::Internal(format!(
                    "FBS feed drives a token cursor, got {other:?}"
                )))
            },
        };

        let page = self
            .client
            .fetch_fbs_page(self.since, self.to, last_id, self.limit)
            .await?;

        // The next token is the last posting number; an empty page keeps the
        // previous token and the driver ends the feed.
        let next_token = page
            .postings
            .last()
            .map(|posting| posting.posting_number.clone())
            .or_else(|| last_id.map(str::to_string));

        Ok(FetchedPage {
            has_more: page.has_next && !page.postings.is_empty(),
            records: page.postings,
            next: PageCursor::Token { last_id: next_token },
        })
    }
}

struct PostingsSink {
    engine: UpsertEngine,
    store: OzonOrderStore,
    scheme: Scheme,
    counters: Arc<RunCounters>,
}

#[async_trait]
impl BatchSink<Posting> for PostingsSink {
    async fn apply(&mut self, records: Vec<Posting>, _cursor: &PageCursor) -> Result<()> {
        self.counters.add_pages(1);

        let outcome = self.engine.upsert(&mut self.store, &records).await?;
        self.counters.add_records(outcome.success_count as i64);
        for failure in &outcome.failures {
            warn!(
                scheme = self.scheme.as_str(),
                posting_number = %failure.key,
                error = %failure.error,
                "posting rejected"
            );
        }
        Ok(())
    }
}

async fn sync_scheme(
    pool: &PgPool,
    client: &OzonClient,
    config: &AppConfig,
    window: SyncWindow,
    scheme: Scheme,
) -> anyhow::Result<()> {
    let ozon = &config.ozon;
    let driver = PageDriver::new(ozon.page_limit, ozon.pagination_delay());
    let counters = Arc::new(RunCounters::default());

    let run = SyncRun::new(pool.clone(), "ozon-orders")
        .with_window(window.date_from, window.date_to)
        .with_scheme(scheme.as_str());
    let body_counters = counters.clone();

    run.execute(counters, async {
        let mut sink = PostingsSink {
            engine: UpsertEngine::new(TxMode::PerRecord),
            store: OzonOrderStore::new(pool.clone(), scheme),
            scheme,
            counters: body_counters,
        };

        let stats = match scheme {
            Scheme::Fbo => {
                let mut fetcher = FboFetcher {
                    client,
                    since: window.date_from,
                    to: window.date_to,
                    limit: ozon.page_limit,
                };
                driver
                    .drain_all(
                        PageCursor::Offset {
                            offset: 0,
                            total: None,
                        },
                        &mut fetcher,
                        &mut sink,
                    )
                    .await?
            },
            Scheme::Fbs => {
                let mut fetcher = FbsFetcher {
                    client,
                    since: window.date_from,
                    to: window.date_to,
                    limit: ozon.page_limit,
                };
                driver
                    .drain_all(PageCursor::Token { last_id: None }, &mut fetcher, &mut sink)
                    .await?
            },
        };

        info!(
            scheme = scheme.as_str(),
            pages = stats.page_count,
            records = stats.total_records,
            "posting feed drained"
        );
        Ok(())
    })
    .await
}

/// Run the FBO and FBS posting syncs over the trailing window.
pub async fn sync_orders(pool: PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let window = SyncWindow::trailing_days_utc(config.ozon.window_days);
    info!(
        from = %window.date_from,
        to = %window.date_to,
        "starting Ozon postings sync"
    );

    let client = OzonClient::new(&config.ozon)?;
    db::test_connection(&pool).await?;
    if !client.probe().await {
        anyhow::bail!("Ozon API probe request failed");
    }

    sync_scheme(&pool, &client, config, window, Scheme::Fbo).await?;
    sync_scheme(&pool, &client, config, window, Scheme::Fbs).await?;

    Ok(())
}
