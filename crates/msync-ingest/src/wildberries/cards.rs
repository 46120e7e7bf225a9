//! Product cards sync (content API)
//!
//! The content API issues a `{updatedAt, nmID}` continuation cursor with each
//! page; the next request echoes it back. Here that pair travels through the
//! driver as an opaque token (`updatedAt|nmID`), which also arms the loop
//! guard should the server ever echo an unchanged cursor while claiming more
//! data.
//!
//! This is the one checkpointed stream: the cursor is persisted after every
//! committed batch, so the next run resumes incrementally. No checkpoint
//! means a full export.

use crate::config::AppConfig;
use crate::db;
use crate::wildberries::client::WbClient;
use crate::wildberries::models::{self, WbCard};
use crate::wildberries::storage::WbCardStore;
use async_trait::async_trait;
use chrono::SecondsFormat;
use msync_common::{Result, SyncError};
use msync_core::checkpoint::{Checkpoint, CheckpointStore};
use msync_core::pagination::{BatchSink, FetchedPage, PageCursor, PageDriver, PageFetcher};
use msync_core::run::{RunCounters, SyncRun};
use msync_core::upsert::{TxMode, UpsertEngine};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Checkpoint stream name for the cards feed.
pub const CARDS_STREAM: &str = "wb-cards";

/// Pack the content-API cursor pair into one opaque token.
pub fn encode_cursor(updated_at: &str, nm_id: i64) -> String {
    format!("{updated_at}|{nm_id}")
}

/// Split a token back into the cursor pair.
pub fn decode_cursor(token: &str) -> Option<(&str, i64)> {
    let (updated_at, nm_id) = token.rsplit_once('|')?;
    Some((updated_at, nm_id.parse().ok()?))
}

fn checkpoint_to_token(checkpoint: &Checkpoint) -> Option<String> {
    let updated_at = checkpoint.last_updated_at?;
    let nm_id: i64 = checkpoint.last_key.as_deref()?.parse().ok()?;
    Some(encode_cursor(
        &updated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        nm_id,
    ))
}

fn token_to_checkpoint(token: &str) -> Option<Checkpoint> {
    let (updated_at, nm_id) = decode_cursor(token)?;
    Some(Checkpoint {
        last_updated_at: Some(models::wb_time::parse(updated_at)?),
        last_key: Some(nm_id.to_string()),
    })
}

pub struct CardsFetcher<'a> {
    pub client: &'a WbClient,
    pub limit: usize,
}

#[async_trait]
impl PageFetcher for CardsFetcher<'_> {
    type Record = WbCard;

    async fn fetch(&mut self, cursor: &PageCursor) -> Result<FetchedPage<WbCard>> {
        let token = match cursor {
            PageCursor::Token { last_id } => last_id.as_deref(),
            other => {
                return Err(SyncError::Internal(format!(
                    "cards feed drives a token cursor, got {other:?}"
                )))
            },
        };

        let (updated_at, nm_id) = match token.and_then(decode_cursor) {
            Some((updated_at, nm_id)) => (Some(updated_at.to_string()), Some(nm_id)),
            None => (None, None),
        };

        let response = self
            .client
            .fetch_cards_page(updated_at.as_deref(), nm_id)
            .await?;

        let returned = response.cards.len();
        let next_token = response.cursor.as_ref().and_then(|cursor| {
            let updated_at = cursor.updated_at.as_deref()?;
            Some(encode_cursor(updated_at, cursor.nm_id?))
        });
        let has_more = next_token.is_some() && returned == self.limit;

        Ok(FetchedPage {
            records: response.cards,
            next: PageCursor::Token {
                last_id: next_token.or_else(|| token.map(str::to_string)),
            },
            has_more,
        })
    }
}

struct CardsSink<'a> {
    engine: UpsertEngine,
    store: WbCardStore,
    checkpoint: &'a CheckpointStore,
    counters: Arc<RunCounters>,
    batch_delay: Duration,
}

#[async_trait]
impl BatchSink<WbCard> for CardsSink<'_> {
    async fn apply(&mut self, records: Vec<WbCard>, cursor: &PageCursor) -> Result<()> {
        self.counters.add_pages(1);

        let outcome = self.engine.upsert(&mut self.store, &records).await?;
        self.counters.add_records(outcome.success_count as i64);
        for failure in &outcome.failures {
            warn!(nm_id = %failure.key, error = %failure.error, "card rejected");
        }

        if let PageCursor::Token {
            last_id: Some(token),
        } = cursor
        {
            match token_to_checkpoint(token) {
                Some(checkpoint) => {
                    self.checkpoint.save(&checkpoint).await?;
                    debug!(cursor = %token, "checkpoint saved");
                },
                None => warn!(cursor = %token, "cursor not parseable, checkpoint unchanged"),
            }
        }

        if !self.batch_delay.is_zero() {
            sleep(self.batch_delay).await;
        }
        Ok(())
    }
}

/// Run one product-cards sync, incremental when a checkpoint exists.
pub async fn sync_cards(pool: PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let wb = &config.wildberries;
    let client = WbClient::new(wb)?;
    let checkpoint_store = CheckpointStore::new(pool.clone(), CARDS_STREAM);
    let driver = PageDriver::new(wb.cards_limit, wb.cards_pagination_delay());
    let counters = Arc::new(RunCounters::default());

    let run = SyncRun::new(pool.clone(), "wb-cards");
    let body_counters = counters.clone();

    run.execute(counters, async {
        db::test_connection(&pool).await?;
        if !client.probe_cards().await {
            return Err(SyncError::Connectivity(
                "content API probe request failed".into(),
            ));
        }

        let initial = match checkpoint_store.load().await? {
            Some(checkpoint) => {
                let token = checkpoint_to_token(&checkpoint);
                match &token {
                    Some(token) => info!(cursor = %token, "resuming incremental card export"),
                    None => warn!("checkpoint present but unusable, falling back to full export"),
                }
                PageCursor::Token { last_id: token }
            },
            None => {
                info!("no checkpoint, running full card export");
                PageCursor::Token { last_id: None }
            },
        };

        let mut fetcher = CardsFetcher {
            client: &client,
            limit: wb.cards_limit,
        };
        let mut sink = CardsSink {
            engine: UpsertEngine::new(TxMode::PerRecord),
            store: WbCardStore::new(pool.clone()),
            checkpoint: &checkpoint_store,
            counters: body_counters,
            batch_delay: wb.cards_batch_delay(),
        };

        let stats = driver.drain_all(initial, &mut fetcher, &mut sink).await?;
        info!(
            pages = stats.page_count,
            records = stats.total_records,
            final_cursor = %stats.final_cursor.describe(),
            "card feed drained"
        );
        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_cursor_token_round_trip() {
        let token = encode_cursor("2024-06-01T10:00:00.000Z", 123456);
        let (updated_at, nm_id) = decode_cursor(&token).unwrap();
        assert_eq!(updated_at, "2024-06-01T10:00:00.000Z");
        assert_eq!(nm_id, 123456);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_cursor("no-separator").is_none());
        assert!(decode_cursor("2024-06-01|not-a-number").is_none());
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let checkpoint = Checkpoint {
            last_updated_at: Some(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()),
            last_key: Some("777".into()),
        };

        let token = checkpoint_to_token(&checkpoint).unwrap();
        let restored = token_to_checkpoint(&token).unwrap();

        assert_eq!(restored, checkpoint);
    }

    #[test]
    fn test_partial_checkpoint_yields_no_token() {
        let checkpoint = Checkpoint {
            last_updated_at: None,
            last_key: Some("777".into()),
        };
        assert!(checkpoint_to_token(&checkpoint).is_none());
    }
}
