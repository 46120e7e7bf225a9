//! Durable per-stream resume cursors
//!
//! One row per sync stream in `sync_cursor_state`, read once at run start and
//! overwritten after every committed batch, so a crash mid-run resumes from
//! the last committed batch rather than the run start. Rows are never deleted;
//! a missing row (or one with null fields) means "full initial sync".

use chrono::{DateTime, Utc};
use msync_common::Result;
use sqlx::PgPool;

/// Persisted high-water mark for one stream
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Checkpoint {
    /// High-water timestamp (e.g. the last card's `updatedAt`)
    pub last_updated_at: Option<DateTime<Utc>>,
    /// High-water id tie-break or opaque token, stream-dependent
    pub last_key: Option<String>,
}

/// Checkpoint access for a single stream
pub struct CheckpointStore {
    pool: PgPool,
    stream: String,
}

impl CheckpointStore {
    pub fn new(pool: PgPool, stream: impl Into<String>) -> Self {
        Self {
            pool,
            stream: stream.into(),
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Load the stream checkpoint. `None` signals a full initial sync.
    pub async fn load(&self) -> Result<Option<Checkpoint>> {
        let row = sqlx::query_as::<_, Checkpoint>(
            r#"
            SELECT last_updated_at, last_key
            FROM sync_cursor_state
            WHERE stream = $1
            "#,
        )
        .bind(&self.stream)
        .fetch_optional(&self.pool)
        .await?;

        // A seeded row with null fields is equivalent to no checkpoint.
        Ok(row.filter(|c| c.last_updated_at.is_some() || c.last_key.is_some()))
    }

    /// Overwrite the stream checkpoint. Safe to call after every batch.
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_cursor_state (stream, last_updated_at, last_key, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (stream) DO UPDATE SET
                last_updated_at = EXCLUDED.last_updated_at,
                last_key = EXCLUDED.last_key,
                updated_at = now()
            "#,
        )
        .bind(&self.stream)
        .bind(checkpoint.last_updated_at)
        .bind(&checkpoint.last_key)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
