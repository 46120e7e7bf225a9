//! Append-only run log
//!
//! One `sync_logs` row per run, written at completion whether the run
//! succeeded or failed, never updated afterwards. Entities share the table
//! through the `entity_type` discriminator; the Ozon streams additionally
//! carry their fulfilment scheme.

use chrono::{DateTime, Utc};
use msync_common::Result;
use sqlx::PgPool;

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        }
    }
}

/// One completed run, ready to log
#[derive(Debug, Clone)]
pub struct RunReport {
    pub entity_type: String,
    pub status: RunStatus,
    pub records_count: i64,
    pub pages_count: i64,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub execution_time_seconds: i64,
    pub scheme: Option<String>,
}

/// Insert a run log row and return its id.
pub async fn insert_run_log(pool: &PgPool, report: &RunReport) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sync_logs (
            entity_type, status, records_count, pages_count,
            date_from, date_to, error_message, execution_time_seconds, scheme
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id
        "#,
    )
    .bind(&report.entity_type)
    .bind(report.status.as_str())
    .bind(report.records_count)
    .bind(report.pages_count)
    .bind(report.date_from)
    .bind(report.date_to)
    .bind(&report.error_message)
    .bind(report.execution_time_seconds)
    .bind(&report.scheme)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// One stored run log row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncLogRow {
    pub id: i64,
    pub entity_type: String,
    pub status: String,
    pub records_count: i64,
    pub pages_count: i64,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub execution_time_seconds: i64,
    pub scheme: Option<String>,
    pub sync_at: DateTime<Utc>,
}

/// Most recent runs, optionally filtered by entity type.
pub async fn recent_runs(
    pool: &PgPool,
    entity_type: Option<&str>,
    limit: i64,
) -> Result<Vec<SyncLogRow>> {
    let rows = match entity_type {
        Some(entity) => {
            sqlx::query_as::<_, SyncLogRow>(
                r#"
                SELECT id, entity_type, status, records_count, pages_count,
                       date_from, date_to, error_message, execution_time_seconds,
                       scheme, sync_at
                FROM sync_logs
                WHERE entity_type = $1
                ORDER BY sync_at DESC
                LIMIT $2
                "#,
            )
            .bind(entity)
            .bind(limit)
            .fetch_all(pool)
            .await?
        },
        None => {
            sqlx::query_as::<_, SyncLogRow>(
                r#"
                SELECT id, entity_type, status, records_count, pages_count,
                       date_from, date_to, error_message, execution_time_seconds,
                       scheme, sync_at
                FROM sync_logs
                ORDER BY sync_at DESC
                LIMIT $1
                "#,
            )
            .bind(limit)
            .fetch_all(pool)
            .await?
        },
    };

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_as_str() {
        assert_eq!(RunStatus::Success.as_str(), "success");
        assert_eq!(RunStatus::Error.as_str(), "error");
    }
}
