//! Run harness
//!
//! Wraps one sync run so that the run log row is written on every path out,
//! success or failure, with whatever counts were committed before a failure.
//! A failure to write the log itself is reported but never masks the run
//! outcome; the process exit code is decided by the run alone.

use crate::runlog::{insert_run_log, RunReport, RunStatus};
use chrono::{DateTime, Utc};
use msync_common::SyncError;
use sqlx::PgPool;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Shared progress counters for one run.
///
/// The sink side increments these as batches commit, so partial progress
/// survives into the run log when a later page fails.
#[derive(Debug, Default)]
pub struct RunCounters {
    records: AtomicI64,
    pages: AtomicI64,
}

impl RunCounters {
    pub fn add_records(&self, count: i64) {
        self.records.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_pages(&self, count: i64) {
        self.pages.fetch_add(count, Ordering::Relaxed);
    }

    pub fn records(&self) -> i64 {
        self.records.load(Ordering::Relaxed)
    }

    pub fn pages(&self) -> i64 {
        self.pages.load(Ordering::Relaxed)
    }
}

/// One sync run for a single entity stream
pub struct SyncRun {
    pool: PgPool,
    entity_type: String,
    scheme: Option<String>,
    date_from: Option<DateTime<Utc>>,
    date_to: Option<DateTime<Utc>>,
}

impl SyncRun {
    pub fn new(pool: PgPool, entity_type: impl Into<String>) -> Self {
        Self {
            pool,
            entity_type: entity_type.into(),
            scheme: None,
            date_from: None,
            date_to: None,
        }
    }

    /// Attach the date window the run covers, for the log row.
    pub fn with_window(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.date_from = Some(from);
        self.date_to = Some(to);
        self
    }

    /// Attach a fulfilment scheme discriminator (Ozon FBO/FBS).
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    /// Execute the run body and always write the run log afterwards.
    ///
    /// The body reports progress through `counters`; its error aborts the run
    /// and lands in the log row as `status=error` with the counts committed up
    /// to that point.
    pub async fn execute<Fut>(
        self,
        counters: Arc<RunCounters>,
        body: Fut,
    ) -> anyhow::Result<()>
    where
        Fut: Future<Output = Result<(), SyncError>>,
    {
        let started = std::time::Instant::now();
        info!(entity = %self.entity_type, "sync run started");

        let result = body.await;

        let execution_time_seconds = started.elapsed().as_secs() as i64;
        let (status, error_message) = match &result {
            Ok(()) => (RunStatus::Success, None),
            Err(err) => {
                error!(entity = %self.entity_type, error = %err, "sync run failed");
                (RunStatus::Error, Some(err.to_string()))
            },
        };

        let report = RunReport {
            entity_type: self.entity_type.clone(),
            status,
            records_count: counters.records(),
            pages_count: counters.pages(),
            date_from: self.date_from,
            date_to: self.date_to,
            error_message,
            execution_time_seconds,
            scheme: self.scheme.clone(),
        };

        match insert_run_log(&self.pool, &report).await {
            Ok(log_id) => info!(
                entity = %self.entity_type,
                log_id,
                status = status.as_str(),
                records = report.records_count,
                pages = report.pages_count,
                seconds = execution_time_seconds,
                "sync run finished"
            ),
            // The exit status was already decided by the run itself.
            Err(log_err) => error!(
                entity = %self.entity_type,
                error = %log_err,
                "failed to write run log"
            ),
        }

        result.map_err(Into::into)
    }
}
