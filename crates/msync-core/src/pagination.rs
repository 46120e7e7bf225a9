//! Pagination driver
//!
//! One driving loop for the three pagination shapes the providers use:
//!
//! - `Composite`: a high-water timestamp (plus an id tie-break) advanced from
//!   the last record of each full page
//! - `Offset`: offset into a server-reported total
//! - `Token`: an opaque continuation token seeded from the previous response
//!
//! Task-based report feeds (create, poll until terminal, download) are not
//! paginated; they go through [`fetch_report`] instead.
//!
//! The driver emits every non-empty page to a caller-supplied sink, where
//! normalization and persistence happen, and sleeps a provider-specific pacing
//! delay between successful pages. That delay is a proactive courtesy pause,
//! separate from the reactive throttling in [`crate::rate_limit`] and
//! [`crate::transport`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use msync_common::{Result, SyncError};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Continuation state for a paginated feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// High-water mark pagination: records strictly after `date_from` (with
    /// `last_id` as the provider-side tie-break where supported).
    Composite {
        date_from: DateTime<Utc>,
        last_id: Option<i64>,
    },
    /// Offset into a server-reported total. `total` stays `None` until the
    /// provider reports one.
    Offset { offset: u64, total: Option<u64> },
    /// Opaque server-issued continuation token. `None` requests the first
    /// page.
    Token { last_id: Option<String> },
}

impl PageCursor {
    /// Short human-readable form for progress logs.
    pub fn describe(&self) -> String {
        match self {
            PageCursor::Composite { date_from, last_id } => match last_id {
                Some(id) => format!("from {} id {}", date_from.to_rfc3339(), id),
                None => format!("from {}", date_from.to_rfc3339()),
            },
            PageCursor::Offset { offset, .. } => format!("offset {}", offset),
            PageCursor::Token { last_id } => match last_id {
                Some(id) => format!("token {}", id),
                None => "start".to_string(),
            },
        }
    }
}

/// One fetched page plus its continuation signal
pub struct FetchedPage<R> {
    pub records: Vec<R>,
    /// Cursor for the next request, already advanced past this page.
    pub next: PageCursor,
    /// Explicit more-data flag where the provider sends one. The driver also
    /// treats a page of exactly the requested size as an implicit signal.
    pub has_more: bool,
}

/// Fetches one page for a cursor. Implementations wrap their HTTP call in
/// [`crate::transport::execute`].
#[async_trait]
pub trait PageFetcher: Send {
    type Record: Send;

    async fn fetch(&mut self, cursor: &PageCursor) -> Result<FetchedPage<Self::Record>>;
}

/// Receives every non-empty page. Errors abort the drive.
#[async_trait]
pub trait BatchSink<R>: Send {
    /// `cursor` is the already-advanced continuation for the delivered page,
    /// i.e. the checkpoint to persist once the batch is committed.
    async fn apply(&mut self, records: Vec<R>, cursor: &PageCursor) -> Result<()>;
}

/// Totals for one completed drive
#[derive(Debug, Clone)]
pub struct DrainStats {
    pub total_records: u64,
    pub page_count: u64,
    pub final_cursor: PageCursor,
}

enum Continuation {
    Continue,
    Finished,
    LoopGuard,
}

/// Drives a paginated feed to exhaustion
#[derive(Debug, Clone)]
pub struct PageDriver {
    page_size: usize,
    pace: Duration,
}

impl PageDriver {
    pub fn new(page_size: usize, pace: Duration) -> Self {
        Self { page_size, pace }
    }

    /// Fetch pages from `initial` until the feed is drained, handing each
    /// non-empty page to `sink`.
    ///
    /// An empty first page is a normal zero-count outcome. A cursor that fails
    /// to advance while the provider still signals more data trips the loop
    /// guard: the drive stops with a warning instead of spinning forever, and
    /// everything committed so far is kept.
    pub async fn drain_all<F, S>(
        &self,
        initial: PageCursor,
        fetcher: &mut F,
        sink: &mut S,
    ) -> Result<DrainStats>
    where
        F: PageFetcher,
        S: BatchSink<F::Record>,
    {
        let mut cursor = initial;
        let mut total_records = 0u64;
        let mut page_count = 0u64;

        loop {
            debug!(page = page_count + 1, cursor = %cursor.describe(), "requesting page");
            let page = fetcher.fetch(&cursor).await?;
            page_count += 1;

            let returned = page.records.len();
            if returned > 0 {
                sink.apply(page.records, &page.next).await?;
                total_records += returned as u64;
            } else if page_count == 1 {
                info!("first page empty, nothing changed since checkpoint");
            }

            let continuation = self.continuation(&cursor, &page.next, returned, page.has_more);
            cursor = page.next;

            match continuation {
                Continuation::Finished => break,
                Continuation::LoopGuard => {
                    warn!(
                        cursor = %cursor.describe(),
                        "cursor did not advance although more data was signaled, stopping"
                    );
                    break;
                },
                Continuation::Continue => {
                    if !self.pace.is_zero() {
                        debug!(pace_ms = self.pace.as_millis() as u64, "pacing before next page");
                        sleep(self.pace).await;
                    }
                },
            }
        }

        Ok(DrainStats {
            total_records,
            page_count,
            final_cursor: cursor,
        })
    }

    fn continuation(
        &self,
        previous: &PageCursor,
        next: &PageCursor,
        returned: usize,
        has_more: bool,
    ) -> Continuation {
        if returned == 0 {
            return Continuation::Finished;
        }

        match next {
            PageCursor::Offset { offset, total } => {
                if returned < self.page_size {
                    return Continuation::Finished;
                }
                match total {
                    Some(total) if *offset >= *total => Continuation::Finished,
                    _ => Continuation::Continue,
                }
            },
            PageCursor::Composite { .. } | PageCursor::Token { .. } => {
                let signaled = has_more || returned == self.page_size;
                if !signaled {
                    Continuation::Finished
                } else if next == previous {
                    Continuation::LoopGuard
                } else {
                    Continuation::Continue
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Task-based report feeds
// ---------------------------------------------------------------------------

/// Server-side state of an asynchronous report task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    New,
    Pending,
    Processing,
    Done,
    Error,
}

impl ReportStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new" => Some(ReportStatus::New),
            "pending" => Some(ReportStatus::Pending),
            "processing" => Some(ReportStatus::Processing),
            "done" => Some(ReportStatus::Done),
            "error" => Some(ReportStatus::Error),
            _ => None,
        }
    }
}

/// One asynchronous provider report: created once, polled until terminal,
/// downloaded on `done`.
#[async_trait]
pub trait ReportTask: Send {
    type Record: Send;

    async fn create(&mut self) -> Result<String>;
    async fn status(&mut self, task_id: &str) -> Result<ReportStatus>;
    async fn download(&mut self, task_id: &str) -> Result<Vec<Self::Record>>;
}

/// Poll schedule for report tasks. Every observed wait is configuration.
#[derive(Debug, Clone)]
pub struct ReportPollConfig {
    pub poll_interval: Duration,
    /// Upper bound on status polls before the run gives up.
    pub max_polls: u32,
}

impl Default for ReportPollConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_polls: 60,
        }
    }
}

/// Create a report task, poll it to a terminal state and download the result.
pub async fn fetch_report<T>(task: &mut T, config: &ReportPollConfig) -> Result<Vec<T::Record>>
where
    T: ReportTask,
{
    let task_id = task.create().await?;
    info!(task_id = %task_id, "report task created");

    let mut polls = 0u32;
    loop {
        let status = task.status(&task_id).await?;
        debug!(task_id = %task_id, status = ?status, "report status");

        match status {
            ReportStatus::Done => break,
            ReportStatus::Error => {
                return Err(SyncError::ReportFailed(format!(
                    "provider reported a failed report for task {task_id}"
                )));
            },
            ReportStatus::New | ReportStatus::Pending | ReportStatus::Processing => {
                polls += 1;
                if polls >= config.max_polls {
                    return Err(SyncError::ReportFailed(format!(
                        "report {task_id} not ready after {polls} polls"
                    )));
                }
                sleep(config.poll_interval).await;
            },
        }
    }

    info!(task_id = %task_id, "report ready, downloading");
    task.download(&task_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct CollectingSink {
        batches: Vec<(usize, PageCursor)>,
    }

    impl CollectingSink {
        fn new() -> Self {
            Self { batches: Vec::new() }
        }
    }

    #[async_trait]
    impl BatchSink<u64> for CollectingSink {
        async fn apply(&mut self, records: Vec<u64>, cursor: &PageCursor) -> Result<()> {
            self.batches.push((records.len(), cursor.clone()));
            Ok(())
        }
    }

    /// Serves `total` sequential records through offset pagination.
    struct OffsetFetcher {
        total: u64,
        page_size: usize,
        offsets_seen: Vec<u64>,
    }

    #[async_trait]
    impl PageFetcher for OffsetFetcher {
        type Record = u64;

        async fn fetch(&mut self, cursor: &PageCursor) -> Result<FetchedPage<u64>> {
            let offset = match cursor {
                PageCursor::Offset { offset, .. } => *offset,
                other => panic!("unexpected cursor {other:?}"),
            };
            self.offsets_seen.push(offset);

            let end = (offset + self.page_size as u64).min(self.total);
            let records: Vec<u64> = (offset..end).collect();
            let returned = records.len() as u64;

            Ok(FetchedPage {
                records,
                next: PageCursor::Offset {
                    offset: offset + returned,
                    total: Some(self.total),
                },
                has_more: false,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_offset_pagination_stops_after_partial_page() {
        let driver = PageDriver::new(1000, Duration::from_millis(200));
        let mut fetcher = OffsetFetcher {
            total: 2500,
            page_size: 1000,
            offsets_seen: Vec::new(),
        };
        let mut sink = CollectingSink::new();

        let stats = driver
            .drain_all(
                PageCursor::Offset {
                    offset: 0,
                    total: None,
                },
                &mut fetcher,
                &mut sink,
            )
            .await
            .unwrap();

        assert_eq!(fetcher.offsets_seen, vec![0, 1000, 2000]);
        assert_eq!(stats.page_count, 3);
        assert_eq!(stats.total_records, 2500);
        assert_eq!(sink.batches.len(), 3);
        assert_eq!(sink.batches[2].0, 500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offset_pagination_stops_at_reported_total() {
        // Total divides evenly by the page size; the offset check must stop
        // the drive without an extra empty fetch.
        let driver = PageDriver::new(1000, Duration::ZERO);
        let mut fetcher = OffsetFetcher {
            total: 2000,
            page_size: 1000,
            offsets_seen: Vec::new(),
        };
        let mut sink = CollectingSink::new();

        let stats = driver
            .drain_all(
                PageCursor::Offset {
                    offset: 0,
                    total: None,
                },
                &mut fetcher,
                &mut sink,
            )
            .await
            .unwrap();

        assert_eq!(fetcher.offsets_seen, vec![0, 1000]);
        assert_eq!(stats.total_records, 2000);
    }

    /// Composite-cursor feed capped at `page_size` records per response, in
    /// the manner of the statistics API: the caller advances `date_from` past
    /// the last record of each full page.
    struct CompositeFetcher {
        records_left: usize,
        page_size: usize,
        fetches: usize,
    }

    #[async_trait]
    impl PageFetcher for CompositeFetcher {
        type Record = u64;

        async fn fetch(&mut self, cursor: &PageCursor) -> Result<FetchedPage<u64>> {
            let date_from = match cursor {
                PageCursor::Composite { date_from, .. } => *date_from,
                other => panic!("unexpected cursor {other:?}"),
            };
            self.fetches += 1;

            let count = self.records_left.min(self.page_size);
            self.records_left -= count;
            let records: Vec<u64> = (0..count as u64).collect();

            Ok(FetchedPage {
                records,
                next: PageCursor::Composite {
                    // +1ms past the last change date of the page.
                    date_from: date_from + chrono::Duration::milliseconds(1),
                    last_id: None,
                },
                has_more: count == self.page_size,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_composite_cursor_advances_until_short_page() {
        let driver = PageDriver::new(80_000, Duration::ZERO);
        let mut fetcher = CompositeFetcher {
            records_left: 160_500,
            page_size: 80_000,
            fetches: 0,
        };
        let mut sink = CollectingSink::new();

        let start = Utc::now();
        let stats = driver
            .drain_all(
                PageCursor::Composite {
                    date_from: start,
                    last_id: None,
                },
                &mut fetcher,
                &mut sink,
            )
            .await
            .unwrap();

        assert_eq!(fetcher.fetches, 3);
        assert_eq!(stats.total_records, 160_500);
        match stats.final_cursor {
            PageCursor::Composite { date_from, .. } => {
                assert_eq!(date_from, start + chrono::Duration::milliseconds(3));
            },
            other => panic!("unexpected final cursor {other:?}"),
        }
    }

    /// A provider whose token stops advancing while it still claims more data.
    struct StuckTokenFetcher {
        fetches: usize,
    }

    #[async_trait]
    impl PageFetcher for StuckTokenFetcher {
        type Record = u64;

        async fn fetch(&mut self, _cursor: &PageCursor) -> Result<FetchedPage<u64>> {
            self.fetches += 1;
            Ok(FetchedPage {
                records: vec![1, 2, 3],
                next: PageCursor::Token {
                    last_id: Some("stuck".to_string()),
                },
                has_more: true,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_guard_terminates_stuck_token() {
        let driver = PageDriver::new(3, Duration::ZERO);
        let mut fetcher = StuckTokenFetcher { fetches: 0 };
        let mut sink = CollectingSink::new();

        let stats = driver
            .drain_all(PageCursor::Token { last_id: None }, &mut fetcher, &mut sink)
            .await
            .unwrap();

        // First page advances None -> "stuck"; the second page returns the
        // same token and trips the guard. No third fetch.
        assert_eq!(fetcher.fetches, 2);
        assert_eq!(stats.page_count, 2);
        assert_eq!(stats.total_records, 6);
    }

    struct EmptyFetcher;

    #[async_trait]
    impl PageFetcher for EmptyFetcher {
        type Record = u64;

        async fn fetch(&mut self, cursor: &PageCursor) -> Result<FetchedPage<u64>> {
            Ok(FetchedPage {
                records: Vec::new(),
                next: cursor.clone(),
                has_more: false,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_first_page_is_success_with_zero_counts() {
        let driver = PageDriver::new(100, Duration::ZERO);
        let mut sink = CollectingSink::new();

        let stats = driver
            .drain_all(
                PageCursor::Token { last_id: None },
                &mut EmptyFetcher,
                &mut sink,
            )
            .await
            .unwrap();

        assert_eq!(stats.total_records, 0);
        assert_eq!(stats.page_count, 1);
        assert!(sink.batches.is_empty());
    }

    struct FailingSink;

    #[async_trait]
    impl BatchSink<u64> for FailingSink {
        async fn apply(&mut self, _records: Vec<u64>, _cursor: &PageCursor) -> Result<()> {
            Err(SyncError::Persistence {
                key: "42".into(),
                message: "constraint violation".into(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_error_aborts_drive() {
        let driver = PageDriver::new(1000, Duration::ZERO);
        let mut fetcher = OffsetFetcher {
            total: 5000,
            page_size: 1000,
            offsets_seen: Vec::new(),
        };

        let result = driver
            .drain_all(
                PageCursor::Offset {
                    offset: 0,
                    total: None,
                },
                &mut fetcher,
                &mut FailingSink,
            )
            .await;

        assert!(matches!(result, Err(SyncError::Persistence { .. })));
        assert_eq!(fetcher.offsets_seen.len(), 1);
    }

    /// Scripted report task for the poll loop.
    struct ScriptedReport {
        statuses: Vec<ReportStatus>,
        cursor: usize,
        created: bool,
        downloads: usize,
        poll_times: Arc<Mutex<Vec<tokio::time::Instant>>>,
    }

    #[async_trait]
    impl ReportTask for ScriptedReport {
        type Record = u64;

        async fn create(&mut self) -> Result<String> {
            self.created = true;
            Ok("task-1".to_string())
        }

        async fn status(&mut self, _task_id: &str) -> Result<ReportStatus> {
            self.poll_times
                .lock()
                .unwrap()
                .push(tokio::time::Instant::now());
            let status = self.statuses[self.cursor];
            self.cursor += 1;
            Ok(status)
        }

        async fn download(&mut self, _task_id: &str) -> Result<Vec<u64>> {
            self.downloads += 1;
            Ok(vec![7, 8, 9])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_polls_until_done_with_interval() {
        let poll_times = Arc::new(Mutex::new(Vec::new()));
        let mut task = ScriptedReport {
            statuses: vec![
                ReportStatus::New,
                ReportStatus::Pending,
                ReportStatus::Pending,
                ReportStatus::Done,
            ],
            cursor: 0,
            created: false,
            downloads: 0,
            poll_times: poll_times.clone(),
        };
        let config = ReportPollConfig {
            poll_interval: Duration::from_secs(5),
            max_polls: 10,
        };

        let records = fetch_report(&mut task, &config).await.unwrap();

        assert!(task.created);
        assert_eq!(records, vec![7, 8, 9]);
        assert_eq!(task.downloads, 1);

        let times = poll_times.lock().unwrap();
        assert_eq!(times.len(), 4);
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_secs(5));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_error_status_fails() {
        let mut task = ScriptedReport {
            statuses: vec![ReportStatus::Processing, ReportStatus::Error],
            cursor: 0,
            created: false,
            downloads: 0,
            poll_times: Arc::new(Mutex::new(Vec::new())),
        };

        let result = fetch_report(&mut task, &ReportPollConfig::default()).await;

        assert!(matches!(result, Err(SyncError::ReportFailed(_))));
        assert_eq!(task.downloads, 0);
    }

    #[test]
    fn test_report_status_parse() {
        assert_eq!(ReportStatus::parse("new"), Some(ReportStatus::New));
        assert_eq!(ReportStatus::parse("done"), Some(ReportStatus::Done));
        assert_eq!(ReportStatus::parse("error"), Some(ReportStatus::Error));
        assert_eq!(ReportStatus::parse("weird"), None);
    }
}
