//! msync core engine
//!
//! The provider-agnostic machinery behind every sync run:
//!
//! - [`rate_limit`]: sliding-window request admission per request class
//! - [`transport`]: retrying HTTP call execution with backoff and Retry-After
//! - [`pagination`]: the page driver over composite/offset/token cursors and
//!   the task-based report poller
//! - [`checkpoint`]: durable per-stream resume cursors
//! - [`upsert`]: transactional batch upserts with per-source transaction modes
//! - [`runlog`]: the append-only per-run log
//! - [`run`]: the run harness tying connectivity, execution and logging together
//!
//! Provider adapters implement [`pagination::PageFetcher`] /
//! [`pagination::BatchSink`] / [`upsert::UpsertStore`] and get the pagination,
//! throttling, retry and persistence discipline from here.

pub mod checkpoint;
pub mod pagination;
pub mod rate_limit;
pub mod run;
pub mod runlog;
pub mod transport;
pub mod upsert;
