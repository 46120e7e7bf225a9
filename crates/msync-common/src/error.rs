//! Error types for msync

use std::time::Duration;
use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Main error type for sync runs
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("connectivity check failed: {0}")]
    Connectivity(String),

    /// HTTP 429 from a provider. Recovered via Retry-After/backoff unless the
    /// retry budget runs out.
    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    /// HTTP 5xx from a provider; retryable.
    #[error("provider server error {status}: {body}")]
    Server { status: u16, body: String },

    /// Timeout, connection reset and similar; retryable like 5xx.
    #[error("network error: {0}")]
    Network(String),

    /// Non-429 4xx; fatal for the current run, never retried.
    #[error("request rejected with status {status}: {body}")]
    Request { status: u16, body: String },

    /// Mandatory payload missing or malformed; fatal, never retried.
    #[error("malformed response body: {0}")]
    Decode(String),

    #[error("retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// A task-based report reached the terminal `error` state.
    #[error("report generation failed: {0}")]
    ReportFailed(String),

    /// A task-based report was not found on status/download (expired handle).
    #[error("report task {0} not found, the handle may have expired")]
    ReportExpired(String),

    #[error("persistence failed for record {key}: {message}")]
    Persistence { key: String, message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Whether the retrying transport may attempt this request again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::RateLimited { .. } | SyncError::Server { .. } | SyncError::Network(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SyncError::RateLimited { retry_after: None }.is_retryable());
        assert!(SyncError::Server {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(SyncError::Network("timeout".into()).is_retryable());

        assert!(!SyncError::Request {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!SyncError::Decode("empty body".into()).is_retryable());
        assert!(!SyncError::ReportFailed("provider error".into()).is_retryable());
    }
}
