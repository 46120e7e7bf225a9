//! Retrying request execution
//!
//! Every provider call goes through [`execute`], which classifies failures and
//! retries the retryable ones on a configurable backoff schedule:
//!
//! - 429: wait for `Retry-After` when the provider sent one, otherwise the
//!   policy's flat rate-limit wait (strict providers) or exponential backoff
//! - 5xx and network failures: exponential backoff
//! - other 4xx and malformed mandatory payloads: fatal, no retry
//!
//! One attempt counter is shared across failure kinds per call; the budget
//! size comes from the per-provider policy.

use msync_common::{Result, SyncError};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Maximum number of response-body bytes carried into error messages.
const ERROR_BODY_LIMIT: usize = 512;

/// Retry schedule for one provider
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempt budget per call
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt
    pub base_delay: Duration,
    /// Backoff cap
    pub max_delay: Duration,
    /// Flat wait applied to 429 responses without a Retry-After header.
    /// `None` falls back to the exponential schedule.
    pub rate_limit_wait: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            rate_limit_wait: None,
        }
    }
}

impl RetryPolicy {
    /// Backoff for the given 1-based attempt number: `base * 2^(attempt-1)`,
    /// capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(exp));
        delay.min(self.max_delay)
    }

    fn wait_for(&self, error: &SyncError, attempt: u32) -> Duration {
        match error {
            SyncError::RateLimited {
                retry_after: Some(after),
            } => *after,
            SyncError::RateLimited { retry_after: None } => {
                self.rate_limit_wait.unwrap_or_else(|| self.backoff(attempt))
            },
            _ => self.backoff(attempt),
        }
    }
}

/// Execute `op` under the retry policy.
///
/// `op` is re-invoked from scratch on every attempt; it must not carry state
/// between attempts. Non-retryable errors are returned immediately; once the
/// attempt budget is spent the call fails with
/// [`SyncError::RetriesExhausted`].
pub async fn execute<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = 0u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                attempts += 1;
                if attempts >= policy.max_retries {
                    warn!(attempts, error = %err, "retry budget exhausted");
                    return Err(SyncError::RetriesExhausted { attempts });
                }

                let wait = policy.wait_for(&err, attempts);
                warn!(
                    attempt = attempts,
                    max = policy.max_retries,
                    wait_ms = wait.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                sleep(wait).await;
            },
        }
    }
}

/// Classify a response and decode its JSON body.
///
/// 429 is turned into [`SyncError::RateLimited`] carrying the parsed
/// `Retry-After` seconds, 5xx into [`SyncError::Server`], any other non-2xx
/// into the fatal [`SyncError::Request`]. A 2xx body that fails to decode is
/// fatal as well, since every provider payload here is mandatory.
pub async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(SyncError::RateLimited { retry_after });
    }

    if status.is_server_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(SyncError::Server {
            status: status.as_u16(),
            body: truncate_body(&body),
        });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SyncError::Request {
            status: status.as_u16(),
            body: truncate_body(&body),
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|err| SyncError::Decode(err.to_string()))
}

/// Map a reqwest transport failure (timeout, reset, DNS) into the retryable
/// network error class.
pub fn network(err: reqwest::Error) -> SyncError {
    SyncError::Network(err.to_string())
}

fn truncate_body(body: &str) -> String {
    if body.len() <= ERROR_BODY_LIMIT {
        body.to_string()
    } else {
        let mut end = ERROR_BODY_LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body[..end].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            ..Default::default()
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            rate_limit_wait: None,
        };

        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(6), Duration::from_secs(30));
        assert_eq!(policy.backoff(30), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_after_exactly_max_attempts() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = execute(&policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SyncError::RateLimited { retry_after: None }) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(SyncError::RetriesExhausted { attempts: 3 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let result = execute(&policy(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(SyncError::Server {
                        status: 502,
                        body: String::new(),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = execute(&policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(SyncError::Request {
                    status: 400,
                    body: "bad filter".into(),
                })
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(SyncError::Request { status: 400, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_preferred_over_backoff() {
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result: Result<()> = execute(&policy(2), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(SyncError::RateLimited {
                    retry_after: Some(Duration::from_secs(7)),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(SyncError::RetriesExhausted { .. })));
        // One sleep of exactly the advertised Retry-After.
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let body = "д".repeat(600);
        let truncated = truncate_body(&body);
        assert!(truncated.len() <= ERROR_BODY_LIMIT);
        assert!(body.starts_with(&truncated));
    }
}
