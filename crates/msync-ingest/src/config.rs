//! Configuration management
//!
//! All settings come from environment variables (a `.env` file is honored via
//! dotenvy), with documented defaults. Provider tokens are validated by the
//! sync that needs them, so a deployment can run a subset of the streams.

use msync_core::pagination::ReportPollConfig;
use msync_core::rate_limit::RateLimits;
use msync_core::transport::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Database Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/msync";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 20;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default database idle timeout in seconds.
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Wildberries Configuration Constants
// ============================================================================

/// Statistics API base URL (supplier orders).
pub const DEFAULT_WB_STATS_URL: &str = "https://statistics-api.wildberries.ru";

/// Content API base URL (product cards).
pub const DEFAULT_WB_CONTENT_URL: &str = "https://content-api.wildberries.ru";

/// Seller-analytics API base URL (warehouse remains reports).
pub const DEFAULT_WB_ANALYTICS_URL: &str = "https://seller-analytics-api.wildberries.ru";

/// Default HTTP timeout for Wildberries requests in seconds.
pub const DEFAULT_WB_TIMEOUT_SECS: u64 = 30;

/// Default retry budget per Wildberries call.
pub const DEFAULT_WB_MAX_RETRIES: u32 = 3;

/// The statistics API allows one request per minute; the pacing delay between
/// order pages stays just above that.
pub const DEFAULT_WB_PAGINATION_DELAY_MS: u64 = 61_000;

/// Flat wait after a statistics-API 429 without a Retry-After header.
pub const DEFAULT_WB_RATE_LIMIT_WAIT_SECS: u64 = 65;

/// The statistics API caps one response at this many records.
pub const DEFAULT_WB_PAGE_LIMIT: usize = 80_000;

/// Content API page size cap for card listings.
pub const DEFAULT_WB_CARDS_LIMIT: usize = 100;

/// Pacing between card pages in milliseconds.
pub const DEFAULT_WB_CARDS_PAGINATION_DELAY_MS: u64 = 1_000;

/// Extra pause after each persisted card batch in milliseconds.
pub const DEFAULT_WB_CARDS_BATCH_DELAY_MS: u64 = 500;

/// Status poll interval for warehouse-remains report tasks in seconds.
pub const DEFAULT_WB_REPORT_POLL_INTERVAL_SECS: u64 = 5;

/// Upper bound on report status polls per run.
pub const DEFAULT_WB_REPORT_MAX_POLLS: u32 = 60;

/// Flat wait after an analytics-API 429 without a Retry-After header.
pub const DEFAULT_WB_REPORT_RATE_LIMIT_WAIT_SECS: u64 = 60;

// ============================================================================
// Ozon Configuration Constants
// ============================================================================

/// Seller API base URL.
pub const DEFAULT_OZON_URL: &str = "https://api-seller.ozon.ru";

/// Default HTTP timeout for Ozon requests in seconds.
pub const DEFAULT_OZON_TIMEOUT_SECS: u64 = 30;

/// Default retry budget per Ozon call.
pub const DEFAULT_OZON_MAX_RETRIES: u32 = 3;

/// Posting list page size cap.
pub const DEFAULT_OZON_PAGE_LIMIT: usize = 1_000;

/// Product list page size cap.
pub const DEFAULT_OZON_STOCKS_PAGE_LIMIT: usize = 100;

/// Pacing between Ozon pages in milliseconds.
pub const DEFAULT_OZON_PAGINATION_DELAY_MS: u64 = 200;

// ============================================================================
// MoySklad Configuration Constants
// ============================================================================

/// Remap API base URL.
pub const DEFAULT_MS_URL: &str = "https://api.moysklad.ru/api/remap/1.2";

/// Default HTTP timeout for MoySklad requests in seconds.
pub const DEFAULT_MS_TIMEOUT_SECS: u64 = 60;

/// Default retry budget per MoySklad call.
pub const DEFAULT_MS_MAX_RETRIES: u32 = 5;

/// First backoff delay for MoySklad retries in seconds.
pub const DEFAULT_MS_RETRY_DELAY_SECS: u64 = 5;

/// Pacing between entity pages in milliseconds.
pub const DEFAULT_MS_PAGINATION_DELAY_MS: u64 = 2_000;

/// Pacing between heavy report pages in milliseconds.
pub const DEFAULT_MS_HEAVY_DELAY_MS: u64 = 20_000;

/// Per-minute ceiling for regular MoySklad requests.
pub const DEFAULT_MS_NORMAL_PER_MINUTE: usize = 45;

/// Per-minute ceiling for heavy MoySklad report requests.
pub const DEFAULT_MS_HEAVY_PER_MINUTE: usize = 5;

/// Page size for MoySklad list and report requests.
pub const DEFAULT_MS_PAGE_LIMIT: usize = 1_000;

// ============================================================================
// Sync Window Constants
// ============================================================================

/// How far back the order windows reach, in days.
pub const DEFAULT_SYNC_WINDOW_DAYS: i64 = 30;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub wildberries: WbConfig,
    pub ozon: OzonConfig,
    pub moysklad: MoyskladConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Wildberries configuration (statistics, content and analytics APIs)
#[derive(Debug, Clone)]
pub struct WbConfig {
    pub token: Option<String>,
    pub stats_url: String,
    pub content_url: String,
    pub analytics_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub pagination_delay_ms: u64,
    pub rate_limit_wait_secs: u64,
    pub page_limit: usize,
    pub cards_limit: usize,
    pub cards_pagination_delay_ms: u64,
    pub cards_batch_delay_ms: u64,
    pub report_poll_interval_secs: u64,
    pub report_max_polls: u32,
    pub report_rate_limit_wait_secs: u64,
    pub window_days: i64,
}

/// Ozon seller API configuration
#[derive(Debug, Clone)]
pub struct OzonConfig {
    pub client_id: Option<String>,
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub page_limit: usize,
    pub stocks_page_limit: usize,
    pub pagination_delay_ms: u64,
    pub window_days: i64,
}

/// MoySklad remap API configuration
#[derive(Debug, Clone)]
pub struct MoyskladConfig {
    pub token: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub pagination_delay_ms: u64,
    pub heavy_delay_ms: u64,
    pub normal_per_minute: usize,
    pub heavy_per_minute: usize,
    pub page_limit: usize,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database: DatabaseConfig::from_env(),
            wildberries: WbConfig::from_env(),
            ozon: OzonConfig::from_env(),
            moysklad: MoyskladConfig::from_env(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("DATABASE_URL cannot be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("DATABASE_MAX_CONNECTIONS must be greater than 0");
        }
        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "DATABASE_MIN_CONNECTIONS ({}) cannot exceed DATABASE_MAX_CONNECTIONS ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }
        if self.wildberries.page_limit == 0 || self.wildberries.cards_limit == 0 {
            anyhow::bail!("Wildberries page limits must be greater than 0");
        }
        if self.ozon.page_limit == 0 || self.ozon.stocks_page_limit == 0 {
            anyhow::bail!("Ozon page limits must be greater than 0");
        }
        if self.moysklad.page_limit == 0 {
            anyhow::bail!("MS_PAGE_LIMIT must be greater than 0");
        }
        if self.moysklad.normal_per_minute == 0 || self.moysklad.heavy_per_minute == 0 {
            anyhow::bail!("MoySklad per-minute ceilings must be greater than 0");
        }
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        Self {
            url: env_var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            max_connections: env_parsed("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
            min_connections: env_parsed("DATABASE_MIN_CONNECTIONS", DEFAULT_DATABASE_MIN_CONNECTIONS),
            connect_timeout_secs: env_parsed(
                "DATABASE_CONNECT_TIMEOUT",
                DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            ),
            idle_timeout_secs: env_parsed("DATABASE_IDLE_TIMEOUT", DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
        }
    }
}

impl WbConfig {
    pub fn from_env() -> Self {
        Self {
            token: env_var("WB_API_TOKEN"),
            stats_url: env_var("WB_STATS_URL").unwrap_or_else(|| DEFAULT_WB_STATS_URL.to_string()),
            content_url: env_var("WB_CONTENT_URL")
                .unwrap_or_else(|| DEFAULT_WB_CONTENT_URL.to_string()),
            analytics_url: env_var("WB_ANALYTICS_URL")
                .unwrap_or_else(|| DEFAULT_WB_ANALYTICS_URL.to_string()),
            timeout_secs: env_parsed("REQUEST_TIMEOUT_SECS", DEFAULT_WB_TIMEOUT_SECS),
            max_retries: env_parsed("MAX_RETRIES", DEFAULT_WB_MAX_RETRIES),
            pagination_delay_ms: env_parsed("WB_PAGINATION_DELAY_MS", DEFAULT_WB_PAGINATION_DELAY_MS),
            rate_limit_wait_secs: env_parsed(
                "WB_RATE_LIMIT_WAIT_SECS",
                DEFAULT_WB_RATE_LIMIT_WAIT_SECS,
            ),
            page_limit: env_parsed("WB_PAGE_LIMIT", DEFAULT_WB_PAGE_LIMIT),
            cards_limit: env_parsed("CARDS_LIMIT", DEFAULT_WB_CARDS_LIMIT),
            cards_pagination_delay_ms: env_parsed(
                "CARDS_PAGINATION_DELAY_MS",
                DEFAULT_WB_CARDS_PAGINATION_DELAY_MS,
            ),
            cards_batch_delay_ms: env_parsed("CARDS_BATCH_DELAY_MS", DEFAULT_WB_CARDS_BATCH_DELAY_MS),
            report_poll_interval_secs: env_parsed(
                "WB_REPORT_POLL_INTERVAL_SECS",
                DEFAULT_WB_REPORT_POLL_INTERVAL_SECS,
            ),
            report_max_polls: env_parsed("WB_REPORT_MAX_POLLS", DEFAULT_WB_REPORT_MAX_POLLS),
            report_rate_limit_wait_secs: env_parsed(
                "WB_REPORT_RATE_LIMIT_WAIT_SECS",
                DEFAULT_WB_REPORT_RATE_LIMIT_WAIT_SECS,
            ),
            window_days: env_parsed("SYNC_WINDOW_DAYS", DEFAULT_SYNC_WINDOW_DAYS),
        }
    }

    /// The bearer token, required for every Wildberries stream.
    pub fn require_token(&self) -> msync_common::Result<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| msync_common::SyncError::Config("WB_API_TOKEN is not set".to_string()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Retry schedule for the statistics and analytics APIs: their only rate
    /// signal is a flat wait, the page pacing does the real throttling.
    pub fn orders_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            rate_limit_wait: Some(Duration::from_secs(self.rate_limit_wait_secs)),
        }
    }

    /// Retry schedule for the content API, which sends Retry-After.
    pub fn cards_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            rate_limit_wait: None,
        }
    }

    pub fn report_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            rate_limit_wait: Some(Duration::from_secs(self.report_rate_limit_wait_secs)),
        }
    }

    pub fn report_poll_config(&self) -> ReportPollConfig {
        ReportPollConfig {
            poll_interval: Duration::from_secs(self.report_poll_interval_secs),
            max_polls: self.report_max_polls,
        }
    }

    pub fn pagination_delay(&self) -> Duration {
        Duration::from_millis(self.pagination_delay_ms)
    }

    pub fn cards_pagination_delay(&self) -> Duration {
        Duration::from_millis(self.cards_pagination_delay_ms)
    }

    pub fn cards_batch_delay(&self) -> Duration {
        Duration::from_millis(self.cards_batch_delay_ms)
    }
}

impl Default for WbConfig {
    fn default() -> Self {
        Self {
            token: None,
            stats_url: DEFAULT_WB_STATS_URL.to_string(),
            content_url: DEFAULT_WB_CONTENT_URL.to_string(),
            analytics_url: DEFAULT_WB_ANALYTICS_URL.to_string(),
            timeout_secs: DEFAULT_WB_TIMEOUT_SECS,
            max_retries: DEFAULT_WB_MAX_RETRIES,
            pagination_delay_ms: DEFAULT_WB_PAGINATION_DELAY_MS,
            rate_limit_wait_secs: DEFAULT_WB_RATE_LIMIT_WAIT_SECS,
            page_limit: DEFAULT_WB_PAGE_LIMIT,
            cards_limit: DEFAULT_WB_CARDS_LIMIT,
            cards_pagination_delay_ms: DEFAULT_WB_CARDS_PAGINATION_DELAY_MS,
            cards_batch_delay_ms: DEFAULT_WB_CARDS_BATCH_DELAY_MS,
            report_poll_interval_secs: DEFAULT_WB_REPORT_POLL_INTERVAL_SECS,
            report_max_polls: DEFAULT_WB_REPORT_MAX_POLLS,
            report_rate_limit_wait_secs: DEFAULT_WB_REPORT_RATE_LIMIT_WAIT_SECS,
            window_days: DEFAULT_SYNC_WINDOW_DAYS,
        }
    }
}

impl OzonConfig {
    pub fn from_env() -> Self {
        Self {
            client_id: env_var("OZON_CLIENT_ID"),
            api_key: env_var("OZON_API_KEY"),
            base_url: env_var("OZON_URL").unwrap_or_else(|| DEFAULT_OZON_URL.to_string()),
            timeout_secs: env_parsed("OZON_TIMEOUT_SECS", DEFAULT_OZON_TIMEOUT_SECS),
            max_retries: env_parsed("OZON_MAX_RETRIES", DEFAULT_OZON_MAX_RETRIES),
            page_limit: env_parsed("OZON_PAGE_LIMIT", DEFAULT_OZON_PAGE_LIMIT),
            stocks_page_limit: env_parsed("OZON_STOCKS_PAGE_LIMIT", DEFAULT_OZON_STOCKS_PAGE_LIMIT),
            pagination_delay_ms: env_parsed(
                "OZON_PAGINATION_DELAY_MS",
                DEFAULT_OZON_PAGINATION_DELAY_MS,
            ),
            window_days: env_parsed("SYNC_WINDOW_DAYS", DEFAULT_SYNC_WINDOW_DAYS),
        }
    }

    /// Client id and api key, required for every Ozon stream.
    pub fn require_credentials(&self) -> msync_common::Result<(&str, &str)> {
        match (self.client_id.as_deref(), self.api_key.as_deref()) {
            (Some(client_id), Some(api_key)) => Ok((client_id, api_key)),
            _ => Err(msync_common::SyncError::Config(
                "OZON_CLIENT_ID or OZON_API_KEY is not set".to_string(),
            )),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            rate_limit_wait: None,
        }
    }

    pub fn pagination_delay(&self) -> Duration {
        Duration::from_millis(self.pagination_delay_ms)
    }
}

impl Default for OzonConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            api_key: None,
            base_url: DEFAULT_OZON_URL.to_string(),
            timeout_secs: DEFAULT_OZON_TIMEOUT_SECS,
            max_retries: DEFAULT_OZON_MAX_RETRIES,
            page_limit: DEFAULT_OZON_PAGE_LIMIT,
            stocks_page_limit: DEFAULT_OZON_STOCKS_PAGE_LIMIT,
            pagination_delay_ms: DEFAULT_OZON_PAGINATION_DELAY_MS,
            window_days: DEFAULT_SYNC_WINDOW_DAYS,
        }
    }
}

impl MoyskladConfig {
    pub fn from_env() -> Self {
        Self {
            token: env_var("MS_TOKEN"),
            base_url: env_var("MS_BASE_URL").unwrap_or_else(|| DEFAULT_MS_URL.to_string()),
            timeout_secs: env_parsed("MS_REQUEST_TIMEOUT_SECS", DEFAULT_MS_TIMEOUT_SECS),
            max_retries: env_parsed("MS_MAX_RETRIES", DEFAULT_MS_MAX_RETRIES),
            retry_delay_secs: env_parsed("MS_RETRY_DELAY_SECS", DEFAULT_MS_RETRY_DELAY_SECS),
            pagination_delay_ms: env_parsed("MS_PAGINATION_DELAY_MS", DEFAULT_MS_PAGINATION_DELAY_MS),
            heavy_delay_ms: env_parsed("MS_HEAVY_REQUEST_DELAY_MS", DEFAULT_MS_HEAVY_DELAY_MS),
            normal_per_minute: env_parsed("MS_NORMAL_PER_MINUTE", DEFAULT_MS_NORMAL_PER_MINUTE),
            heavy_per_minute: env_parsed("MS_HEAVY_PER_MINUTE", DEFAULT_MS_HEAVY_PER_MINUTE),
            page_limit: env_parsed("MS_PAGE_LIMIT", DEFAULT_MS_PAGE_LIMIT),
        }
    }

    pub fn require_token(&self) -> msync_common::Result<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| msync_common::SyncError::Config("MS_TOKEN is not set".to_string()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_secs(self.retry_delay_secs),
            max_delay: Duration::from_secs(120),
            rate_limit_wait: None,
        }
    }

    pub fn rate_limits(&self) -> RateLimits {
        RateLimits {
            normal_per_minute: self.normal_per_minute,
            heavy_per_minute: self.heavy_per_minute,
        }
    }

    pub fn pagination_delay(&self) -> Duration {
        Duration::from_millis(self.pagination_delay_ms)
    }

    pub fn heavy_delay(&self) -> Duration {
        Duration::from_millis(self.heavy_delay_ms)
    }
}

impl Default for MoyskladConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: DEFAULT_MS_URL.to_string(),
            timeout_secs: DEFAULT_MS_TIMEOUT_SECS,
            max_retries: DEFAULT_MS_MAX_RETRIES,
            retry_delay_secs: DEFAULT_MS_RETRY_DELAY_SECS,
            pagination_delay_ms: DEFAULT_MS_PAGINATION_DELAY_MS,
            heavy_delay_ms: DEFAULT_MS_HEAVY_DELAY_MS,
            normal_per_minute: DEFAULT_MS_NORMAL_PER_MINUTE,
            heavy_per_minute: DEFAULT_MS_HEAVY_PER_MINUTE,
            page_limit: DEFAULT_MS_PAGE_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig {
            database: DatabaseConfig::default(),
            wildberries: WbConfig::default(),
            ozon: OzonConfig::default(),
            moysklad: MoyskladConfig::default(),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_tokens_are_reported_per_provider() {
        let wb = WbConfig::default();
        assert!(wb.require_token().is_err());

        let ozon = OzonConfig::default();
        assert!(ozon.require_credentials().is_err());

        let ms = MoyskladConfig::default();
        assert!(ms.require_token().is_err());
    }

    #[test]
    fn test_pool_bounds_validation() {
        let mut config = AppConfig {
            database: DatabaseConfig::default(),
            wildberries: WbConfig::default(),
            ozon: OzonConfig::default(),
            moysklad: MoyskladConfig::default(),
        };
        config.database.min_connections = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wb_retry_policies() {
        let wb = WbConfig::default();

        let orders = wb.orders_retry_policy();
        assert_eq!(orders.rate_limit_wait, Some(Duration::from_secs(65)));

        let cards = wb.cards_retry_policy();
        assert_eq!(cards.rate_limit_wait, None);
        assert_eq!(cards.max_retries, DEFAULT_WB_MAX_RETRIES);
    }
}
