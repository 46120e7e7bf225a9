//! msync-ingest - marketplace data sync tool
//!
//! One subcommand per sync stream; cron drives the schedule. The process
//! exits non-zero when a run fails, regardless of whether its log row could
//! be written.

use anyhow::Result;
use clap::Parser;
use msync_common::logging::{init_logging, LogConfig, LogLevel};
use msync_ingest::config::AppConfig;
use msync_ingest::{db, moysklad, ozon, wildberries};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "msync-ingest")]
#[command(author, version, about = "Marketplace data sync tool")]
struct Cli {
    /// Sync stream to run
    #[command(subcommand)]
    stream: Stream,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Stream {
    /// Sync Wildberries supplier orders
    WbOrders,

    /// Sync Wildberries product cards
    WbCards,

    /// Sync Wildberries warehouse remains
    WbRemains,

    /// Sync Ozon FBO/FBS postings
    OzonOrders,

    /// Sync Ozon product stocks
    OzonStocks,

    /// Sync MoySklad warehouse stock
    Moysklad,

    /// Show recent sync runs
    Status {
        /// Filter by entity type (e.g. "wb-orders")
        #[arg(short, long)]
        entity: Option<String>,

        /// Number of runs to show
        #[arg(short, long, default_value_t = 10)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::from_env()
        .unwrap_or_default()
        .with_level(log_level)
        .with_file_prefix("msync-ingest");
    init_logging(&log_config)?;

    let config = AppConfig::load()?;
    let pool = db::connect(&config.database).await?;
    db::run_migrations(&pool).await?;

    match cli.stream {
        Stream::WbOrders => wildberries::orders::sync_orders(pool, &config).await?,
        Stream::WbCards => wildberries::cards::sync_cards(pool, &config).await?,
        Stream::WbRemains => wildberries::remains::sync_remains(pool, &config).await?,
        Stream::OzonOrders => ozon::orders::sync_orders(pool, &config).await?,
        Stream::OzonStocks => ozon::stocks::sync_stocks(pool, &config).await?,
        Stream::Moysklad => moysklad::stocks::sync_stocks(pool, &config).await?,
        Stream::Status { entity, limit } => {
            let runs = msync_core::runlog::recent_runs(&pool, entity.as_deref(), limit).await?;
            if runs.is_empty() {
                info!("no sync runs recorded yet");
            }
            for run in runs {
                info!(
                    id = run.id,
                    entity = %run.entity_type,
                    status = %run.status,
                    records = run.records_count,
                    pages = run.pages_count,
                    seconds = run.execution_time_seconds,
                    scheme = run.scheme.as_deref().unwrap_or("-"),
                    error = run.error_message.as_deref().unwrap_or("-"),
                    at = %run.sync_at,
                    "sync run"
                );
            }
        },
    }

    Ok(())
}
