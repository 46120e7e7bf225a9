//! msync ingest library
//!
//! Provider adapters and sync entry points for the marketplace data hub.
//!
//! # Data sources
//!
//! - **Wildberries**: supplier orders (statistics API), product cards
//!   (content API), warehouse remains (seller-analytics report API)
//! - **Ozon**: FBO/FBS postings and product stocks (seller API)
//! - **MoySklad**: warehouse stock report with per-store details and
//!   per-product aggregates
//!
//! Each source composes the engine pieces from `msync-core`: the pagination
//! driver, the retrying transport, the rate limiter where the provider needs
//! one, checkpointed cursors and the batch upsert engine.

pub mod config;
pub mod db;
pub mod moysklad;
pub mod ozon;
pub mod wildberries;
pub mod window;
