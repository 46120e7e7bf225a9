//! MoySklad data source
//!
//! Offset pagination under two rate classes: entity listings count against
//! the normal per-minute ceiling, the stock-by-store report against the much
//! stricter heavy ceiling.

pub mod client;
pub mod models;
pub mod stocks;
pub mod storage;

pub use client::MoyskladClient;
