//! Ozon seller API data source
//!
//! FBO postings paginate by offset against a reported total, FBS postings and
//! the product list paginate by a `last_id` continuation token.

pub mod client;
pub mod models;
pub mod orders;
pub mod stocks;
pub mod storage;

pub use client::OzonClient;
