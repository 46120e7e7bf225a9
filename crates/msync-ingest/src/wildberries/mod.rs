//! Wildberries data source
//!
//! Three API surfaces share one bearer token:
//!
//! - statistics API: supplier orders, one request per minute, 80k-record pages
//! - content API: product cards behind a server-issued cursor
//! - seller-analytics API: warehouse remains as an asynchronous report task

pub mod cards;
pub mod client;
pub mod models;
pub mod orders;
pub mod remains;
pub mod storage;

pub use client::WbClient;
