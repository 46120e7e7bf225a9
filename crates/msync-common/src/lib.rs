//! Shared types for msync components
//!
//! Holds the error taxonomy used across the sync engine and providers, plus
//! the logging initialization shared by every binary.

pub mod error;
pub mod logging;

pub use error::{Result, SyncError};
