//! # PowerMap - Regional electricity demand acquisition
//!
//! Periodically pulls the "demand forecast / actual usage" CSV feeds that
//! regional electric utilities publish, extracts the day's peak supply
//! capacity and the latest actual usage, and keeps an always-current
//! per-source snapshot for consumers such as a map or dashboard.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration, defaults and validation
//! - `logging`: Structured logging and tracing
//! - `clock`: Local wall-clock time in the configured timezone
//! - `source`: Source descriptions, per-source state and snapshots
//! - `fetcher`: HTTP retrieval with retries, deadline and text decoding
//! - `parse`: Record splitting, header location and usage extraction
//! - `scheduler`: Per-source polling loops with adaptive intervals

pub mod clock;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod parse;
pub mod scheduler;
pub mod source;

// Re-export commonly used types
pub use config::Config;
pub use error::{PowerMapError, Result};
pub use scheduler::{Scheduler, SourceHandle};
pub use source::{Source, SourceSnapshot, SourceState};
