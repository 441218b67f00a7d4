//! Ferrotype: a photo-blog ingestion pipeline
//!
//! This crate scrapes a photo-blog style content source, deduplicates
//! discovered posts against a SQLite store, downloads post images with
//! bounded concurrency and retry, hands finished posts to a publisher,
//! and tracks a checkpoint so repeated runs never re-send an item.

pub mod config;
pub mod fetch;
pub mod health;
pub mod media;
pub mod metrics;
pub mod pipeline;
pub mod publish;
pub mod server;
pub mod storage;

use thiserror::Error;

/// Main error type for Ferrotype operations
#[derive(Debug, Error)]
pub enum FerrotypeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetch::FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Publish error: {0}")]
    Publish(#[from] publish::PublishError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FerrotypeError {
    /// Returns true if this error aborts the whole cycle rather than a
    /// single item. The checkpoint must not advance past a fatal failure.
    pub fn is_cycle_fatal(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_source_unavailable(),
            Self::Storage(e) => e.is_unavailable(),
            _ => false,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector: {0}")]
    InvalidSelector(String),
}

/// Result type alias for Ferrotype operations
pub type Result<T> = std::result::Result<T, FerrotypeError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use health::{HealthStatus, HealthTracker};
pub use metrics::Metrics;
pub use pipeline::{CycleOutcome, Orchestrator};
pub use storage::{Checkpoint, ItemRecord, PublishStatus, SqliteStore, Store};
