//! Storage module for persisting pipeline state
//!
//! This module handles all database operations for the pipeline, including:
//! - SQLite database initialization and schema management
//! - Item persistence and publish-status tracking
//! - Checkpoint load/advance with a single-writer discipline

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{Store, StorageError, StorageResult};

use serde::Serialize;
use std::fmt;

/// Publish status of a stored item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    /// Item is stored but has not been handed to the publisher yet
    Pending,

    /// Publisher accepted the item
    Published,

    /// Media download or publish failed terminally for this item
    Failed,
}

impl PublishStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Published => "published",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "published" => Some(Self::Published),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// A newly discovered item, not yet persisted
#[derive(Debug, Clone)]
pub struct NewItem {
    /// Stable key derived from the source URL slug
    pub source_id: String,
    pub title: String,
    pub source_url: String,
    pub description: String,
    /// Media URLs in listing order
    pub media_urls: Vec<String>,
}

/// A persisted item
#[derive(Debug, Clone, Serialize)]
pub struct ItemRecord {
    pub id: i64,
    pub source_id: String,
    pub title: String,
    pub source_url: String,
    pub description: String,
    pub media_urls: Vec<String>,
    /// Local artifact paths, present once media is materialized
    pub artifact_paths: Option<Vec<String>>,
    pub discovered_at: String,
    pub published_at: Option<String>,
    pub publish_status: PublishStatus,
    pub failure_reason: Option<String>,
    /// Media download attempts consumed when the item was finalized
    pub retry_count: u32,
}

/// Ingestion progress marker.
///
/// Items are ordered by `source_id` lexical comparison; this ordering is
/// stable across versions because it determines how far each cycle re-scans
/// the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// `source_id` of the newest fully resolved item; empty on first run
    pub last_item_id: String,
    pub updated_at: Option<String>,
}

impl Checkpoint {
    /// Zero-value sentinel returned before any cycle has completed
    pub fn unset() -> Self {
        Self {
            last_item_id: String::new(),
            updated_at: None,
        }
    }

    pub fn is_unset(&self) -> bool {
        self.last_item_id.is_empty()
    }

    /// Returns true if `candidate_id` is strictly newer than this
    /// checkpoint under source-native ordering. Ties never advance.
    pub fn admits(&self, candidate_id: &str) -> bool {
        self.is_unset() || candidate_id > self.last_item_id.as_str()
    }
}
