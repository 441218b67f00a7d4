//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{Checkpoint, ItemRecord, NewItem, PublishStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// An item with the same source_id already exists. Idempotent callers
    /// treat this as success-already-done, not as a cycle failure.
    #[error("Item already exists: {0}")]
    Conflict(String),

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Returns true if the store itself is unreachable (cycle-fatal)
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// All writes go through a single logical writer: callers hold the store
/// behind a mutex and every method runs to completion before the next
/// write begins.
pub trait Store {
    // ===== Items =====

    /// Checks whether an item with this source_id is already stored
    fn exists(&self, source_id: &str) -> StorageResult<bool>;

    /// Inserts a new item in `pending` status
    ///
    /// Returns `StorageError::Conflict` if the source_id is already present.
    fn insert_item(&mut self, item: &NewItem) -> StorageResult<i64>;

    /// Gets an item by source_id
    fn get_item(&self, source_id: &str) -> StorageResult<Option<ItemRecord>>;

    /// Records the local artifact paths for an item after its media set
    /// has been fully materialized
    fn set_artifacts(&mut self, source_id: &str, paths: &[String], attempts: u32)
        -> StorageResult<()>;

    /// Marks an item as published
    fn mark_published(&mut self, source_id: &str, published_at: &str) -> StorageResult<()>;

    /// Marks an item as terminally failed with a reason
    fn mark_failed(&mut self, source_id: &str, reason: &str) -> StorageResult<()>;

    /// Gets the most recently discovered items, newest-first
    fn latest_items(&self, limit: u32) -> StorageResult<Vec<ItemRecord>>;

    /// Gets items whose publish_status is not `published`, newest-first
    fn unpublished_items(&self, limit: u32) -> StorageResult<Vec<ItemRecord>>;

    // ===== Counts =====

    fn count_items(&self) -> StorageResult<u64>;

    fn count_by_status(&self, status: PublishStatus) -> StorageResult<u64>;

    /// Items discovered at or after the given RFC 3339 timestamp
    fn count_added_since(&self, since: &str) -> StorageResult<u64>;

    /// Items published at or after the given RFC 3339 timestamp
    fn count_published_since(&self, since: &str) -> StorageResult<u64>;

    // ===== Checkpoint =====

    /// Loads the checkpoint, or the unset sentinel on first run
    fn load_checkpoint(&self) -> StorageResult<Checkpoint>;

    /// Advances the checkpoint if `candidate_id` is strictly newer under
    /// source-native ordering; no-ops otherwise
    fn advance_checkpoint(&mut self, candidate_id: &str) -> StorageResult<()>;

    /// Finalizes an item and advances the checkpoint in one transaction
    ///
    /// The status write and the checkpoint advance are grouped so a crash
    /// between them can never leave the checkpoint ahead of an item that
    /// is still pending.
    fn finalize_item(
        &mut self,
        source_id: &str,
        status: PublishStatus,
        reason: Option<&str>,
        published_at: Option<&str>,
    ) -> StorageResult<()>;

    /// Clears the checkpoint row
    fn reset_checkpoint(&mut self) -> StorageResult<()>;

    // ===== Operator actions =====

    /// Clears all items and the checkpoint. Destructive; never called by
    /// the ingestion cycle itself.
    fn purge(&mut self) -> StorageResult<()>;
}
