//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Store trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{StorageError, StorageResult, Store};
use crate::storage::{Checkpoint, ItemRecord, NewItem, PublishStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Creates a new SqliteStore instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing and smoke runs)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Probes the store; used by the health endpoint
    pub fn ping(&self) -> bool {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<ItemRecord> {
        let media_urls: String = row.get(5)?;
        let artifact_paths: Option<String> = row.get(6)?;
        let status: String = row.get(9)?;

        Ok(ItemRecord {
            id: row.get(0)?,
            source_id: row.get(1)?,
            title: row.get(2)?,
            source_url: row.get(3)?,
            description: row.get(4)?,
            media_urls: decode_json_column(5, &media_urls)?,
            artifact_paths: artifact_paths
                .map(|raw| decode_json_column(6, &raw))
                .transpose()?,
            discovered_at: row.get(7)?,
            published_at: row.get(8)?,
            publish_status: PublishStatus::from_db_string(&status).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    9,
                    rusqlite::types::Type::Text,
                    format!("Unknown publish status: {}", status).into(),
                )
            })?,
            failure_reason: row.get(10)?,
            retry_count: row.get(11)?,
        })
    }

    fn query_items(&self, sql: &str, limit: u32) -> StorageResult<Vec<ItemRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let items = stmt
            .query_map(params![limit], Self::row_to_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    const ITEM_COLUMNS: &'static str = "id, source_id, title, source_url, description, \
         media_urls, artifact_paths, discovered_at, published_at, publish_status, \
         failure_reason, retry_count";
}

/// Decodes a JSON array column, mapping bad data to a conversion error
fn decode_json_column(index: usize, raw: &str) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}

impl Store for SqliteStore {
    // ===== Items =====

    fn exists(&self, source_id: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM items WHERE source_id = ?1",
                params![source_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn insert_item(&mut self, item: &NewItem) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        let media_urls = serde_json::to_string(&item.media_urls)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let result = self.conn.execute(
            "INSERT INTO items (source_id, title, source_url, description, media_urls, \
             discovered_at, publish_status) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                item.source_id,
                item.title,
                item.source_url,
                item.description,
                media_urls,
                now,
                PublishStatus::Pending.to_db_string()
            ],
        );

        match result {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::Conflict(item.source_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get_item(&self, source_id: &str) -> StorageResult<Option<ItemRecord>> {
        let sql = format!(
            "SELECT {} FROM items WHERE source_id = ?1",
            Self::ITEM_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let item = stmt
            .query_row(params![source_id], Self::row_to_item)
            .optional()?;
        Ok(item)
    }

    fn set_artifacts(
        &mut self,
        source_id: &str,
        paths: &[String],
        attempts: u32,
    ) -> StorageResult<()> {
        let encoded = serde_json::to_string(paths)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let changed = self.conn.execute(
            "UPDATE items SET artifact_paths = ?1, retry_count = ?2 WHERE source_id = ?3",
            params![encoded, attempts, source_id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(source_id.to_string()));
        }
        Ok(())
    }

    fn mark_published(&mut self, source_id: &str, published_at: &str) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE items SET publish_status = ?1, published_at = ?2, failure_reason = NULL \
             WHERE source_id = ?3",
            params![
                PublishStatus::Published.to_db_string(),
                published_at,
                source_id
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(source_id.to_string()));
        }
        Ok(())
    }

    fn mark_failed(&mut self, source_id: &str, reason: &str) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE items SET publish_status = ?1, failure_reason = ?2 WHERE source_id = ?3",
            params![PublishStatus::Failed.to_db_string(), reason, source_id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(source_id.to_string()));
        }
        Ok(())
    }

    fn latest_items(&self, limit: u32) -> StorageResult<Vec<ItemRecord>> {
        let sql = format!(
            "SELECT {} FROM items ORDER BY source_id DESC LIMIT ?1",
            Self::ITEM_COLUMNS
        );
        self.query_items(&sql, limit)
    }

    fn unpublished_items(&self, limit: u32) -> StorageResult<Vec<ItemRecord>> {
        let sql = format!(
            "SELECT {} FROM items WHERE publish_status != 'published' \
             ORDER BY source_id DESC LIMIT ?1",
            Self::ITEM_COLUMNS
        );
        self.query_items(&sql, limit)
    }

    // ===== Counts =====

    fn count_items(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_by_status(&self, status: PublishStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM items WHERE publish_status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_added_since(&self, since: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM items WHERE discovered_at >= ?1",
            params![since],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_published_since(&self, since: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM items WHERE published_at IS NOT NULL AND published_at >= ?1",
            params![since],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Checkpoint =====

    fn load_checkpoint(&self) -> StorageResult<Checkpoint> {
        let row = self
            .conn
            .query_row(
                "SELECT last_item_id, updated_at FROM checkpoint WHERE id = 1",
                [],
                |row| {
                    Ok(Checkpoint {
                        last_item_id: row.get(0)?,
                        updated_at: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row.unwrap_or_else(Checkpoint::unset))
    }

    fn advance_checkpoint(&mut self, candidate_id: &str) -> StorageResult<()> {
        let current = self.load_checkpoint()?;
        if !current.admits(candidate_id) {
            tracing::debug!(
                "Checkpoint not advanced: {} is not newer than {}",
                candidate_id,
                current.last_item_id
            );
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO checkpoint (id, last_item_id, updated_at) VALUES (1, ?1, ?2) \
             ON CONFLICT(id) DO UPDATE SET last_item_id = ?1, updated_at = ?2",
            params![candidate_id, now],
        )?;
        Ok(())
    }

    fn finalize_item(
        &mut self,
        source_id: &str,
        status: PublishStatus,
        reason: Option<&str>,
        published_at: Option<&str>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();

        let tx = self.conn.transaction()?;

        let changed = tx.execute(
            "UPDATE items SET publish_status = ?1, failure_reason = ?2, published_at = ?3 \
             WHERE source_id = ?4",
            params![status.to_db_string(), reason, published_at, source_id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(source_id.to_string()));
        }

        // Advance the checkpoint in the same transaction. Items are
        // finalized oldest-first within a cycle, so the just-resolved item
        // is always the newest one with no unresolved item behind it.
        let current: Option<String> = tx
            .query_row(
                "SELECT last_item_id FROM checkpoint WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let admits = match &current {
            Some(last) => source_id > last.as_str(),
            None => true,
        };
        if admits {
            tx.execute(
                "INSERT INTO checkpoint (id, last_item_id, updated_at) VALUES (1, ?1, ?2) \
                 ON CONFLICT(id) DO UPDATE SET last_item_id = ?1, updated_at = ?2",
                params![source_id, now],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn reset_checkpoint(&mut self) -> StorageResult<()> {
        self.conn.execute("DELETE FROM checkpoint", [])?;
        Ok(())
    }

    // ===== Operator actions =====

    fn purge(&mut self) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM items", [])?;
        tx.execute("DELETE FROM checkpoint", [])?;
        tx.commit()?;
        Ok(())
    }
}
