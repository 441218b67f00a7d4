//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Ferrotype database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Discovered items and their publish status
CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    source_url TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    media_urls TEXT NOT NULL DEFAULT '[]',
    artifact_paths TEXT,
    discovered_at TEXT NOT NULL,
    published_at TEXT,
    publish_status TEXT NOT NULL DEFAULT 'pending',
    failure_reason TEXT,
    retry_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_items_source_id ON items(source_id);
CREATE INDEX IF NOT EXISTS idx_items_status ON items(publish_status);
CREATE INDEX IF NOT EXISTS idx_items_discovered ON items(discovered_at);

-- Single-row ingestion progress marker
CREATE TABLE IF NOT EXISTS checkpoint (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    last_item_id TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
