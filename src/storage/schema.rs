//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the sharedbox-sync database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Shared boxes tagged with the parent they were discovered under
CREATE TABLE IF NOT EXISTS sharedboxes (
    node TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    drive_path TEXT NOT NULL,
    parent_node TEXT NOT NULL,
    synced_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sharedboxes_parent ON sharedboxes(parent_node);

-- Item-only snapshot written by the import command
CREATE TABLE IF NOT EXISTS sharedbox_items (
    node TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    drive_path TEXT NOT NULL,
    synced_at TEXT NOT NULL
);

-- Users, stored as their full JSON record
CREATE TABLE IF NOT EXISTS users (
    user_seq TEXT PRIMARY KEY,
    record TEXT NOT NULL,
    synced_at TEXT NOT NULL
);

-- Append-only error lists keyed by "<session>:errors:<operation>"
CREATE TABLE IF NOT EXISTS error_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    list_key TEXT NOT NULL,
    message TEXT NOT NULL,
    appended_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_error_log_key ON error_log(list_key);
"#;

/// Initializes the database schema
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
