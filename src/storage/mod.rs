//! Storage module for persisting synced data
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Bulk upserts of shared boxes, items and users
//! - The append-only error log

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{SqliteItemStore, SqliteStore};
pub use traits::{ErrorLog, ItemStore, StorageError, StorageResult, UpsertSummary};

use std::path::Path;

/// Opens the database at `path`, creating it if needed
pub fn open_storage(path: &Path) -> StorageResult<SqliteStore> {
    SqliteStore::open(path)
}

/// Target table of a bulk upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// Parent-tagged shared boxes, keyed by `item.node`
    SharedBoxes,
    /// Item-only snapshot, keyed by `node`
    Items,
    /// Users, keyed by `user_seq`
    Users,
}

impl Collection {
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::SharedBoxes => "sharedboxes",
            Self::Items => "sharedbox_items",
            Self::Users => "users",
        }
    }
}
