//! Storage traits and error types
//!
//! The sinks only see these traits, so tests can swap in fakes and the
//! SQLite backend stays an implementation detail.

use crate::model::DiscoveredEdge;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record is missing its key field '{0}'")]
    MissingKey(&'static str),

    #[error("Storage connection lock poisoned")]
    LockPoisoned,

    #[error("Storage task failed: {0}")]
    Task(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Outcome of one bulk upsert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    /// Keys that did not exist before the write
    pub inserted: u64,
    /// Keys whose stored record was replaced
    pub replaced: u64,
}

impl UpsertSummary {
    pub fn absorb(&mut self, other: UpsertSummary) {
        self.inserted += other.inserted;
        self.replaced += other.replaced;
    }
}

/// Primary store written by the item sink
///
/// One call is one atomic batch: either every edge is upserted or none is.
/// Records are keyed by `item.node` and replaced wholesale.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn upsert_edges(&self, edges: Vec<DiscoveredEdge>) -> StorageResult<UpsertSummary>;
}

/// Durable append-only lists written by the error sink
#[async_trait]
pub trait ErrorLog: Send + Sync {
    /// Appends `messages` to the list named `key` in one write, returning
    /// the number of entries written
    async fn append(&self, key: &str, messages: Vec<String>) -> StorageResult<u64>;
}
