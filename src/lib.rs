//! sharedbox-sync: mirrors a remote shared-box tree into a local datastore
//!
//! This crate crawls the shared-box hierarchy exposed by the admin API with a
//! bounded, rate-limited worker pool and streams every discovered node into
//! batched SQLite upserts, recording per-node failures in a durable error log.

pub mod config;
pub mod crawler;
pub mod gateway;
pub mod model;
pub mod sink;
pub mod storage;
pub mod users;

use thiserror::Error;

/// Main error type for sharedbox-sync operations
///
/// Everything that reaches this type aborts the command. Per-node fetch
/// failures and failed batch writes never do: they are recorded in the
/// error log and the crawl carries on. Configuration errors are reported
/// before a command starts and keep their own type.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Credential error: {0}")]
    Credential(#[from] gateway::CredentialError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] gateway::FetchError),

    #[error("Write outcome unknown after timeout of {0:?}")]
    WriteTimeout(std::time::Duration),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
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
}

/// Result type alias for sharedbox-sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run_pipeline, Pipeline, PipelineReport};
pub use model::{DiscoveredEdge, Item, NodeError, NodeId, Operation};
