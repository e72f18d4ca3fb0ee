//! Configuration module for sharedbox-sync
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section has defaults, so running without a config file works.
//!
//! # Example
//!
//! ```no_run
//! use sharedbox_sync::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sbsync.toml")).unwrap();
//! println!("Crawler will use {} workers", config.crawler.workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ApiConfig, Config, CrawlerConfig, ErrorSinkConfig, ItemSinkConfig, LoggingConfig,
    StorageConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
