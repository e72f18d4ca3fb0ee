use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for sharedbox-sync
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub crawler: CrawlerConfig,
    #[serde(rename = "item-sink")]
    pub item_sink: ItemSinkConfig,
    #[serde(rename = "error-sink")]
    pub error_sink: ErrorSinkConfig,
    pub logging: LoggingConfig,
}

/// Admin API access
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ApiConfig {
    /// Base URL the list endpoints are resolved against
    pub base_url: String,

    /// Path to the JSON token file written by the login flow
    pub token_path: String,

    /// Value of the `lang` query parameter
    pub lang: String,

    /// Transport-level timeout for a single HTTP request (milliseconds)
    pub request_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.directcloud.jp/openapp/m1".to_string(),
            token_path: "admin_token.json".to_string(),
            lang: "eng".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Local datastore
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "sharedbox.db".to_string(),
        }
    }
}

/// Worker pool, queues and rate limiting
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Number of discovery workers
    pub workers: usize,

    /// Capacity of the pending node queue
    pub queue_capacity: usize,

    /// Capacity of the channel feeding the item sink
    pub item_channel_capacity: usize,

    /// Capacity of the channel feeding the error sink
    pub error_channel_capacity: usize,

    /// Ceiling on outbound list requests across all workers
    pub requests_per_second: u32,

    /// Budget for one job: limiter wait plus fetch (milliseconds)
    pub job_timeout_ms: u64,

    /// How often the pipeline monitor logs queue occupancy (milliseconds)
    pub monitor_interval_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 20,
            queue_capacity: 5000,
            item_channel_capacity: 1000,
            error_channel_capacity: 40,
            requests_per_second: 40,
            job_timeout_ms: 3000,
            monitor_interval_ms: 5000,
        }
    }
}

impl CrawlerConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}

/// Batching policy of the primary store sink
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ItemSinkConfig {
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub write_timeout_ms: u64,
    /// How often cumulative upsert counters are logged (milliseconds)
    pub report_interval_ms: u64,
}

impl Default for ItemSinkConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            flush_interval_ms: 3000,
            write_timeout_ms: 15_000,
            report_interval_ms: 15_000,
        }
    }
}

/// Batching policy of the error log sink
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ErrorSinkConfig {
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for ErrorSinkConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval_ms: 3000,
            write_timeout_ms: 3000,
        }
    }
}

/// Log file output
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoggingConfig {
    /// Directory receiving `debug-<date>.log`
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: "logs".to_string(),
        }
    }
}
