use crate::config::types::{
    ApiConfig, Config, CrawlerConfig, ErrorSinkConfig, ItemSinkConfig, LoggingConfig,
    StorageConfig,
};
use crate::ConfigError;
use url::Url;

const MAX_WORKERS: usize = 256;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_storage_config(&config.storage)?;
    validate_crawler_config(&config.crawler)?;
    validate_item_sink_config(&config.item_sink)?;
    validate_error_sink_config(&config.error_sink)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' cannot carry a path",
            config.base_url
        )));
    }

    if config.token_path.is_empty() {
        return Err(ConfigError::Validation(
            "token-path cannot be empty".to_string(),
        ));
    }

    if config.lang.is_empty() {
        return Err(ConfigError::Validation("lang cannot be empty".to_string()));
    }

    require_positive_ms("request-timeout-ms", config.request_timeout_ms)
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and {}, got {}",
            MAX_WORKERS, config.workers
        )));
    }

    require_capacity("queue-capacity", config.queue_capacity)?;
    require_capacity("item-channel-capacity", config.item_channel_capacity)?;
    require_capacity("error-channel-capacity", config.error_channel_capacity)?;

    if config.requests_per_second < 1 {
        return Err(ConfigError::Validation(format!(
            "requests-per-second must be >= 1, got {}",
            config.requests_per_second
        )));
    }

    require_positive_ms("job-timeout-ms", config.job_timeout_ms)?;
    require_positive_ms("monitor-interval-ms", config.monitor_interval_ms)
}

fn validate_item_sink_config(config: &ItemSinkConfig) -> Result<(), ConfigError> {
    require_capacity("item-sink.batch-size", config.batch_size)?;
    require_positive_ms("item-sink.flush-interval-ms", config.flush_interval_ms)?;
    require_positive_ms("item-sink.write-timeout-ms", config.write_timeout_ms)?;
    require_positive_ms("item-sink.report-interval-ms", config.report_interval_ms)
}

fn validate_error_sink_config(config: &ErrorSinkConfig) -> Result<(), ConfigError> {
    require_capacity("error-sink.batch-size", config.batch_size)?;
    require_positive_ms("error-sink.flush-interval-ms", config.flush_interval_ms)?;
    require_positive_ms("error-sink.write-timeout-ms", config.write_timeout_ms)
}

fn validate_logging_config(config: &LoggingConfig) -> Result<(), ConfigError> {
    if config.directory.is_empty() {
        return Err(ConfigError::Validation(
            "logging directory cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn require_capacity(name: &str, value: usize) -> Result<(), ConfigError> {
    if value < 1 {
        return Err(ConfigError::Validation(format!(
            "{} must be >= 1, got {}",
            name, value
        )));
    }
    Ok(())
}

fn require_positive_ms(name: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation(format!("{} must be > 0", name)));
    }
    Ok(())
}
