//! Crawler module for walking the shared box tree
//!
//! This module contains the crawl pipeline, including:
//! - The shared request throttle
//! - The bounded node queue and pending-job counter
//! - The worker pool coordinator
//! - Wiring the coordinator to the item and error sinks

mod coordinator;
mod limiter;
mod pending;
mod queue;

pub use coordinator::{Coordinator, CrawlSettings, CrawlStats};
pub use limiter::ApiRateLimiter;
pub use pending::PendingJobs;
pub use queue::NodeQueue;

use crate::config::Config;
use crate::gateway::FetchGateway;
use crate::model::NodeId;
use crate::sink::{
    spawn_error_sink, spawn_item_sink, BatchSettings, ErrorReporter, ErrorSinkReport,
    ItemSinkReport, ItemSinkSettings,
};
use crate::storage::{ErrorLog, ItemStore};
use crate::SyncError;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Everything one pipeline run needs besides its root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub crawl: CrawlSettings,
    pub item_channel_capacity: usize,
    pub error_channel_capacity: usize,
    pub item_sink: ItemSinkSettings,
    pub error_sink: BatchSettings,
    /// Durable list the error sink appends to
    pub error_list_key: String,
}

impl PipelineSettings {
    pub fn from_config(config: &Config, recursive: bool, error_list_key: String) -> Self {
        Self {
            crawl: CrawlSettings {
                workers: config.crawler.workers,
                queue_capacity: config.crawler.queue_capacity,
                job_timeout: config.crawler.job_timeout(),
                recursive,
                monitor_interval: config.crawler.monitor_interval(),
            },
            item_channel_capacity: config.crawler.item_channel_capacity,
            error_channel_capacity: config.crawler.error_channel_capacity,
            item_sink: ItemSinkSettings::from(&config.item_sink),
            error_sink: BatchSettings::from(&config.error_sink),
            error_list_key,
        }
    }
}

/// Collaborators of a pipeline run
pub struct Pipeline {
    pub gateway: Arc<dyn FetchGateway>,
    pub limiter: ApiRateLimiter,
    pub item_store: Arc<dyn ItemStore>,
    pub error_log: Arc<dyn ErrorLog>,
    pub settings: PipelineSettings,
}

/// Counters of a finished pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub crawl: CrawlStats,
    pub items: ItemSinkReport,
    pub errors: ErrorSinkReport,
    /// Errors dropped because the error channel was full
    pub dropped_errors: u64,
}

/// Runs a complete crawl from `root` into the stores
///
/// This is the main entry point for a sync. It will:
/// 1. Start the error sink and the item sink
/// 2. Crawl the tree with the worker pool
/// 3. Close the item channel once every worker has exited
/// 4. Wait for the item sink's final flush, then the error sink's
///
/// Per-node failures are recorded and never abort the run. Only a crashed
/// sink task is returned as an error.
pub async fn run_pipeline(
    pipeline: Pipeline,
    root: NodeId,
    cancel: CancellationToken,
) -> Result<PipelineReport, SyncError> {
    let Pipeline {
        gateway,
        limiter,
        item_store,
        error_log,
        settings,
    } = pipeline;

    let (item_tx, item_rx) = mpsc::channel(settings.item_channel_capacity.max(1));
    let (error_tx, error_rx) = mpsc::channel(settings.error_channel_capacity.max(1));
    let reporter = ErrorReporter::new(error_tx);

    let error_sink = spawn_error_sink(
        error_log,
        settings.error_list_key.clone(),
        error_rx,
        settings.error_sink,
    );
    let item_sink = spawn_item_sink(item_store, item_rx, reporter.clone(), settings.item_sink);

    let coordinator = Coordinator::new(gateway, limiter, settings.crawl);
    let crawl = coordinator
        .run(root, item_tx, reporter.clone(), cancel)
        .await;

    // The item sink now holds the last reporter
    let dropped_errors = reporter.dropped_counter();
    drop(reporter);

    let items = item_sink.await?;
    let errors = error_sink.await?;

    let report = PipelineReport {
        crawl,
        items,
        errors,
        dropped_errors: dropped_errors.get(),
    };
    tracing::info!(
        fetches = report.crawl.jobs,
        edges = report.crawl.edges,
        node_errors = report.crawl.node_errors,
        items_flushed = report.items.flushed_items,
        failed_batches = report.items.failed_batches,
        errors_logged = report.errors.appended,
        dropped_errors = report.dropped_errors,
        "Pipeline finished"
    );
    Ok(report)
}
