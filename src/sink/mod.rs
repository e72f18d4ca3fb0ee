//! Batched writers at the end of the pipeline
//!
//! - The item sink turns discovered edges into bulk upserts
//! - The error sink appends failure records to the durable error log
//!
//! Both buffer their input and flush on size, on a timer and once more when
//! the input channel closes.

mod error_sink;
mod item_sink;

pub use error_sink::{spawn_error_sink, ErrorSinkReport};
pub use item_sink::{spawn_item_sink, ItemSinkReport};

use crate::config::{ErrorSinkConfig, ItemSinkConfig};
use crate::model::NodeError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Flush policy shared by both sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub write_timeout: Duration,
}

impl From<&ErrorSinkConfig> for BatchSettings {
    fn from(config: &ErrorSinkConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            flush_interval: Duration::from_millis(config.flush_interval_ms),
            write_timeout: Duration::from_millis(config.write_timeout_ms),
        }
    }
}

/// Item sink flush policy plus its progress report cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemSinkSettings {
    pub batch: BatchSettings,
    pub report_interval: Duration,
}

impl From<&ItemSinkConfig> for ItemSinkSettings {
    fn from(config: &ItemSinkConfig) -> Self {
        Self {
            batch: BatchSettings {
                batch_size: config.batch_size,
                flush_interval: Duration::from_millis(config.flush_interval_ms),
                write_timeout: Duration::from_millis(config.write_timeout_ms),
            },
            report_interval: Duration::from_millis(config.report_interval_ms),
        }
    }
}

/// Non-blocking handle onto the error sink's input
///
/// Reporting never waits: when the channel is full or already closed the
/// error is dropped and a warning is logged locally.
#[derive(Clone)]
pub struct ErrorReporter {
    tx: mpsc::Sender<NodeError>,
    dropped: Arc<AtomicU64>,
}

impl ErrorReporter {
    pub fn new(tx: mpsc::Sender<NodeError>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Forwards `error` to the error sink if there is room
    pub fn report(&self, error: NodeError) -> bool {
        match self.tx.try_send(error) {
            Ok(()) => true,
            Err(TrySendError::Full(error)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%error, "Error channel full, dropping error");
                false
            }
            Err(TrySendError::Closed(error)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%error, "Error channel closed, dropping error");
                false
            }
        }
    }

    /// Errors dropped by this reporter and all of its clones
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Handle onto the drop count that does not keep the channel open
    pub fn dropped_counter(&self) -> DroppedErrors {
        DroppedErrors(self.dropped.clone())
    }
}

/// Read-only view of an `ErrorReporter`'s drop count
#[derive(Clone)]
pub struct DroppedErrors(Arc<AtomicU64>);

impl DroppedErrors {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
