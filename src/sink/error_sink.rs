//! Error sink: failure records to the durable error log

use crate::model::NodeError;
use crate::sink::BatchSettings;
use crate::storage::ErrorLog;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Counters returned once the sink has drained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorSinkReport {
    pub received: u64,
    pub appended: u64,
    pub failed_batches: u64,
}

/// Starts the error sink, appending to the list named `key`
///
/// Flush failures are logged and the batch is lost; nothing is retried.
pub fn spawn_error_sink(
    log: Arc<dyn ErrorLog>,
    key: String,
    mut rx: mpsc::Receiver<NodeError>,
    settings: BatchSettings,
) -> JoinHandle<ErrorSinkReport> {
    tokio::spawn(async move {
        let batch_size = settings.batch_size.max(1);
        let mut report = ErrorSinkReport::default();
        let mut buffer: Vec<String> = Vec::with_capacity(batch_size);

        let mut tick = interval_at(
            Instant::now() + settings.flush_interval,
            settings.flush_interval,
        );
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(error) => {
                        report.received += 1;
                        buffer.push(error.to_string());
                        if buffer.len() >= batch_size {
                            flush(log.as_ref(), &key, &mut buffer, &settings, &mut report).await;
                            tick.reset();
                        }
                    }
                    None => break,
                },
                _ = tick.tick() => {
                    if !buffer.is_empty() {
                        flush(log.as_ref(), &key, &mut buffer, &settings, &mut report).await;
                    }
                }
            }
        }

        if !buffer.is_empty() {
            flush(log.as_ref(), &key, &mut buffer, &settings, &mut report).await;
        }

        tracing::info!(
            key = %key,
            received = report.received,
            appended = report.appended,
            "Error sink finished"
        );
        report
    })
}

async fn flush(
    log: &dyn ErrorLog,
    key: &str,
    buffer: &mut Vec<String>,
    settings: &BatchSettings,
    report: &mut ErrorSinkReport,
) {
    let batch = std::mem::take(buffer);
    let len = batch.len();

    match tokio::time::timeout(settings.write_timeout, log.append(key, batch)).await {
        Ok(Ok(written)) => {
            report.appended += written;
            tracing::debug!(key, entries = written, "Appended error batch");
        }
        Ok(Err(e)) => {
            report.failed_batches += 1;
            tracing::error!(key, entries = len, error = %e, "Failed to append error batch");
        }
        Err(_) => {
            report.failed_batches += 1;
            tracing::error!(
                key,
                entries = len,
                timeout = ?settings.write_timeout,
                "Error batch write timed out"
            );
        }
    }
}
