//! Item sink: discovered edges to bulk upserts

use crate::model::{DiscoveredEdge, NodeError};
use crate::sink::{ErrorReporter, ItemSinkSettings};
use crate::storage::{ItemStore, UpsertSummary};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Counters returned once the sink has drained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemSinkReport {
    pub flushed_batches: u64,
    pub flushed_items: u64,
    /// Batches that failed, or whose write timed out with an unknown outcome
    pub failed_batches: u64,
    pub failed_items: u64,
    pub upserts: UpsertSummary,
}

struct ItemSink {
    store: Arc<dyn ItemStore>,
    errors: ErrorReporter,
    settings: ItemSinkSettings,
    report: ItemSinkReport,
}

/// Starts the item sink
///
/// The task ends after `rx` closes and the remaining buffer has been
/// flushed. `errors` is dropped when the task ends, so an error channel fed
/// only by this reporter closes after the final flush.
pub fn spawn_item_sink(
    store: Arc<dyn ItemStore>,
    rx: mpsc::Receiver<DiscoveredEdge>,
    errors: ErrorReporter,
    settings: ItemSinkSettings,
) -> JoinHandle<ItemSinkReport> {
    let sink = ItemSink {
        store,
        errors,
        settings,
        report: ItemSinkReport::default(),
    };
    tokio::spawn(sink.run(rx))
}

impl ItemSink {
    async fn run(mut self, mut rx: mpsc::Receiver<DiscoveredEdge>) -> ItemSinkReport {
        let batch_size = self.settings.batch.batch_size.max(1);
        let flush_interval = self.settings.batch.flush_interval;
        let report_interval = self.settings.report_interval;

        let start = Instant::now();
        let mut flush_tick = interval_at(start + flush_interval, flush_interval);
        flush_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut report_tick = interval_at(start + report_interval, report_interval);
        report_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut buffer: Vec<DiscoveredEdge> = Vec::with_capacity(batch_size);

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(edge) => {
                        buffer.push(edge);
                        if buffer.len() >= batch_size {
                            self.flush(&mut buffer).await;
                            flush_tick.reset();
                        }
                    }
                    None => break,
                },
                _ = flush_tick.tick() => {
                    if !buffer.is_empty() {
                        self.flush(&mut buffer).await;
                    }
                }
                _ = report_tick.tick() => self.log_progress(),
            }
        }

        if !buffer.is_empty() {
            self.flush(&mut buffer).await;
        }

        tracing::info!(
            batches = self.report.flushed_batches,
            items = self.report.flushed_items,
            inserted = self.report.upserts.inserted,
            replaced = self.report.upserts.replaced,
            failed_batches = self.report.failed_batches,
            "Item sink finished"
        );
        self.report
    }

    async fn flush(&mut self, buffer: &mut Vec<DiscoveredEdge>) {
        let batch = std::mem::replace(buffer, Vec::with_capacity(self.settings.batch.batch_size));
        let len = batch.len() as u64;
        let write_timeout = self.settings.batch.write_timeout;

        let write = self.store.upsert_edges(batch);
        let failure = match tokio::time::timeout(write_timeout, write).await {
            Ok(Ok(summary)) => {
                self.report.flushed_batches += 1;
                self.report.flushed_items += len;
                self.report.upserts.absorb(summary);
                tracing::debug!(
                    items = len,
                    inserted = summary.inserted,
                    replaced = summary.replaced,
                    "Flushed item batch"
                );
                return;
            }
            Ok(Err(e)) => e.to_string(),
            // The blocking write may still commit after this
            Err(_) => format!("write outcome unknown after timeout of {:?}", write_timeout),
        };

        self.report.failed_batches += 1;
        self.report.failed_items += len;
        tracing::error!(items = len, error = %failure, "Bulk write not confirmed");
        self.errors
            .report(NodeError::detached(format!("Bulk write error: {}", failure)));
    }

    fn log_progress(&self) {
        tracing::info!(
            inserted = self.report.upserts.inserted,
            replaced = self.report.upserts.replaced,
            "Upsert progress"
        );
    }
}
