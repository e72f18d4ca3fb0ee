//! Crawl coordinator - walks the shared box tree with a fixed worker pool
//!
//! This module contains the crawl loop that coordinates:
//! - The bounded node queue and the pending-job counter
//! - A fixed pool of workers fetching one node per job
//! - Emitting discovered edges and node errors to the sinks
//! - The close-then-drain shutdown once no jobs are outstanding

use crate::crawler::limiter::ApiRateLimiter;
use crate::crawler::pending::PendingJobs;
use crate::crawler::queue::NodeQueue;
use crate::gateway::{FetchError, FetchGateway};
use crate::model::{DiscoveredEdge, Item, NodeError, NodeId};
use crate::sink::ErrorReporter;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Knobs of one crawl pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlSettings {
    pub workers: usize,
    pub queue_capacity: usize,
    pub job_timeout: Duration,
    pub recursive: bool,
    pub monitor_interval: Duration,
}

/// Counters of one crawl pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Jobs that reached the gateway or failed on the way to it
    pub jobs: u64,
    /// Jobs whose fetch returned children
    pub fetched: u64,
    pub edges: u64,
    pub node_errors: u64,
    /// Children that were counted but found the queue already closed
    pub enqueue_aborted: u64,
    /// Jobs still counted when the workers exited, non-zero only on cancel
    pub outstanding_jobs: u64,
}

#[derive(Default)]
struct Counters {
    jobs: AtomicU64,
    fetched: AtomicU64,
    edges: AtomicU64,
    node_errors: AtomicU64,
    enqueue_aborted: AtomicU64,
}

/// State shared by every worker of one run
struct CrawlShared {
    gateway: Arc<dyn FetchGateway>,
    limiter: ApiRateLimiter,
    queue: NodeQueue,
    pending: PendingJobs,
    settings: CrawlSettings,
    items: mpsc::Sender<DiscoveredEdge>,
    errors: ErrorReporter,
    cancel: CancellationToken,
    counters: Counters,
}

/// Main crawl coordinator structure
pub struct Coordinator {
    gateway: Arc<dyn FetchGateway>,
    limiter: ApiRateLimiter,
    settings: CrawlSettings,
}

impl Coordinator {
    /// Creates a coordinator from its collaborators
    ///
    /// # Arguments
    ///
    /// * `gateway` - Source of node children
    /// * `limiter` - Token bucket every fetch acquires from
    /// * `settings` - Pool size, queue capacity, job budget and mode
    pub fn new(
        gateway: Arc<dyn FetchGateway>,
        limiter: ApiRateLimiter,
        settings: CrawlSettings,
    ) -> Self {
        Self {
            gateway,
            limiter,
            settings,
        }
    }

    /// Crawls from `root` until no jobs are outstanding or `cancel` fires
    ///
    /// `items` and `errors` are dropped when this returns, after every worker
    /// has exited, so the sinks observe closure only once no more output can
    /// be produced.
    pub async fn run(
        &self,
        root: NodeId,
        items: mpsc::Sender<DiscoveredEdge>,
        errors: ErrorReporter,
        cancel: CancellationToken,
    ) -> CrawlStats {
        let started = std::time::Instant::now();
        let workers = self.settings.workers.max(1);

        let shared = Arc::new(CrawlShared {
            gateway: self.gateway.clone(),
            limiter: self.limiter.clone(),
            queue: NodeQueue::new(self.settings.queue_capacity),
            pending: PendingJobs::new(),
            settings: self.settings,
            items,
            errors,
            cancel,
            counters: Counters::default(),
        });

        tracing::info!(
            root = %root,
            workers,
            recursive = self.settings.recursive,
            "Starting crawl"
        );

        // Seed: the root is counted before it becomes visible to workers
        shared.pending.add();
        if !shared.queue.push(root, &shared.cancel).await {
            shared.pending.complete();
        }

        let supervisor = tokio::spawn(supervise(shared.clone()));
        let monitor = tokio::spawn(monitor(shared.clone()));

        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            pool.spawn(worker(worker_id, shared.clone()));
        }
        while let Some(result) = pool.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Crawl worker failed");
            }
        }

        // Workers are gone; nothing can push any more
        shared.queue.close();
        monitor.abort();
        let _ = monitor.await;
        if let Err(e) = supervisor.await {
            tracing::error!(error = %e, "Crawl supervisor failed");
        }

        let counters = &shared.counters;
        let stats = CrawlStats {
            jobs: counters.jobs.load(Ordering::Relaxed),
            fetched: counters.fetched.load(Ordering::Relaxed),
            edges: counters.edges.load(Ordering::Relaxed),
            node_errors: counters.node_errors.load(Ordering::Relaxed),
            enqueue_aborted: counters.enqueue_aborted.load(Ordering::Relaxed),
            outstanding_jobs: shared.pending.count(),
        };

        if shared.cancel.is_cancelled() {
            tracing::warn!(
                outstanding = stats.outstanding_jobs,
                "Crawl cancelled before completion"
            );
        }
        tracing::info!(
            jobs = stats.jobs,
            edges = stats.edges,
            errors = stats.node_errors,
            elapsed = ?started.elapsed(),
            "Crawl finished"
        );

        stats
    }
}

/// Closes the queue once the pending-job counter reaches zero
async fn supervise(shared: Arc<CrawlShared>) {
    tokio::select! {
        _ = shared.pending.wait_idle() => {
            tracing::debug!("No jobs outstanding, closing node queue");
            shared.queue.close();
        }
        _ = shared.cancel.cancelled() => {}
        _ = shared.queue.closed() => {}
    }
}

/// Logs queue and item channel occupancy until the run ends
async fn monitor(shared: Arc<CrawlShared>) {
    let period = shared.settings.monitor_interval;
    let mut tick = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        tick.tick().await;
        let items_buffered = shared.items.max_capacity() - shared.items.capacity();
        tracing::info!(
            queued_nodes = shared.queue.len(),
            queue_capacity = shared.queue.capacity(),
            pending_jobs = shared.pending.count(),
            items_buffered,
            "Pipeline status"
        );
    }
}

async fn worker(worker_id: usize, shared: Arc<CrawlShared>) {
    tracing::trace!(worker_id, "Worker started");

    // Children that found the queue full; still counted as pending
    let mut overflow: VecDeque<NodeId> = VecDeque::new();

    loop {
        if shared.cancel.is_cancelled() {
            break;
        }
        spill_overflow(&shared.queue, &mut overflow);

        let node = match overflow.pop_front() {
            Some(node) => node,
            None => match shared.queue.pop(&shared.cancel).await {
                Some(node) => node,
                None => break,
            },
        };
        process_node(&shared, &node, &mut overflow).await;
        shared.pending.complete();
    }

    if !overflow.is_empty() {
        tracing::debug!(worker_id, left = overflow.len(), "Worker dropped overflow on exit");
    }
    tracing::trace!(worker_id, "Worker exiting");
}

/// Moves overflow into the queue while it has room
fn spill_overflow(queue: &NodeQueue, overflow: &mut VecDeque<NodeId>) {
    while let Some(node) = overflow.pop_front() {
        match queue.try_push(node) {
            Ok(()) => {}
            Err(TrySendError::Full(node)) | Err(TrySendError::Closed(node)) => {
                overflow.push_front(node);
                break;
            }
        }
    }
}

/// Runs one job: fetch the children of `node`, emit them, enqueue them
async fn process_node(shared: &CrawlShared, node: &str, overflow: &mut VecDeque<NodeId>) {
    shared.counters.jobs.fetch_add(1, Ordering::Relaxed);

    let children = match fetch_within_budget(shared, node).await {
        Ok(children) => children,
        Err(FetchError::Cancelled) => return,
        Err(e) => {
            shared.counters.node_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(node, error = %e, "Failed to list children");
            shared.errors.report(NodeError::for_node(node, &e));
            return;
        }
    };

    shared.counters.fetched.fetch_add(1, Ordering::Relaxed);
    tracing::debug!(node, children = children.len(), "Listed children");

    for item in children {
        let child = item.node.clone();
        let edge = DiscoveredEdge {
            item,
            parent_node: node.to_string(),
        };

        let sent = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => false,
            sent = shared.items.send(edge) => sent.is_ok(),
        };
        if !sent {
            return;
        }
        shared.counters.edges.fetch_add(1, Ordering::Relaxed);

        if shared.settings.recursive {
            enqueue_child(shared, child, overflow);
        }
    }
}

/// Counts and enqueues one child without waiting for queue space
///
/// A full queue parks the child in the worker's overflow. A closed queue
/// undoes the count.
fn enqueue_child(shared: &CrawlShared, child: NodeId, overflow: &mut VecDeque<NodeId>) {
    // The empty id names the root
    if child.is_empty() {
        tracing::warn!("Skipping child with an empty node id");
        return;
    }

    shared.pending.add();
    if !overflow.is_empty() {
        overflow.push_back(child);
        return;
    }
    match shared.queue.try_push(child) {
        Ok(()) => {}
        Err(TrySendError::Full(child)) => overflow.push_back(child),
        Err(TrySendError::Closed(_)) => {
            shared.pending.complete();
            shared.counters.enqueue_aborted.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Acquires a token and fetches, both within one job deadline
async fn fetch_within_budget(shared: &CrawlShared, node: &str) -> Result<Vec<Item>, FetchError> {
    let deadline = Instant::now() + shared.settings.job_timeout;

    let job = async {
        shared.limiter.acquire(deadline).await?;
        tokio::time::timeout_at(deadline, shared.gateway.fetch_children(node))
            .await
            .map_err(|_| FetchError::Timeout {
                node: node.to_string(),
            })?
    };

    tokio::select! {
        biased;
        _ = shared.cancel.cancelled() => Err(FetchError::Cancelled),
        result = job => result,
    }
}
