//! Bounded FIFO of node ids shared by every worker
//!
//! Producers are the workers themselves, so the queue cannot rely on sender
//! drop for shutdown. Instead it is closed explicitly once no jobs are
//! outstanding; pops then drain whatever is still buffered and return `None`.
//!
//! Workers enqueue with `try_push` and never wait for space, otherwise a
//! full queue with every worker pushing would stall the pool.

use crate::model::NodeId;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Multi-producer multi-consumer node queue
pub struct NodeQueue {
    tx: mpsc::Sender<NodeId>,
    rx: Mutex<mpsc::Receiver<NodeId>>,
    closed: CancellationToken,
    capacity: usize,
}

impl NodeQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            closed: CancellationToken::new(),
            capacity,
        }
    }

    /// Enqueues `node`, waiting for space
    ///
    /// Returns `false` without enqueuing when the queue closes or `cancel`
    /// fires first.
    pub async fn push(&self, node: NodeId, cancel: &CancellationToken) -> bool {
        if self.closed.is_cancelled() || cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = self.closed.cancelled() => false,
            sent = self.tx.send(node) => sent.is_ok(),
        }
    }

    /// Enqueues `node` only if there is space right now
    ///
    /// A full queue hands the node back as `TrySendError::Full`, a closed
    /// one as `TrySendError::Closed`.
    pub fn try_push(&self, node: NodeId) -> Result<(), TrySendError<NodeId>> {
        if self.closed.is_cancelled() {
            return Err(TrySendError::Closed(node));
        }
        self.tx.try_send(node)
    }

    /// Dequeues the next node
    ///
    /// Returns `None` once the queue is closed and drained, or when `cancel`
    /// fires.
    pub async fn pop(&self, cancel: &CancellationToken) -> Option<NodeId> {
        let mut rx = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            rx = self.rx.lock() => rx,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            node = rx.recv() => node,
            _ = self.closed.cancelled() => rx.try_recv().ok(),
        }
    }

    /// Closes the queue; pending pushes fail and pops drain the remainder
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the queue has been closed
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Number of buffered nodes
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
