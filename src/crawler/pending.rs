//! Pending-job counter
//!
//! Counts discovery jobs that were enqueued but not yet completed. A job is
//! counted before its node is pushed, so the count can only reach zero once
//! no worker holds or is about to push work.

use tokio::sync::watch;

/// Process-scoped counter of outstanding jobs with an idle notification
#[derive(Clone)]
pub struct PendingJobs {
    tx: watch::Sender<u64>,
}

impl PendingJobs {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    /// Counts one more outstanding job
    pub fn add(&self) {
        self.tx.send_modify(|count| *count += 1);
    }

    /// Marks one job as done
    pub fn complete(&self) {
        self.tx.send_modify(|count| {
            debug_assert!(*count > 0, "pending-job counter underflow");
            *count = count.saturating_sub(1);
        });
    }

    pub fn count(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Resolves once the counter is zero
    pub async fn wait_idle(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in self, so the channel cannot close here
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl Default for PendingJobs {
    fn default() -> Self {
        Self::new()
    }
}
