//! User sync
//!
//! The user list is small and flat, so it bypasses the crawl pipeline: one
//! list request, then chunked upserts keyed by `user_seq`. Unlike the shared
//! box crawl, any failure here aborts the command.

use crate::gateway::AdminApiClient;
use crate::model::UserRecord;
use crate::sink::BatchSettings;
use crate::storage::{SqliteStore, UpsertSummary};
use crate::SyncError;

/// Outcome of a user sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserSyncReport {
    /// Users returned by the list endpoint
    pub listed: u64,
    /// Entries without a `user_seq`, which cannot be keyed
    pub skipped: u64,
    pub batches: u64,
    pub upserts: UpsertSummary,
}

/// Fetches every user and upserts them into `store`
pub async fn sync_users(
    client: &AdminApiClient,
    store: &SqliteStore,
    settings: &BatchSettings,
) -> Result<UserSyncReport, SyncError> {
    let response = client.list_users().await?;
    let listed = response.lists.len() as u64;
    tracing::info!(listed, total = response.total, "Fetched user list");

    let (users, skipped): (Vec<UserRecord>, Vec<UserRecord>) = response
        .lists
        .into_iter()
        .partition(|user| user.user_seq().is_some());
    if !skipped.is_empty() {
        tracing::warn!(count = skipped.len(), "Skipping users without user_seq");
    }

    let mut report = UserSyncReport {
        listed,
        skipped: skipped.len() as u64,
        ..UserSyncReport::default()
    };

    for chunk in users.chunks(settings.batch_size.max(1)) {
        let batch = chunk.to_vec();
        let write = store.run_blocking(move |store| store.upsert_users(&batch));
        let summary = tokio::time::timeout(settings.write_timeout, write)
            .await
            .map_err(|_| SyncError::WriteTimeout(settings.write_timeout))??;

        report.batches += 1;
        report.upserts.absorb(summary);
        tracing::debug!(
            users = chunk.len(),
            inserted = summary.inserted,
            replaced = summary.replaced,
            "Upserted user batch"
        );
    }

    tracing::info!(
        inserted = report.upserts.inserted,
        replaced = report.upserts.replaced,
        skipped = report.skipped,
        "User sync finished"
    );
    Ok(report)
}
