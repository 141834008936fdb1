use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::models::{SyncStatus, SyncStatusUpdate};
use crate::store::Repository;

/// SHA-256 hex digest of an operator API key. The raw key is never stored.
pub fn api_key_hash(api_key: &str) -> String {
    hex::encode(Sha256::digest(api_key.trim().as_bytes()))
}

/// Writes run status against the owner carrying the run's key hash.
///
/// Status writes are best-effort: a failed write is logged and the run
/// carries on.
pub struct StatusReporter<'a, R: Repository + ?Sized> {
    store: &'a R,
    key_hash: String,
}

impl<'a, R: Repository + ?Sized> StatusReporter<'a, R> {
    pub fn new(store: &'a R, key_hash: impl Into<String>) -> Self {
        Self {
            store,
            key_hash: key_hash.into(),
        }
    }

    pub async fn syncing(&self, message: impl Into<String>) {
        self.write(SyncStatus::Syncing, message.into(), None).await;
    }

    /// Running count of reconciled listings after a batch.
    pub async fn progress(&self, synced: usize, total: usize) {
        self.write(
            SyncStatus::Syncing,
            format!("Synced {synced} of {total} properties"),
            Some(synced),
        )
        .await;
    }

    pub async fn done(&self, synced: usize, total: usize) {
        self.write(
            SyncStatus::Done,
            format!("Sync complete: {synced} of {total} properties"),
            Some(synced),
        )
        .await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.write(SyncStatus::Error, message.into(), None).await;
    }

    async fn write(&self, status: SyncStatus, message: String, listing_count: Option<usize>) {
        let update = SyncStatusUpdate {
            status,
            message,
            listing_count: listing_count.map(|n| i32::try_from(n).unwrap_or(i32::MAX)),
        };

        match self.store.write_sync_status(&self.key_hash, &update).await {
            Ok(touched) => debug!(
                status = status.as_str(),
                message = %update.message,
                touched,
                "Status updated"
            ),
            Err(e) => warn!(error = %e, status = status.as_str(), "Failed to record sync status"),
        }
    }
}
