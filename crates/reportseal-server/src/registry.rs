//! Report registry: the side record linking owners to published reports.
//!
//! Registry writes are best effort from the pipeline's point of view. A
//! failure here never rolls back an anchor, but it is always surfaced.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reportseal_crypto::ReportDigest;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::models::{NewReportEntry, ReportEntry};

pub use memory::MemoryReportStore;
pub use postgres::PgReportStore;

/// Capacity of the change-notification channel.
const NOTIFY_CAPACITY: usize = 256;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

/// Fan-out of "owner X has a new entry" notifications.
#[derive(Debug, Clone)]
pub struct RegistryNotifier {
    sender: broadcast::Sender<String>,
}

impl RegistryNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self { sender }
    }

    pub fn notify(&self, owner_identity: &str) {
        // No receivers is fine: nobody is watching.
        let _ = self.sender.send(owner_identity.to_string());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}

impl Default for RegistryNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry storage seam.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persists a new entry and returns it with its id and creation time.
    async fn add_entry(&self, entry: NewReportEntry) -> Result<ReportEntry, RegistryError>;

    /// Entries of an owner, newest first; ties by insertion order, later first.
    async fn list_by_owner(&self, owner_identity: &str) -> Result<Vec<ReportEntry>, RegistryError>;

    /// Earliest entry recorded for a digest.
    async fn find_by_digest(&self, digest: &ReportDigest) -> Result<Option<ReportEntry>, RegistryError>;

    fn notifier(&self) -> &RegistryNotifier;

    /// Short backend name for diagnostics.
    fn backend(&self) -> &'static str;
}

/// Stream of owner snapshots from [`subscribe`].
pub type SnapshotStream = BoxStream<'static, Result<Vec<ReportEntry>, RegistryError>>;

/// Full ordered snapshots of an owner's entries: one immediately, then one
/// after every new entry for that owner.
pub fn subscribe(store: Arc<dyn ReportStore>, owner_identity: String) -> SnapshotStream {
    // Subscribe before the first snapshot so no entry falls between them.
    let receiver = store.notifier().subscribe();

    futures::stream::unfold(
        (store, owner_identity, receiver, true),
        |(store, owner, mut receiver, first)| async move {
            if !first {
                loop {
                    match receiver.recv().await {
                        Ok(changed) if changed == owner => break,
                        Ok(_) => continue,
                        // Missed notifications may include ours; re-read to be safe.
                        Err(RecvError::Lagged(_)) => break,
                        Err(RecvError::Closed) => return None,
                    }
                }
            }
            let snapshot = store.list_by_owner(&owner).await;
            Some((snapshot, (store, owner, receiver, false)))
        },
    )
    .boxed()
}
