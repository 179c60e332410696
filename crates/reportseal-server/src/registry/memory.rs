//! In-process registry used when no database is configured.

use async_trait::async_trait;
use chrono::Utc;
use reportseal_crypto::ReportDigest;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{RegistryError, RegistryNotifier, ReportStore};
use crate::models::{NewReportEntry, ReportEntry};

/// Entries are kept in insertion order and lost on restart.
#[derive(Debug, Default)]
pub struct MemoryReportStore {
    entries: RwLock<Vec<ReportEntry>>,
    notifier: RegistryNotifier,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn add_entry(&self, entry: NewReportEntry) -> Result<ReportEntry, RegistryError> {
        let stored = ReportEntry {
            id: Uuid::new_v4(),
            owner_identity: entry.owner_identity,
            digest: entry.digest,
            timestamp: entry.timestamp,
            storage_receipt: entry.storage_receipt,
            transaction_ref: entry.transaction_ref,
            block_number: entry.block_number,
            network: entry.network,
            created_at: Utc::now(),
        };
        self.entries.write().await.push(stored.clone());
        self.notifier.notify(&stored.owner_identity);
        Ok(stored)
    }

    async fn list_by_owner(&self, owner_identity: &str) -> Result<Vec<ReportEntry>, RegistryError> {
        let entries = self.entries.read().await;
        // Reverse insertion order first; the stable sort keeps it for equal timestamps.
        let mut owned: Vec<ReportEntry> = entries
            .iter()
            .rev()
            .filter(|e| e.owner_identity == owner_identity)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn find_by_digest(&self, digest: &ReportDigest) -> Result<Option<ReportEntry>, RegistryError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| &e.digest == digest)
            .min_by_key(|e| e.created_at)
            .cloned())
    }

    fn notifier(&self) -> &RegistryNotifier {
        &self.notifier
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reportseal_crypto::digest;

    fn digest_only(owner: &str, content: &[u8]) -> NewReportEntry {
        NewReportEntry {
            owner_identity: owner.to_string(),
            digest: digest(content),
            timestamp: Utc::now(),
            storage_receipt: None,
            transaction_ref: None,
            block_number: None,
            network: None,
        }
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let store = MemoryReportStore::new();
        for content in [b"a".as_slice(), b"b", b"c"] {
            store.add_entry(digest_only("0xowner", content)).await.unwrap();
        }
        store.add_entry(digest_only("0xother", b"z")).await.unwrap();

        let listed = store.list_by_owner("0xowner").await.unwrap();
        let digests: Vec<_> = listed.iter().map(|e| e.digest).collect();
        assert_eq!(digests, vec![digest(b"c"), digest(b"b"), digest(b"a")]);
    }

    #[tokio::test]
    async fn test_find_by_digest_returns_earliest() {
        let store = MemoryReportStore::new();
        let first = store.add_entry(digest_only("0xfirst", b"same")).await.unwrap();
        store.add_entry(digest_only("0xsecond", b"same")).await.unwrap();

        let found = store.find_by_digest(&digest(b"same")).await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
        assert!(store.find_by_digest(&digest(b"missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_owner_is_empty() {
        let store = MemoryReportStore::new();
        assert!(store.list_by_owner("0xnobody").await.unwrap().is_empty());
        assert!(store.is_empty().await);
    }
}
