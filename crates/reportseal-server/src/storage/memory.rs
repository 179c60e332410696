//! In-process content store for tests and local development.
//!
//! CIDs are CIDv0 strings over the sha2-256 of the raw bytes. They have the
//! right shape but differ from what IPFS assigns to the same file.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reportseal_crypto::{digest, Cid, StorageReceipt};
use tokio::sync::RwLock;

use super::{parse_cid, ContentStore, DownloadStream, StorageError, UploadMetadata, DEFAULT_CONTENT_TYPE};
use crate::config::gateway_url;

/// Chunk size used when streaming stored bytes back.
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Bytes,
    metadata: UploadMetadata,
}

#[derive(Debug)]
pub struct MemoryContentStore {
    gateway: String,
    objects: RwLock<HashMap<Cid, StoredObject>>,
}

impl MemoryContentStore {
    pub fn new(gateway: impl Into<String>) -> Self {
        Self {
            gateway: gateway.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of distinct pinned objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Owner recorded for a pinned CID.
    pub async fn uploaded_by(&self, cid: &Cid) -> Option<String> {
        self.objects
            .read()
            .await
            .get(cid)
            .map(|object| object.metadata.uploaded_by.clone())
    }
}

impl Default for MemoryContentStore {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_PINATA_GATEWAY)
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn upload(&self, bytes: Bytes, metadata: UploadMetadata) -> Result<StorageReceipt, StorageError> {
        let cid = Cid::v0_from_sha256(digest(&bytes).as_bytes());
        tracing::debug!(cid = %cid, size = bytes.len(), "Pinning artifact in memory");

        // Re-pinning identical bytes keeps the first metadata, as a pinning service would.
        self.objects
            .write()
            .await
            .entry(cid.clone())
            .or_insert(StoredObject { bytes, metadata });

        Ok(StorageReceipt {
            retrieval_url: self.retrieval_url(&cid),
            cid,
        })
    }

    async fn download(&self, cid: &str) -> Result<DownloadStream, StorageError> {
        let cid = parse_cid(cid)?;
        let object = self
            .objects
            .read()
            .await
            .get(&cid)
            .cloned()
            .ok_or_else(|| StorageError::NotFound { cid: cid.to_string() })?;

        let bytes = object.bytes;
        let content_length = Some(bytes.len() as u64);
        let chunks: Vec<Result<Bytes, StorageError>> = (0..bytes.len())
            .step_by(CHUNK_SIZE)
            .map(|start| Ok(bytes.slice(start..(start + CHUNK_SIZE).min(bytes.len()))))
            .collect();

        Ok(DownloadStream {
            cid,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            content_length,
            body: futures::stream::iter(chunks).boxed(),
        })
    }

    fn retrieval_url(&self, cid: &Cid) -> String {
        gateway_url(&self.gateway, cid.as_str())
    }
}
