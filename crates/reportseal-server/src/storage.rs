//! Content-addressed storage: upload artifacts to a pinning service and
//! stream them back from a gateway by CID.

pub mod memory;
pub mod pinata;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use reportseal_crypto::{Cid, ReportDigest, StorageReceipt};

pub use memory::MemoryContentStore;
pub use pinata::PinataClient;

/// Content type reported when the gateway does not send one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/pdf";

/// Gateway error bodies are cut to this many characters.
pub const GATEWAY_DETAILS_LIMIT: usize = 500;

/// Storage failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// Transport failure, timeout, authentication failure or 5xx.
    #[error("Storage service unavailable: {message}")]
    Unavailable { message: String, status: Option<u16> },

    /// The service answered but refused the upload, or answered garbage.
    #[error("Storage service rejected the upload ({status}): {message}")]
    Rejected {
        status: u16,
        message: String,
        details: serde_json::Value,
    },

    /// Non-2xx from the retrieval gateway other than 404.
    #[error("Gateway returned {status}: {details}")]
    Gateway { status: u16, details: String },

    /// No content for this CID (or the CID is malformed).
    #[error("Content not found: {cid}")]
    NotFound { cid: String },
}

/// Descriptive metadata attached to an upload.
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    /// Original file name.
    pub name: String,
    /// Owner identity of the uploader.
    pub uploaded_by: String,
    pub digest: ReportDigest,
}

/// Streamed artifact body. Dropping it aborts the transfer.
pub type ByteStream = BoxStream<'static, Result<Bytes, StorageError>>;

/// A download in progress.
pub struct DownloadStream {
    pub cid: Cid,
    pub content_type: String,
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl DownloadStream {
    /// Suggested attachment filename.
    pub fn filename(&self) -> String {
        download_filename(&self.cid)
    }

    /// Reads the whole body into memory.
    pub async fn into_bytes(self) -> Result<Vec<u8>, StorageError> {
        let capacity = self.content_length.unwrap_or(0).min(64 * 1024 * 1024) as usize;
        self.body
            .try_fold(Vec::with_capacity(capacity), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
    }
}

impl std::fmt::Debug for DownloadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadStream")
            .field("cid", &self.cid)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// `report-{cid}.pdf`.
pub fn download_filename(cid: &Cid) -> String {
    format!("report-{}.pdf", cid)
}

/// Parses a CID from user input. Malformed identifiers cannot exist in the
/// store, so they are reported as not found.
pub fn parse_cid(input: &str) -> Result<Cid, StorageError> {
    input.trim().parse::<Cid>().map_err(|_| StorageError::NotFound {
        cid: input.to_string(),
    })
}

/// Cuts `text` to at most `limit` characters.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Content-addressed store seam.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Pins `bytes` and returns the assigned CID with its retrieval URL.
    async fn upload(&self, bytes: Bytes, metadata: UploadMetadata) -> Result<StorageReceipt, StorageError>;

    /// Opens a streamed download. Invalid CIDs fail with `NotFound` without I/O.
    async fn download(&self, cid: &str) -> Result<DownloadStream, StorageError>;

    /// Gateway URL for a CID.
    fn retrieval_url(&self, cid: &Cid) -> String;
}
