//! Publish pipeline: digest, pin, anchor, record.

use bytes::Bytes;
use chrono::Utc;
use reportseal_crypto::{AnchorReceipt, Cid, LedgerRecord, NetworkInfo, ReportDigest, StorageReceipt};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::ledger::{Ledger, LedgerError};
use crate::models::NewReportEntry;
use crate::registry::ReportStore;
use crate::state::AppState;
use crate::storage::UploadMetadata;

/// Outcome of the registry write that follows an anchor.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryWrite {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a successful publish.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub success: bool,
    pub cid: Cid,
    pub retrieval_url: String,
    pub digest: ReportDigest,
    pub transaction_ref: Option<String>,
    pub block_number: Option<u64>,
    pub network: NetworkInfo,
    /// The digest was anchored before this call; the fields above describe
    /// the existing record.
    pub already_anchored: bool,
    pub store: RegistryWrite,
}

/// Result of anchoring a known digest.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorOutcome {
    pub success: bool,
    pub digest: ReportDigest,
    pub transaction_ref: Option<String>,
    pub block_number: Option<u64>,
    pub network: NetworkInfo,
    pub already_anchored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<RegistryWrite>,
}

/// A ledger record for the digest, fresh or pre-existing.
#[derive(Debug, Clone)]
enum Anchored {
    Fresh(AnchorReceipt),
    Existing(LedgerRecord),
}

impl Anchored {
    fn already_anchored(&self) -> bool {
        matches!(self, Anchored::Existing(_))
    }

    fn transaction_ref(&self) -> Option<String> {
        match self {
            Anchored::Fresh(receipt) => Some(receipt.transaction_ref.clone()),
            Anchored::Existing(record) => record.transaction_ref.clone(),
        }
    }

    fn block_number(&self) -> Option<u64> {
        match self {
            Anchored::Fresh(receipt) => Some(receipt.block_number),
            Anchored::Existing(record) => record.block_number,
        }
    }

    fn network(&self) -> NetworkInfo {
        match self {
            Anchored::Fresh(receipt) => receipt.network.clone(),
            Anchored::Existing(record) => NetworkInfo::from_chain_id(record.network_id),
        }
    }

    fn apply(&self, entry: NewReportEntry) -> NewReportEntry {
        match self {
            Anchored::Fresh(receipt) => entry.with_anchor(receipt),
            Anchored::Existing(record) => entry.with_record(record),
        }
    }
}

/// Trims an owner identity; blank means absent.
pub fn normalize_owner(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Anchors `digest`, treating `DuplicateRecord` as success with the existing record.
async fn anchor_digest(ledger: &dyn Ledger, digest: &ReportDigest) -> Result<Anchored, LedgerError> {
    match ledger.store_record(digest).await {
        Ok(receipt) => Ok(Anchored::Fresh(receipt)),
        Err(LedgerError::DuplicateRecord { .. }) => match ledger.lookup_record(digest).await? {
            Some(record) => {
                tracing::info!(digest = %digest, timestamp = record.timestamp, "Digest already anchored");
                Ok(Anchored::Existing(record))
            }
            None => Err(LedgerError::InvalidResponse(format!(
                "Ledger reported {} as anchored but has no record of it",
                digest
            ))),
        },
        Err(e) => Err(e),
    }
}

async fn record_entry(registry: &dyn ReportStore, entry: NewReportEntry) -> RegistryWrite {
    let digest = entry.digest;
    match registry.add_entry(entry).await {
        Ok(stored) => RegistryWrite {
            success: true,
            id: Some(stored.id),
            error: None,
        },
        Err(e) => {
            tracing::error!(digest = %digest, error = %e, "Anchored report missing from registry");
            RegistryWrite {
                success: false,
                id: None,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Digests, pins and anchors `bytes` on behalf of `owner`, then records it.
///
/// If pinning succeeds and anchoring fails (other than as a duplicate), a
/// pinned-only registry entry is recorded and [`AppError::Partial`] is
/// returned so the digest can be anchored later through [`anchor`].
pub async fn publish(state: &AppState, owner: &str, filename: &str, bytes: Bytes) -> Result<PublishOutcome, AppError> {
    // Both sections are checked before any network call.
    let storage = state.storage()?;
    let ledger = state.ledger()?;

    let digest = reportseal_crypto::digest(&bytes);
    tracing::info!(digest = %digest, owner, filename, size = bytes.len(), "Publishing report");

    let receipt = storage
        .upload(
            bytes,
            UploadMetadata {
                name: filename.to_string(),
                uploaded_by: owner.to_string(),
                digest,
            },
        )
        .await?;
    tracing::info!(digest = %digest, cid = %receipt.cid, "Report pinned");

    let anchored = match anchor_digest(ledger.as_ref(), &digest).await {
        Ok(anchored) => anchored,
        Err(error) => return Err(record_partial(state, owner, digest, receipt, error).await),
    };

    let entry = anchored.apply(NewReportEntry::pinned(owner, digest, receipt.clone()));
    let store = record_entry(state.registry().as_ref(), entry).await;

    Ok(PublishOutcome {
        success: true,
        cid: receipt.cid,
        retrieval_url: receipt.retrieval_url,
        digest,
        transaction_ref: anchored.transaction_ref(),
        block_number: anchored.block_number(),
        network: anchored.network(),
        already_anchored: anchored.already_anchored(),
        store,
    })
}

async fn record_partial(
    state: &AppState,
    owner: &str,
    digest: ReportDigest,
    receipt: StorageReceipt,
    error: LedgerError,
) -> AppError {
    tracing::warn!(digest = %digest, cid = %receipt.cid, error = %error, "Report pinned but not anchored");
    let entry_id = match state
        .registry()
        .add_entry(NewReportEntry::pinned(owner, digest, receipt.clone()))
        .await
    {
        Ok(entry) => Some(entry.id),
        Err(e) => {
            tracing::error!(digest = %digest, error = %e, "Could not record partial registry entry");
            None
        }
    };
    AppError::Partial {
        error,
        digest,
        receipt,
        entry_id,
    }
}

/// Anchors a known digest. With an owner, appends a registry entry that
/// reuses the storage receipt of an earlier entry for the same digest.
pub async fn anchor(state: &AppState, digest: ReportDigest, owner: Option<&str>) -> Result<AnchorOutcome, AppError> {
    let ledger = state.ledger()?;
    tracing::info!(digest = %digest, owner = owner.unwrap_or("-"), "Anchoring digest");

    let anchored = anchor_digest(ledger.as_ref(), &digest).await?;

    let store = match owner {
        Some(owner) => {
            let storage_receipt = match state.registry().find_by_digest(&digest).await {
                Ok(existing) => existing.and_then(|entry| entry.storage_receipt),
                Err(e) => {
                    tracing::warn!(digest = %digest, error = %e, "Could not read earlier registry entry");
                    None
                }
            };
            let entry = anchored.apply(NewReportEntry {
                owner_identity: owner.to_string(),
                digest,
                timestamp: Utc::now(),
                storage_receipt,
                transaction_ref: None,
                block_number: None,
                network: None,
            });
            Some(record_entry(state.registry().as_ref(), entry).await)
        }
        None => None,
    };

    Ok(AnchorOutcome {
        success: true,
        digest,
        transaction_ref: anchored.transaction_ref(),
        block_number: anchored.block_number(),
        network: anchored.network(),
        already_anchored: anchored.already_anchored(),
        store,
    })
}
