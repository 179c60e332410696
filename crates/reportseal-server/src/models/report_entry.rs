//! Registry entry linking an owner to a published report.

use chrono::{DateTime, Utc};
use reportseal_crypto::{AnchorReceipt, LedgerRecord, NetworkInfo, ReportDigest, StorageReceipt};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::ledger::timestamp_to_datetime;

/// A published report as recorded in the registry. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub id: Uuid,
    /// Identity of the owner (usually a wallet address).
    pub owner_identity: String,
    pub digest: ReportDigest,
    /// Anchoring time when anchored, publication time otherwise.
    pub timestamp: DateTime<Utc>,
    /// Where the artifact is pinned. Absent for digest-only anchors.
    pub storage_receipt: Option<StorageReceipt>,
    /// Anchoring transaction. Absent for partial entries awaiting repair.
    pub transaction_ref: Option<String>,
    pub block_number: Option<u64>,
    pub network: Option<NetworkInfo>,
    /// When this record was created.
    pub created_at: DateTime<Utc>,
}

impl ReportEntry {
    /// Whether the entry carries a ledger anchor.
    pub fn is_anchored(&self) -> bool {
        self.network.is_some()
    }
}

/// Data required to create a new registry entry.
#[derive(Debug, Clone)]
pub struct NewReportEntry {
    pub owner_identity: String,
    pub digest: ReportDigest,
    pub timestamp: DateTime<Utc>,
    pub storage_receipt: Option<StorageReceipt>,
    pub transaction_ref: Option<String>,
    pub block_number: Option<u64>,
    pub network: Option<NetworkInfo>,
}

impl NewReportEntry {
    /// Entry for an artifact that is pinned but not anchored.
    pub fn pinned(owner_identity: impl Into<String>, digest: ReportDigest, receipt: StorageReceipt) -> Self {
        Self {
            owner_identity: owner_identity.into(),
            digest,
            timestamp: Utc::now(),
            storage_receipt: Some(receipt),
            transaction_ref: None,
            block_number: None,
            network: None,
        }
    }

    /// Adds the anchor from a fresh transaction.
    pub fn with_anchor(mut self, anchor: &AnchorReceipt) -> Self {
        self.transaction_ref = Some(anchor.transaction_ref.clone());
        self.block_number = Some(anchor.block_number);
        self.network = Some(anchor.network.clone());
        self
    }

    /// Adds the anchor from an existing ledger record, using its timestamp.
    pub fn with_record(mut self, record: &LedgerRecord) -> Self {
        if let Some(at) = timestamp_to_datetime(record.timestamp) {
            self.timestamp = at;
        }
        self.transaction_ref = record.transaction_ref.clone();
        self.block_number = record.block_number;
        self.network = Some(NetworkInfo::from_chain_id(record.network_id));
        self
    }
}

/// `report_entries` row.
#[derive(Debug, Clone, FromRow)]
pub struct ReportEntryRow {
    pub id: Uuid,
    pub seq: i64,
    pub owner_identity: String,
    pub digest: String,
    pub timestamp: DateTime<Utc>,
    pub cid: Option<String>,
    pub retrieval_url: Option<String>,
    pub transaction_ref: Option<String>,
    pub block_number: Option<i64>,
    pub chain_id: Option<i64>,
    pub network_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ReportEntryRow> for ReportEntry {
    type Error = String;

    fn try_from(row: ReportEntryRow) -> Result<Self, Self::Error> {
        let digest = row
            .digest
            .parse::<ReportDigest>()
            .map_err(|e| format!("row {}: {}", row.id, e))?;

        let storage_receipt = match (row.cid, row.retrieval_url) {
            (Some(cid), Some(retrieval_url)) => Some(StorageReceipt {
                cid: cid.parse().map_err(|e| format!("row {}: {}", row.id, e))?,
                retrieval_url,
            }),
            _ => None,
        };

        let network = row.chain_id.map(|chain_id| NetworkInfo {
            chain_id: chain_id as u64,
            name: row
                .network_name
                .unwrap_or_else(|| reportseal_crypto::types::network_name(chain_id as u64).to_string()),
        });

        Ok(ReportEntry {
            id: row.id,
            owner_identity: row.owner_identity,
            digest,
            timestamp: row.timestamp,
            storage_receipt,
            transaction_ref: row.transaction_ref,
            block_number: row.block_number.map(|n| n as u64),
            network,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reportseal_crypto::digest;

    fn receipt() -> StorageReceipt {
        StorageReceipt {
            cid: "QmQPeNsJPyVWPFDVHb77w8G42Fvo15z4bG2X8D2GhfbSXc".parse().unwrap(),
            retrieval_url: "https://gateway.pinata.cloud/ipfs/QmQPeNsJPyVWPFDVHb77w8G42Fvo15z4bG2X8D2GhfbSXc".to_string(),
        }
    }

    #[test]
    fn test_pinned_entry_is_not_anchored() {
        let entry = NewReportEntry::pinned("0xowner", digest(b"report"), receipt());
        assert!(entry.network.is_none());
        assert!(entry.transaction_ref.is_none());
    }

    #[test]
    fn test_with_record_uses_ledger_time() {
        let record = LedgerRecord {
            digest: digest(b"report"),
            timestamp: 1_700_000_000,
            transaction_ref: None,
            block_number: None,
            network_id: 43113,
        };
        let entry = NewReportEntry::pinned("0xowner", digest(b"report"), receipt()).with_record(&record);
        assert_eq!(entry.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(entry.network.unwrap().name, "fuji");
    }

    #[test]
    fn test_row_conversion() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let row = ReportEntryRow {
            id,
            seq: 1,
            owner_identity: "0xowner".to_string(),
            digest: digest(b"report").to_string(),
            timestamp: Utc::now(),
            cid: Some("QmQPeNsJPyVWPFDVHb77w8G42Fvo15z4bG2X8D2GhfbSXc".to_string()),
            retrieval_url: Some("https://gateway.pinata.cloud/ipfs/x".to_string()),
            transaction_ref: Some("0xabc".to_string()),
            block_number: Some(42),
            chain_id: Some(43114),
            network_name: None,
            created_at: Utc::now(),
        };

        let entry = ReportEntry::try_from(row).unwrap();
        assert!(entry.is_anchored());
        assert_eq!(entry.block_number, Some(42));
        assert_eq!(entry.network.as_ref().unwrap().name, "avalanche");
    }

    #[test]
    fn test_entry_serialization() {
        let entry = ReportEntry {
            id: Uuid::new_v4(),
            owner_identity: "0xowner".to_string(),
            digest: digest(b"report"),
            timestamp: Utc::now(),
            storage_receipt: Some(receipt()),
            transaction_ref: None,
            block_number: None,
            network: None,
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"ownerIdentity\":\"0xowner\""));
        assert!(json.contains("\"storageReceipt\":{"));
        assert!(json.contains("\"createdAt\":"));
    }
}
