//! Shared record types for the report-integrity pipeline.
//!
//! These are the values that cross crate boundaries: the server produces them
//! and the CLI reads them back from JSON responses.

use serde::{Deserialize, Serialize};

use crate::cid::Cid;
use crate::hash::ReportDigest;

/// Result of a successful upload to content-addressed storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageReceipt {
    /// Content identifier assigned by the storage network.
    pub cid: Cid,
    /// Gateway URL the artifact can be fetched from.
    pub retrieval_url: String,
}

/// Chain the ledger lives on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub chain_id: u64,
    pub name: String,
}

impl NetworkInfo {
    /// Builds network info with the conventional name for well-known chain ids.
    pub fn from_chain_id(chain_id: u64) -> Self {
        Self {
            chain_id,
            name: network_name(chain_id).to_string(),
        }
    }
}

/// Conventional name for a chain id, "unknown" otherwise.
pub fn network_name(chain_id: u64) -> &'static str {
    match chain_id {
        1 => "mainnet",
        11155111 => "sepolia",
        43114 => "avalanche",
        43113 => "fuji",
        137 => "matic",
        80002 => "amoy",
        31337 => "anvil",
        1337 => "dev",
        _ => "unknown",
    }
}

/// Proof-of-existence record read back from the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    pub digest: ReportDigest,
    /// Block timestamp of the anchoring transaction, seconds since epoch.
    pub timestamp: u64,
    /// Transaction hash, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_ref: Option<String>,
    /// Block number, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    pub network_id: u64,
}

/// Result of a confirmed anchoring transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnchorReceipt {
    /// Transaction hash (0x-prefixed).
    pub transaction_ref: String,
    pub block_number: u64,
    pub network: NetworkInfo,
}
