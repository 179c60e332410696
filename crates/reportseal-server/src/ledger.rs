//! Ledger client: anchors report digests in the registry contract and reads
//! them back.

pub mod evm;
pub mod memory;
pub mod rpc;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use reportseal_crypto::{AnchorReceipt, LedgerRecord, NetworkInfo, ReportDigest};
use serde::Serialize;
use std::str::FromStr;

pub use evm::EvmLedger;
pub use memory::MemoryLedger;

/// Decimals of the native coin (AVAX, ETH).
const NATIVE_DECIMALS: u32 = 18;

/// Ledger failures. Each variant carries the context needed to diagnose it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger unavailable: {message}")]
    Unavailable {
        message: String,
        rpc_url: String,
        chain_id: Option<u64>,
    },

    #[error("No contract deployed at {address} on chain {chain_id} ({rpc_url})")]
    ContractNotDeployed {
        address: String,
        chain_id: u64,
        rpc_url: String,
    },

    #[error("Report {digest} is already anchored")]
    DuplicateRecord { digest: String },

    #[error("Insufficient funds in {address}: balance {balance} wei, required {required} wei")]
    InsufficientFunds {
        address: String,
        balance: String,
        required: String,
    },

    #[error("Invalid ledger response: {0}")]
    InvalidResponse(String),
}

/// Network, contract and signer state reported by diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub network: NetworkInfo,
    pub rpc_url: String,
    pub latest_block: u64,
    pub contract_address: String,
    pub contract_deployed: bool,
    pub contract_code_size: usize,
    pub signer_address: String,
    pub balance_wei: String,
    /// Balance in whole-coin units.
    pub balance: String,
}

/// Proof-of-existence ledger seam.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Writes a record for `digest`. An existing record fails with `DuplicateRecord`.
    async fn store_record(&self, digest: &ReportDigest) -> Result<AnchorReceipt, LedgerError>;

    /// Reads the record for `digest`; `None` when it was never anchored.
    async fn lookup_record(&self, digest: &ReportDigest) -> Result<Option<LedgerRecord>, LedgerError>;

    async fn network_status(&self) -> Result<NetworkStatus, LedgerError>;
}

/// Ledger seconds to a UTC datetime. Out-of-range values yield `None`.
pub fn timestamp_to_datetime(seconds: u64) -> Option<DateTime<Utc>> {
    i64::try_from(seconds)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// UTC datetime to ledger seconds, clamped at the epoch.
pub fn datetime_to_timestamp(at: &DateTime<Utc>) -> u64 {
    u64::try_from(at.timestamp()).unwrap_or(0)
}

/// Formats a wei amount in whole-coin units, e.g. `1500000000000000000` -> `"1.5"`.
pub fn format_native_amount(wei: u128) -> String {
    match BigDecimal::from_str(&wei.to_string()) {
        Ok(amount) => {
            let scaled = amount / BigDecimal::from(10u64.pow(NATIVE_DECIMALS));
            let plain = scaled.normalized().to_plain_string();
            if plain.contains('.') {
                plain.trim_end_matches('0').trim_end_matches('.').to_string()
            } else {
                plain
            }
        }
        Err(_) => wei.to_string(),
    }
}
