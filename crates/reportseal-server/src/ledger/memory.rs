//! In-process ledger with the contract's first-writer-wins semantics.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use reportseal_crypto::{keccak256, AnchorReceipt, LedgerRecord, NetworkInfo, ReportDigest};
use tokio::sync::Mutex;

use super::{datetime_to_timestamp, format_native_amount, Ledger, LedgerError, NetworkStatus};

#[derive(Debug, Default)]
struct ChainState {
    records: HashMap<ReportDigest, LedgerRecord>,
    block_number: u64,
    transactions: u64,
    /// Error returned by the next `store_record` call.
    next_write_failure: Option<LedgerError>,
}

#[derive(Debug)]
pub struct MemoryLedger {
    chain_id: u64,
    state: Mutex<ChainState>,
}

impl MemoryLedger {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            state: Mutex::new(ChainState::default()),
        }
    }

    /// Makes the next `store_record` fail with `error`.
    pub async fn fail_next_write(&self, error: LedgerError) {
        self.state.lock().await.next_write_failure = Some(error);
    }

    /// Number of successful anchoring transactions.
    pub async fn transaction_count(&self) -> u64 {
        self.state.lock().await.transactions
    }
}

impl Default for MemoryLedger {
    /// Local development chain id.
    fn default() -> Self {
        Self::new(31337)
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn store_record(&self, digest: &ReportDigest) -> Result<AnchorReceipt, LedgerError> {
        let mut state = self.state.lock().await;
        if let Some(error) = state.next_write_failure.take() {
            return Err(error);
        }
        if state.records.contains_key(digest) {
            return Err(LedgerError::DuplicateRecord {
                digest: digest.to_string(),
            });
        }

        state.block_number += 1;
        state.transactions += 1;
        let block_number = state.block_number;

        let mut preimage = digest.as_bytes().to_vec();
        preimage.extend_from_slice(&block_number.to_be_bytes());
        let transaction_ref = format!("0x{}", hex::encode(keccak256(&preimage)));

        // block.timestamp is never zero on a real chain
        let timestamp = datetime_to_timestamp(&Utc::now()).max(1);
        state.records.insert(
            *digest,
            LedgerRecord {
                digest: *digest,
                timestamp,
                transaction_ref: Some(transaction_ref.clone()),
                block_number: Some(block_number),
                network_id: self.chain_id,
            },
        );

        tracing::debug!(digest = %digest, block = block_number, "Anchored in memory ledger");
        Ok(AnchorReceipt {
            transaction_ref,
            block_number,
            network: NetworkInfo::from_chain_id(self.chain_id),
        })
    }

    async fn lookup_record(&self, digest: &ReportDigest) -> Result<Option<LedgerRecord>, LedgerError> {
        Ok(self.state.lock().await.records.get(digest).cloned())
    }

    async fn network_status(&self) -> Result<NetworkStatus, LedgerError> {
        let state = self.state.lock().await;
        Ok(NetworkStatus {
            network: NetworkInfo::from_chain_id(self.chain_id),
            rpc_url: "memory".to_string(),
            latest_block: state.block_number,
            contract_address: "memory".to_string(),
            contract_deployed: true,
            contract_code_size: 0,
            signer_address: "memory".to_string(),
            balance_wei: "0".to_string(),
            balance: format_native_amount(0),
        })
    }
}
