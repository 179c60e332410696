//! Ledger client for the report registry contract on an EVM chain.

use std::time::Duration;

use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use reportseal_crypto::abi::{self, DUPLICATE_REVERT_REASON, REPORT_STORED_EVENT};
use reportseal_crypto::{
    address_of, sign_transaction, signing_key_from_hex, Address, AnchorReceipt, LedgerRecord,
    LegacyTransaction, NetworkInfo, ReportDigest,
};
use secrecy::ExposeSecret;
use serde_json::json;
use tokio::sync::{Mutex, OnceCell};

use super::rpc::{RpcClient, RpcError, TransactionReceipt};
use super::{format_native_amount, Ledger, LedgerError, NetworkStatus};
use crate::config::LedgerConfig;

/// Signs and submits `storeReport` transactions and reads `verifyReport`.
///
/// Built once at startup and shared. Nonce fetch, signing and broadcast are
/// serialized through `submit_lock`, so concurrent anchors from this process
/// never reuse a nonce.
pub struct EvmLedger {
    rpc: RpcClient,
    config: LedgerConfig,
    signer: SigningKey,
    signer_address: Address,
    chain_id: OnceCell<u64>,
    submit_lock: Mutex<()>,
}

impl EvmLedger {
    pub fn new(config: LedgerConfig, http_timeout: Duration) -> Result<Self, LedgerError> {
        let signer = signing_key_from_hex(config.private_key.expose_secret()).map_err(|e| {
            LedgerError::InvalidResponse(format!("Signing key rejected: {}", e))
        })?;
        let signer_address = address_of(signer.verifying_key());
        let rpc = RpcClient::new(config.rpc_url.clone(), http_timeout).map_err(|e| {
            LedgerError::Unavailable {
                message: e.to_string(),
                rpc_url: config.rpc_url.clone(),
                chain_id: config.chain_id,
            }
        })?;

        tracing::info!(
            rpc_url = %config.rpc_url,
            contract = %config.contract_address,
            signer = %signer_address,
            "Ledger client configured"
        );

        Ok(Self {
            rpc,
            config,
            signer,
            signer_address,
            chain_id: OnceCell::new(),
            submit_lock: Mutex::new(()),
        })
    }

    pub fn signer_address(&self) -> Address {
        self.signer_address
    }

    fn unavailable(&self, message: impl Into<String>, chain_id: Option<u64>) -> LedgerError {
        LedgerError::Unavailable {
            message: message.into(),
            rpc_url: self.config.rpc_url.clone(),
            chain_id: chain_id.or(self.config.chain_id),
        }
    }

    fn rpc_failure(&self, context: &str, err: RpcError, chain_id: Option<u64>) -> LedgerError {
        match err {
            RpcError::Malformed(message) => LedgerError::InvalidResponse(format!("{}: {}", context, message)),
            other => self.unavailable(format!("{}: {}", context, other), chain_id),
        }
    }

    /// Chain id reported by the node, checked against the configured one.
    async fn chain_id(&self) -> Result<u64, LedgerError> {
        self.chain_id
            .get_or_try_init(|| async {
                let reported = self
                    .rpc
                    .chain_id()
                    .await
                    .map_err(|e| self.rpc_failure("eth_chainId", e, None))?;
                if let Some(expected) = self.config.chain_id {
                    if expected != reported {
                        return Err(self.unavailable(
                            format!("Node is on chain {}, expected chain {}", reported, expected),
                            Some(reported),
                        ));
                    }
                }
                tracing::debug!(chain_id = reported, "Connected to ledger network");
                Ok::<u64, LedgerError>(reported)
            })
            .await
            .copied()
    }

    /// Fails with `ContractNotDeployed` when there is no code at the contract address.
    async fn ensure_deployed(&self, chain_id: u64) -> Result<usize, LedgerError> {
        let code = self
            .rpc
            .get_code(&self.config.contract_address)
            .await
            .map_err(|e| self.rpc_failure("eth_getCode", e, Some(chain_id)))?;
        if code.is_empty() {
            tracing::error!(
                contract = %self.config.contract_address,
                chain_id,
                rpc_url = %self.config.rpc_url,
                "No contract code at configured address"
            );
            return Err(LedgerError::ContractNotDeployed {
                address: self.config.contract_address.to_string(),
                chain_id,
                rpc_url: self.config.rpc_url.clone(),
            });
        }
        Ok(code.len())
    }

    /// Transaction hash and block of the `ReportStored` event for `digest`, best effort.
    async fn find_anchor_event(&self, digest: &ReportDigest) -> Result<Option<(Option<String>, Option<u64>)>, RpcError> {
        let filter = json!({
            "address": self.config.contract_address.to_string(),
            "fromBlock": self.config.deploy_block,
            "toBlock": "latest",
            "topics": [
                format!("0x{}", hex::encode(abi::event_topic(REPORT_STORED_EVENT))),
                format!("0x{}", hex::encode(abi::indexed_string_topic(&digest.to_string()))),
            ],
        });
        let logs = self.rpc.get_logs(filter).await?;
        Ok(logs
            .into_iter()
            .next()
            .map(|log| (log.transaction_hash, log.block_number)))
    }

    async fn wait_for_receipt(&self, tx_hash: &str, chain_id: u64) -> Result<TransactionReceipt, LedgerError> {
        let poll = async {
            loop {
                match self.rpc.transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => return Ok(receipt),
                    Ok(None) => {}
                    Err(RpcError::Transport(message)) => {
                        tracing::warn!(tx_hash, error = %message, "Receipt poll failed, retrying");
                    }
                    Err(e) => return Err(self.rpc_failure("eth_getTransactionReceipt", e, Some(chain_id))),
                }
                tokio::time::sleep(self.config.poll_interval).await;
            }
        };

        tokio::time::timeout(self.config.confirm_timeout, poll)
            .await
            .map_err(|_| {
                self.unavailable(
                    format!(
                        "Transaction {} not confirmed within {}s",
                        tx_hash,
                        self.config.confirm_timeout.as_secs()
                    ),
                    Some(chain_id),
                )
            })?
    }

    /// Maps a failed submission into the taxonomy.
    fn submission_failure(&self, context: &str, err: RpcError, digest: &ReportDigest, chain_id: u64) -> LedgerError {
        if is_duplicate_revert(&err) {
            return LedgerError::DuplicateRecord {
                digest: digest.to_string(),
            };
        }
        if let RpcError::Node { message, .. } = &err {
            if message.to_ascii_lowercase().contains("insufficient funds") {
                return LedgerError::InsufficientFunds {
                    address: self.signer_address.to_string(),
                    balance: "unknown".to_string(),
                    required: "unknown".to_string(),
                };
            }
        }
        self.rpc_failure(context, err, Some(chain_id))
    }
}

/// Whether a node error is the contract's duplicate-report revert.
pub fn is_duplicate_revert(err: &RpcError) -> bool {
    match err {
        RpcError::Node { message, .. } => {
            message.contains(DUPLICATE_REVERT_REASON)
                || err
                    .revert_data()
                    .and_then(|data| abi::decode_revert_reason(&data))
                    .is_some_and(|reason| reason == DUPLICATE_REVERT_REASON)
        }
        _ => false,
    }
}

#[async_trait]
impl Ledger for EvmLedger {
    async fn store_record(&self, digest: &ReportDigest) -> Result<AnchorReceipt, LedgerError> {
        let chain_id = self.chain_id().await?;
        self.ensure_deployed(chain_id).await?;

        if self.lookup_record(digest).await?.is_some() {
            tracing::info!(digest = %digest, "Report already anchored");
            return Err(LedgerError::DuplicateRecord {
                digest: digest.to_string(),
            });
        }

        let data = abi::store_report_call(&digest.to_string());
        let contract = self.config.contract_address;

        let (tx_hash, nonce) = {
            let _guard = self.submit_lock.lock().await;

            let estimate = self
                .rpc
                .estimate_gas(&self.signer_address, &contract, &data)
                .await
                .map_err(|e| self.submission_failure("eth_estimateGas", e, digest, chain_id))?;
            let gas_limit = self.config.gas_limit.max(estimate);

            let gas_price = self
                .rpc
                .gas_price()
                .await
                .map_err(|e| self.rpc_failure("eth_gasPrice", e, Some(chain_id)))?;
            let balance = self
                .rpc
                .get_balance(&self.signer_address)
                .await
                .map_err(|e| self.rpc_failure("eth_getBalance", e, Some(chain_id)))?;
            let required = u128::from(gas_limit).saturating_mul(gas_price);
            if balance < required {
                tracing::error!(
                    signer = %self.signer_address,
                    balance = %format_native_amount(balance),
                    required = %format_native_amount(required),
                    "Signer cannot pay for anchoring"
                );
                return Err(LedgerError::InsufficientFunds {
                    address: self.signer_address.to_string(),
                    balance: balance.to_string(),
                    required: required.to_string(),
                });
            }

            let nonce = self
                .rpc
                .pending_nonce(&self.signer_address)
                .await
                .map_err(|e| self.rpc_failure("eth_getTransactionCount", e, Some(chain_id)))?;

            let tx = LegacyTransaction {
                nonce,
                gas_price,
                gas_limit,
                to: contract,
                value: 0,
                data,
                chain_id,
            };
            let signed = sign_transaction(&self.signer, &tx)
                .map_err(|e| self.unavailable(format!("Failed to sign transaction: {}", e), Some(chain_id)))?;

            let tx_hash = self
                .rpc
                .send_raw_transaction(&signed.raw_hex())
                .await
                .map_err(|e| self.submission_failure("eth_sendRawTransaction", e, digest, chain_id))?;
            (tx_hash, nonce)
        };

        tracing::info!(digest = %digest, tx_hash = %tx_hash, nonce, "Anchoring transaction submitted");

        let receipt = self.wait_for_receipt(&tx_hash, chain_id).await?;
        if !receipt.success {
            // Reverted: either another writer anchored first or the call failed outright.
            if self.lookup_record(digest).await?.is_some() {
                tracing::info!(digest = %digest, tx_hash = %tx_hash, "Lost anchoring race");
                return Err(LedgerError::DuplicateRecord {
                    digest: digest.to_string(),
                });
            }
            return Err(self.unavailable(format!("Transaction {} reverted", tx_hash), Some(chain_id)));
        }

        tracing::info!(
            digest = %digest,
            tx_hash = %receipt.transaction_hash,
            block = receipt.block_number,
            "Report anchored"
        );

        Ok(AnchorReceipt {
            transaction_ref: receipt.transaction_hash,
            block_number: receipt.block_number,
            network: NetworkInfo::from_chain_id(chain_id),
        })
    }

    async fn lookup_record(&self, digest: &ReportDigest) -> Result<Option<LedgerRecord>, LedgerError> {
        let chain_id = self.chain_id().await?;
        let output = self
            .rpc
            .eth_call(&self.config.contract_address, &abi::verify_report_call(&digest.to_string()))
            .await
            .map_err(|e| self.rpc_failure("verifyReport", e, Some(chain_id)))?;

        if output.is_empty() {
            // A call to an address without code returns no data.
            self.ensure_deployed(chain_id).await?;
            return Err(LedgerError::InvalidResponse(
                "verifyReport returned no data".to_string(),
            ));
        }

        let raw_timestamp = abi::decode_uint(&output)
            .map_err(|e| LedgerError::InvalidResponse(format!("verifyReport: {}", e)))?;
        if raw_timestamp == 0 {
            return Ok(None);
        }
        let timestamp = u64::try_from(raw_timestamp)
            .map_err(|_| LedgerError::InvalidResponse(format!("timestamp {} out of range", raw_timestamp)))?;

        let (transaction_ref, block_number) = match self.find_anchor_event(digest).await {
            Ok(Some(found)) => found,
            Ok(None) => (None, None),
            Err(e) => {
                tracing::warn!(digest = %digest, error = %e, "Could not read ReportStored logs");
                (None, None)
            }
        };

        Ok(Some(LedgerRecord {
            digest: *digest,
            timestamp,
            transaction_ref,
            block_number,
            network_id: chain_id,
        }))
    }

    async fn network_status(&self) -> Result<NetworkStatus, LedgerError> {
        let chain_id = self.chain_id().await?;
        let latest_block = self
            .rpc
            .block_number()
            .await
            .map_err(|e| self.rpc_failure("eth_blockNumber", e, Some(chain_id)))?;
        let code = self
            .rpc
            .get_code(&self.config.contract_address)
            .await
            .map_err(|e| self.rpc_failure("eth_getCode", e, Some(chain_id)))?;
        let balance = self
            .rpc
            .get_balance(&self.signer_address)
            .await
            .map_err(|e| self.rpc_failure("eth_getBalance", e, Some(chain_id)))?;

        Ok(NetworkStatus {
            network: NetworkInfo::from_chain_id(chain_id),
            rpc_url: self.config.rpc_url.clone(),
            latest_block,
            contract_address: self.config.contract_address.to_string(),
            contract_deployed: !code.is_empty(),
            contract_code_size: code.len(),
            signer_address: self.signer_address.to_string(),
            balance_wei: balance.to_string(),
            balance: format_native_amount(balance),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_revert_by_message() {
        let err = RpcError::Node {
            code: 3,
            message: "execution reverted: Report already stored".to_string(),
            data: None,
        };
        assert!(is_duplicate_revert(&err));
    }

    #[test]
    fn test_duplicate_revert_by_data() {
        let payload = abi::encode_revert_reason(DUPLICATE_REVERT_REASON);
        let err = RpcError::Node {
            code: 3,
            message: "execution reverted".to_string(),
            data: Some(format!("0x{}", hex::encode(payload))),
        };
        assert!(is_duplicate_revert(&err));
    }

    #[test]
    fn test_other_revert_is_not_duplicate() {
        let payload = abi::encode_revert_reason("Ownable: caller is not the owner");
        let err = RpcError::Node {
            code: 3,
            message: "execution reverted".to_string(),
            data: Some(format!("0x{}", hex::encode(payload))),
        };
        assert!(!is_duplicate_revert(&err));
        assert!(!is_duplicate_revert(&RpcError::Transport("timeout".to_string())));
    }
}
