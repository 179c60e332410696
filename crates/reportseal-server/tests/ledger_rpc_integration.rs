//! Integration tests for the JSON-RPC ledger client.
//!
//! A small in-process node answers the handful of JSON-RPC methods the
//! client uses and emulates the registry contract's storage.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::State, routing::post, Json, Router};
use reportseal_crypto::abi::{self, DUPLICATE_REVERT_REASON};
use reportseal_crypto::{decode_signed_transaction, digest, Address};
use reportseal_server::config::LedgerConfig;
use reportseal_server::ledger::{EvmLedger, Ledger, LedgerError};
use secrecy::SecretString;
use serde_json::{json, Value};

const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const DEV_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
const CONTRACT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
const FUJI: u64 = 43113;
const BLOCK_TIME: u64 = 1_700_000_000;

/// What the fake node knows about the chain.
struct FakeNode {
    code: Vec<u8>,
    /// digest string -> (timestamp, tx hash, block)
    records: HashMap<String, (u64, String, u64)>,
    balance: u128,
    /// Makes `eth_estimateGas` revert as if another writer just won.
    revert_estimate: bool,
    /// Another writer's transaction for the same digest lands just before ours.
    front_run: bool,
    /// Mined transactions revert without recording anything.
    revert_receipts: bool,
    /// Transactions are accepted but never mined.
    withhold_receipts: bool,
    block: u64,
    sent: Vec<Vec<u8>>,
    /// tx hash -> (block, success)
    receipts: HashMap<String, (u64, bool)>,
}

impl FakeNode {
    fn new() -> Self {
        Self {
            code: vec![0x60, 0x80, 0x60, 0x40],
            records: HashMap::new(),
            balance: 1_500_000_000_000_000_000,
            revert_estimate: false,
            front_run: false,
            revert_receipts: false,
            withhold_receipts: false,
            block: 100,
            sent: Vec::new(),
            receipts: HashMap::new(),
        }
    }

    fn respond(&mut self, method: &str, params: &Value) -> Result<Value, Value> {
        let hex_quantity = |n: u128| json!(format!("0x{:x}", n));
        match method {
            "eth_chainId" => Ok(hex_quantity(FUJI as u128)),
            "eth_blockNumber" => Ok(hex_quantity(self.block as u128)),
            "eth_getCode" => Ok(json!(format!("0x{}", hex::encode(&self.code)))),
            "eth_getBalance" => Ok(hex_quantity(self.balance)),
            "eth_gasPrice" => Ok(hex_quantity(25_000_000_000)),
            "eth_getTransactionCount" => Ok(hex_quantity(self.sent.len() as u128)),
            "eth_call" => {
                if self.code.is_empty() {
                    return Ok(json!("0x"));
                }
                let digest = call_argument(&params[0]["data"]);
                let timestamp = self.records.get(&digest).map(|r| r.0).unwrap_or(0);
                Ok(json!(format!("0x{}", hex::encode(abi::encode_uint(timestamp as u128)))))
            }
            "eth_estimateGas" => {
                let already_stored = self.records.contains_key(&call_argument(&params[0]["data"]));
                if self.revert_estimate || (already_stored && !self.front_run) {
                    return Err(json!({
                        "code": 3,
                        "message": "execution reverted",
                        "data": format!("0x{}", hex::encode(abi::encode_revert_reason(DUPLICATE_REVERT_REASON))),
                    }));
                }
                Ok(hex_quantity(100_000))
            }
            "eth_sendRawTransaction" => {
                let raw = hex::decode(params[0].as_str().unwrap().trim_start_matches("0x")).unwrap();
                let decoded = decode_signed_transaction(&raw).unwrap();
                let digest = abi::decode_string(&decoded.tx.data[4..]).unwrap();
                let hash = format!("0x{}", hex::encode(decoded.hash));

                self.sent.push(raw);
                if self.withhold_receipts {
                    return Ok(json!(hash));
                }
                if self.front_run {
                    self.block += 1;
                    self.records
                        .insert(digest.clone(), (BLOCK_TIME, "0xfront".to_string(), self.block));
                }

                self.block += 1;
                let success = !self.revert_receipts && !self.records.contains_key(&digest);
                if success {
                    self.records.insert(digest, (BLOCK_TIME, hash.clone(), self.block));
                }
                self.receipts.insert(hash.clone(), (self.block, success));
                Ok(json!(hash))
            }
            "eth_getTransactionReceipt" => {
                let hash = params[0].as_str().unwrap();
                Ok(match self.receipts.get(hash) {
                    Some((block, success)) => json!({
                        "transactionHash": hash,
                        "blockNumber": format!("0x{:x}", block),
                        "status": if *success { "0x1" } else { "0x0" },
                    }),
                    None => Value::Null,
                })
            }
            "eth_getLogs" => {
                let wanted = params[0]["topics"][1].as_str().unwrap_or_default().to_string();
                let logs: Vec<Value> = self
                    .records
                    .iter()
                    .filter(|(digest, _)| format!("0x{}", hex::encode(abi::indexed_string_topic(digest))) == wanted)
                    .map(|(_, (_, hash, block))| {
                        json!({
                            "transactionHash": hash,
                            "blockNumber": format!("0x{:x}", block),
                            "topics": [],
                            "data": "0x",
                        })
                    })
                    .collect();
                Ok(json!(logs))
            }
            other => Err(json!({ "code": -32601, "message": format!("method {} not found", other) })),
        }
    }
}

/// Decodes the string argument of `verifyReport`/`storeReport` calldata.
fn call_argument(data: &Value) -> String {
    let bytes = hex::decode(data.as_str().unwrap().trim_start_matches("0x")).unwrap();
    abi::decode_string(&bytes[4..]).unwrap()
}

type SharedNode = Arc<Mutex<FakeNode>>;

async fn handle(State(node): State<SharedNode>, Json(request): Json<Value>) -> Json<Value> {
    let id = request["id"].clone();
    let method = request["method"].as_str().unwrap_or_default().to_string();
    let outcome = node.lock().unwrap().respond(&method, &request["params"]);
    Json(match outcome {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err(error) => json!({ "jsonrpc": "2.0", "id": id, "error": error }),
    })
}

async fn spawn_node(node: FakeNode) -> (String, SharedNode) {
    let shared = Arc::new(Mutex::new(node));
    let app = Router::new().route("/", post(handle)).with_state(shared.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), shared)
}

fn ledger_config(rpc_url: String, chain_id: Option<u64>) -> LedgerConfig {
    LedgerConfig {
        rpc_url,
        private_key: SecretString::from(DEV_KEY.to_string()),
        contract_address: CONTRACT.parse().unwrap(),
        chain_id,
        gas_limit: 200_000,
        confirm_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(10),
        deploy_block: "earliest".to_string(),
    }
}

async fn ledger_for(node: FakeNode) -> (EvmLedger, SharedNode) {
    let (url, shared) = spawn_node(node).await;
    let ledger = EvmLedger::new(ledger_config(url, Some(FUJI)), Duration::from_secs(5)).unwrap();
    (ledger, shared)
}

fn successful_receipts(node: &SharedNode) -> usize {
    node.lock().unwrap().receipts.values().filter(|(_, ok)| *ok).count()
}

#[tokio::test]
async fn test_store_then_lookup() {
    let (ledger, node) = ledger_for(FakeNode::new()).await;
    let d = digest(b"report-v1");

    assert!(ledger.lookup_record(&d).await.unwrap().is_none());

    let receipt = ledger.store_record(&d).await.unwrap();
    assert_eq!(receipt.network.chain_id, FUJI);
    assert_eq!(receipt.network.name, "fuji");
    assert_eq!(receipt.block_number, 101);

    {
        let node = node.lock().unwrap();
        assert_eq!(node.sent.len(), 1);
        let decoded = decode_signed_transaction(&node.sent[0]).unwrap();
        assert_eq!(decoded.from, DEV_ADDRESS.parse::<Address>().unwrap());
        assert_eq!(decoded.tx.to, CONTRACT.parse::<Address>().unwrap());
        assert_eq!(decoded.tx.chain_id, FUJI);
        assert_eq!(decoded.tx.gas_limit, 200_000);
        assert_eq!(abi::decode_string(&decoded.tx.data[4..]).unwrap(), d.to_string());
        assert_eq!(format!("0x{}", hex::encode(decoded.hash)), receipt.transaction_ref);
    }

    let record = ledger.lookup_record(&d).await.unwrap().expect("anchored");
    assert_eq!(record.timestamp, BLOCK_TIME);
    assert_eq!(record.network_id, FUJI);
    assert_eq!(record.transaction_ref.as_deref(), Some(receipt.transaction_ref.as_str()));
    assert_eq!(record.block_number, Some(101));
}

#[tokio::test]
async fn test_existing_record_is_duplicate() {
    let mut fake = FakeNode::new();
    let d = digest(b"already there");
    fake.records.insert(d.to_string(), (BLOCK_TIME, "0xabc".to_string(), 50));
    let (ledger, node) = ledger_for(fake).await;

    let err = ledger.store_record(&d).await.unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateRecord { .. }));
    assert!(node.lock().unwrap().sent.is_empty());
}

#[tokio::test]
async fn test_duplicate_revert_during_estimate() {
    let mut fake = FakeNode::new();
    fake.revert_estimate = true;
    let (ledger, node) = ledger_for(fake).await;

    let err = ledger.store_record(&digest(b"racing")).await.unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateRecord { .. }));
    assert!(node.lock().unwrap().sent.is_empty());
}

#[tokio::test]
async fn test_missing_contract_code() {
    let mut fake = FakeNode::new();
    fake.code.clear();
    let (ledger, _node) = ledger_for(fake).await;
    let d = digest(b"report-v1");

    match ledger.store_record(&d).await.unwrap_err() {
        LedgerError::ContractNotDeployed { address, chain_id, rpc_url } => {
            assert_eq!(address, CONTRACT);
            assert_eq!(chain_id, FUJI);
            assert!(rpc_url.starts_with("http://127.0.0.1:"));
        }
        other => panic!("expected ContractNotDeployed, got {:?}", other),
    }

    let err = ledger.lookup_record(&d).await.unwrap_err();
    assert!(matches!(err, LedgerError::ContractNotDeployed { .. }));
}

#[tokio::test]
async fn test_zero_timestamp_is_not_found() {
    let (ledger, _node) = ledger_for(FakeNode::new()).await;
    assert!(ledger.lookup_record(&digest(b"unknown")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_insufficient_funds() {
    let mut fake = FakeNode::new();
    fake.balance = 1_000;
    let (ledger, node) = ledger_for(fake).await;

    match ledger.store_record(&digest(b"poor")).await.unwrap_err() {
        LedgerError::InsufficientFunds { address, balance, required } => {
            assert_eq!(address, DEV_ADDRESS);
            assert_eq!(balance, "1000");
            assert_eq!(required, (200_000u128 * 25_000_000_000).to_string());
        }
        other => panic!("expected InsufficientFunds, got {:?}", other),
    }
    assert!(node.lock().unwrap().sent.is_empty());
}

#[tokio::test]
async fn test_chain_mismatch_is_unavailable() {
    let (url, _node) = spawn_node(FakeNode::new()).await;
    let ledger = EvmLedger::new(ledger_config(url, Some(43114)), Duration::from_secs(5)).unwrap();

    match ledger.lookup_record(&digest(b"x")).await.unwrap_err() {
        LedgerError::Unavailable { message, chain_id, .. } => {
            assert!(message.contains("expected chain 43114"));
            assert_eq!(chain_id, Some(FUJI));
        }
        other => panic!("expected Unavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_network_status() {
    let (ledger, _node) = ledger_for(FakeNode::new()).await;

    let status = ledger.network_status().await.unwrap();
    assert_eq!(status.network.chain_id, FUJI);
    assert_eq!(status.latest_block, 100);
    assert!(status.contract_deployed);
    assert_eq!(status.contract_code_size, 4);
    assert_eq!(status.signer_address, DEV_ADDRESS);
    assert_eq!(status.balance, "1.5");
}

#[tokio::test]
async fn test_unreachable_node() {
    // Nothing listens on port 1
    let ledger = EvmLedger::new(
        ledger_config("http://127.0.0.1:1".to_string(), None),
        Duration::from_secs(2),
    )
    .unwrap();

    let err = ledger.lookup_record(&digest(b"x")).await.unwrap_err();
    assert!(matches!(err, LedgerError::Unavailable { .. }));
}

#[tokio::test]
async fn test_concurrent_store_one_wins() {
    let (ledger, node) = ledger_for(FakeNode::new()).await;
    let ledger = Arc::new(ledger);
    let d = digest(b"contended report");

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.store_record(&d).await })
        })
        .collect();

    let mut fresh = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => fresh += 1,
            Err(LedgerError::DuplicateRecord { .. }) => duplicates += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!((fresh, duplicates), (1, 1));
    assert_eq!(successful_receipts(&node), 1);
    assert_eq!(node.lock().unwrap().records.len(), 1);
}

/// Our transaction is mined after another writer's and reverts.
#[tokio::test]
async fn test_reverted_receipt_after_lost_race_is_duplicate() {
    let mut fake = FakeNode::new();
    fake.front_run = true;
    let (ledger, node) = ledger_for(fake).await;
    let d = digest(b"front-run report");

    let err = ledger.store_record(&d).await.unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateRecord { .. }));

    let node = node.lock().unwrap();
    assert_eq!(node.sent.len(), 1);
    assert_eq!(node.receipts.len(), 1);
    assert_eq!(node.records[&d.to_string()].1, "0xfront");
}

#[tokio::test]
async fn test_reverted_receipt_without_record_is_unavailable() {
    let mut fake = FakeNode::new();
    fake.revert_receipts = true;
    let (ledger, node) = ledger_for(fake).await;

    match ledger.store_record(&digest(b"doomed")).await.unwrap_err() {
        LedgerError::Unavailable { message, chain_id, .. } => {
            assert!(message.contains("reverted"));
            assert_eq!(chain_id, Some(FUJI));
        }
        other => panic!("expected Unavailable, got {:?}", other),
    }
    assert_eq!(node.lock().unwrap().sent.len(), 1);
}

#[tokio::test]
async fn test_unconfirmed_transaction_times_out() {
    let mut fake = FakeNode::new();
    fake.withhold_receipts = true;
    let (url, node) = spawn_node(fake).await;
    let mut config = ledger_config(url, Some(FUJI));
    config.confirm_timeout = Duration::from_millis(200);
    let ledger = EvmLedger::new(config, Duration::from_secs(5)).unwrap();

    match ledger.store_record(&digest(b"stuck")).await.unwrap_err() {
        LedgerError::Unavailable { message, .. } => assert!(message.contains("not confirmed")),
        other => panic!("expected Unavailable, got {:?}", other),
    }
    assert_eq!(node.lock().unwrap().sent.len(), 1);
}
