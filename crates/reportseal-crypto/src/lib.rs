// ReportSeal Crypto - digests, content identifiers and EVM primitives

pub mod abi;
pub mod address;
pub mod cid;
pub mod hash;
pub mod jcs;
pub mod keys;
pub mod rlp;
pub mod sign;
pub mod types;
pub mod verify;

pub use address::Address;
pub use cid::Cid;
pub use hash::{digest, keccak256, sha256_hex, ReportDigest};
pub use jcs::{digest_json, jcs_canonical_bytes};
pub use keys::{address_of, signing_key_from_hex};
pub use sign::{decode_signed_transaction, sign_transaction, LegacyTransaction, SignedTransaction};
pub use types::{AnchorReceipt, LedgerRecord, NetworkInfo, StorageReceipt};
pub use verify::verify_artifact;
