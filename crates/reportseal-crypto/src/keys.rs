// secp256k1 account keys for the anchoring wallet

use anyhow::{anyhow, Result};
use k256::ecdsa::{SigningKey, VerifyingKey};

use crate::address::Address;
use crate::hash::keccak256;

/// Parses a hex-encoded secp256k1 private key (with or without `0x`).
pub fn signing_key_from_hex(input: &str) -> Result<SigningKey> {
    let trimmed = input.trim();
    let raw = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if raw.len() != 64 {
        return Err(anyhow!(
            "Invalid private key length: expected 64 hex characters, got {}",
            raw.len()
        ));
    }
    let bytes = hex::decode(raw).map_err(|e| anyhow!("Invalid private key hex: {}", e))?;
    SigningKey::from_slice(&bytes).map_err(|_| anyhow!("Private key is not a valid secp256k1 scalar"))
}

/// Derives the EVM address of a public key: last 20 bytes of
/// keccak256(uncompressed point without the 0x04 tag).
pub fn address_of(verifying_key: &VerifyingKey) -> Address {
    let point = verifying_key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    Address::from_bytes(out)
}
