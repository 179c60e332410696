// Minimal Solidity ABI encoding for the report registry contract
//
// Contract surface:
//   function storeReport(string _reportHash)
//   function verifyReport(string _reportHash) view returns (uint256)
//   event ReportStored(string indexed reportHash, uint256 timestamp)

use anyhow::{anyhow, Result};

use crate::hash::keccak256;

pub const STORE_REPORT_SIGNATURE: &str = "storeReport(string)";
pub const VERIFY_REPORT_SIGNATURE: &str = "verifyReport(string)";
pub const REPORT_STORED_EVENT: &str = "ReportStored(string,uint256)";

/// Revert reason the contract uses for an already-anchored digest.
pub const DUPLICATE_REVERT_REASON: &str = "Report already stored";

/// Selector of the standard `Error(string)` revert payload.
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

const WORD: usize = 32;

/// First four bytes of the Keccak-256 of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Topic of a non-anonymous event.
pub fn event_topic(signature: &str) -> [u8; 32] {
    keccak256(signature.as_bytes())
}

/// Topic value of an indexed `string` parameter (the hash of its bytes).
pub fn indexed_string_topic(value: &str) -> [u8; 32] {
    keccak256(value.as_bytes())
}

/// Encodes an unsigned integer as a 32-byte word.
pub fn encode_uint(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Calldata for a function taking a single `string` argument.
pub fn encode_string_call(signature: &str, value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let padded_len = bytes.len().div_ceil(WORD) * WORD;

    let mut data = Vec::with_capacity(4 + 2 * WORD + padded_len);
    data.extend_from_slice(&selector(signature));
    // offset of the dynamic argument, relative to the start of the arguments
    data.extend_from_slice(&encode_uint(WORD as u128));
    data.extend_from_slice(&encode_uint(bytes.len() as u128));
    data.extend_from_slice(bytes);
    data.resize(4 + 2 * WORD + padded_len, 0);
    data
}

/// Calldata for `storeReport(digest)`.
pub fn store_report_call(digest: &str) -> Vec<u8> {
    encode_string_call(STORE_REPORT_SIGNATURE, digest)
}

/// Calldata for `verifyReport(digest)`.
pub fn verify_report_call(digest: &str) -> Vec<u8> {
    encode_string_call(VERIFY_REPORT_SIGNATURE, digest)
}

/// Decodes a `uint256` return value that must fit in 128 bits.
pub fn decode_uint(data: &[u8]) -> Result<u128> {
    if data.len() < WORD {
        return Err(anyhow!(
            "ABI uint256 too short: expected {} bytes, got {}",
            WORD,
            data.len()
        ));
    }
    let word = &data[..WORD];
    if word[..16].iter().any(|b| *b != 0) {
        return Err(anyhow!("ABI uint256 exceeds 128 bits"));
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(low))
}

/// Decodes a single ABI-encoded `string` return value or argument block.
pub fn decode_string(data: &[u8]) -> Result<String> {
    let offset = usize::try_from(decode_uint(data)?)
        .map_err(|_| anyhow!("ABI string offset out of range"))?;
    let start = offset
        .checked_add(WORD)
        .ok_or_else(|| anyhow!("ABI string offset out of range"))?;
    let len_word = data
        .get(offset..start)
        .ok_or_else(|| anyhow!("ABI string length out of bounds"))?;
    let len = usize::try_from(decode_uint(len_word)?)
        .map_err(|_| anyhow!("ABI string length out of range"))?;
    let end = start
        .checked_add(len)
        .ok_or_else(|| anyhow!("ABI string length out of range"))?;
    let bytes = data
        .get(start..end)
        .ok_or_else(|| anyhow!("ABI string payload out of bounds"))?;
    String::from_utf8(bytes.to_vec()).map_err(|e| anyhow!("ABI string is not UTF-8: {}", e))
}

/// Extracts the message from an `Error(string)` revert payload.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.len() < 4 || data[..4] != ERROR_STRING_SELECTOR {
        return None;
    }
    decode_string(&data[4..]).ok()
}

/// Encodes an `Error(string)` revert payload.
pub fn encode_revert_reason(reason: &str) -> Vec<u8> {
    let mut data = encode_string_call("Error(string)", reason);
    data[..4].copy_from_slice(&ERROR_STRING_SELECTOR);
    data
}
