// Digest engine for ReportSeal
//
// Artifact digests are SHA-256 rendered as "0x" + 64 lowercase hex characters.
// Storage keys, ledger keys and registry rows all compare this string
// byte-for-byte, so the rendering must never vary.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use sha3::Keccak256;

/// Length of a SHA-256 digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Computes the SHA-256 hash of the input bytes and returns it as a lowercase hex string.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Computes the Keccak-256 hash used by EVM chains (selectors, addresses, topics).
pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// SHA-256 digest of a report artifact.
///
/// The canonical string form is `0x` followed by 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReportDigest([u8; DIGEST_LEN]);

impl ReportDigest {
    /// Wraps raw digest bytes.
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex without the `0x` prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Computes the digest of an artifact.
pub fn digest(bytes: &[u8]) -> ReportDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    ReportDigest(hasher.finalize().into())
}

impl fmt::Display for ReportDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ReportDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReportDigest({})", self)
    }
}

impl FromStr for ReportDigest {
    type Err = anyhow::Error;

    /// Accepts an optional `0x` prefix and either hex case.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let raw = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if raw.len() != DIGEST_LEN * 2 {
            return Err(anyhow!(
                "Invalid digest length: expected {} hex characters, got {}",
                DIGEST_LEN * 2,
                raw.len()
            ));
        }

        let bytes = hex::decode(raw).map_err(|e| anyhow!("Invalid digest hex: {}", e))?;
        let array: [u8; DIGEST_LEN] = bytes
            .try_into()
            .map_err(|_| anyhow!("Invalid digest length"))?;
        Ok(Self(array))
    }
}

impl Serialize for ReportDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReportDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
