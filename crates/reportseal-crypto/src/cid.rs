// Content identifier syntax checks
//
// CIDs are assigned by the storage network. We only check that a string is
// shaped like one before it is used in a gateway URL or stored.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Multihash code for sha2-256.
const MULTIHASH_SHA2_256: u8 = 0x12;

/// Length of a CIDv0 string ("Qm" + 44 base58 characters).
const CID_V0_LEN: usize = 46;

/// Shortest CIDv1 string we accept (multibase prefix + version + codec + multihash).
const CID_V1_MIN_LEN: usize = 10;

/// A syntactically valid content identifier (CIDv0 or multibase CIDv1).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cid(String);

impl Cid {
    /// Builds a CIDv0 string from a raw sha2-256 digest.
    pub fn v0_from_sha256(hash: &[u8; 32]) -> Self {
        let mut multihash = Vec::with_capacity(34);
        multihash.push(MULTIHASH_SHA2_256);
        multihash.push(32);
        multihash.extend_from_slice(hash);
        Self(bs58::encode(multihash).into_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a version 0 (base58 "Qm...") identifier.
    pub fn is_v0(&self) -> bool {
        self.0.starts_with("Qm")
    }
}

fn parse_v0(s: &str) -> Result<()> {
    if s.len() != CID_V0_LEN {
        return Err(anyhow!(
            "Invalid CIDv0 length: expected {} characters, got {}",
            CID_V0_LEN,
            s.len()
        ));
    }
    let bytes = bs58::decode(s)
        .into_vec()
        .map_err(|e| anyhow!("Invalid CIDv0 base58: {}", e))?;
    if bytes.len() != 34 || bytes[0] != MULTIHASH_SHA2_256 || bytes[1] != 32 {
        return Err(anyhow!("Invalid CIDv0 multihash header"));
    }
    Ok(())
}

fn parse_v1(s: &str) -> Result<()> {
    if s.len() < CID_V1_MIN_LEN {
        return Err(anyhow!("CIDv1 too short: {} characters", s.len()));
    }
    let (prefix, body) = s.split_at(1);
    match prefix {
        // base32 lower, no padding
        "b" => {
            if !body.chars().all(|c| c.is_ascii_lowercase() || ('2'..='7').contains(&c)) {
                return Err(anyhow!("Invalid CIDv1 base32 characters"));
            }
            Ok(())
        }
        // base58btc; first decoded byte is the CID version
        "z" => {
            let bytes = bs58::decode(body)
                .into_vec()
                .map_err(|e| anyhow!("Invalid CIDv1 base58: {}", e))?;
            if bytes.first() != Some(&1) {
                return Err(anyhow!("Unsupported CID version"));
            }
            Ok(())
        }
        other => Err(anyhow!("Unsupported multibase prefix '{}'", other)),
    }
}

impl FromStr for Cid {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow!("Empty CID"));
        }
        if s.starts_with("Qm") {
            parse_v0(s)?;
        } else {
            parse_v1(s)?;
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Cid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Cid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
