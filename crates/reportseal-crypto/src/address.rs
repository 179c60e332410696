// EVM account/contract addresses

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 20-byte EVM address.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; 20]);

impl Address {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = anyhow::Error;

    /// Requires the `0x` prefix and exactly 40 hex characters. Surrounding
    /// whitespace is ignored.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let raw = trimmed
            .strip_prefix("0x")
            .ok_or_else(|| anyhow!("Invalid address '{}': missing 0x prefix", trimmed))?;

        if raw.len() != 40 {
            return Err(anyhow!(
                "Invalid address '{}': expected 40 hex characters, got {}",
                trimmed,
                raw.len()
            ));
        }
        if !raw.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow!("Invalid address '{}': non-hex characters", trimmed));
        }

        let bytes = hex::decode(raw).map_err(|e| anyhow!("Invalid address hex: {}", e))?;
        let array: [u8; 20] = bytes
            .try_into()
            .map_err(|_| anyhow!("Invalid address length"))?;
        Ok(Self(array))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
