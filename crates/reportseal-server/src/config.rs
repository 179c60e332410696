//! Service configuration, read once from the environment at startup.
//!
//! The ledger and storage sections are validated independently: a service
//! with valid storage credentials but no contract address still starts and
//! serves downloads, while anchoring fails with `Misconfigured` before any
//! network call.

use std::net::SocketAddr;
use std::time::Duration;

use reportseal_crypto::{signing_key_from_hex, Address};
use secrecy::SecretString;

pub const RPC_URL_VAR: &str = "AVALANCHE_RPC_URL";
pub const PRIVATE_KEY_VAR: &str = "AVALANCHE_PRIVATE_KEY";
pub const CONTRACT_ADDRESS_VAR: &str = "AVALANCHE_CONTRACT_ADDRESS";
pub const CHAIN_ID_VAR: &str = "LEDGER_CHAIN_ID";
pub const GAS_LIMIT_VAR: &str = "LEDGER_GAS_LIMIT";
pub const CONFIRM_TIMEOUT_VAR: &str = "LEDGER_CONFIRM_TIMEOUT_SECS";
pub const POLL_INTERVAL_VAR: &str = "LEDGER_POLL_INTERVAL_MS";
pub const DEPLOY_BLOCK_VAR: &str = "LEDGER_DEPLOY_BLOCK";
pub const PINATA_JWT_VAR: &str = "PINATA_JWT";
pub const PINATA_API_KEY_VAR: &str = "PINATA_API_KEY";
pub const PINATA_SECRET_VAR: &str = "PINATA_SECRET_API_KEY";
pub const PINATA_API_URL_VAR: &str = "PINATA_API_URL";
pub const PINATA_GATEWAY_VAR: &str = "PINATA_GATEWAY";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const HTTP_TIMEOUT_VAR: &str = "HTTP_TIMEOUT_SECS";
pub const MAX_UPLOAD_BYTES_VAR: &str = "MAX_UPLOAD_BYTES";
pub const BIND_ADDR_VAR: &str = "BIND_ADDR";

pub const DEFAULT_GAS_LIMIT: u64 = 200_000;
pub const DEFAULT_CONFIRM_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_500;
pub const DEFAULT_DEPLOY_BLOCK: &str = "earliest";
pub const DEFAULT_PINATA_API_URL: &str = "https://api.pinata.cloud";
pub const DEFAULT_PINATA_GATEWAY: &str = "gateway.pinata.cloud";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Configuration problem, always naming the offending variable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {variable} is not set")]
    Missing { variable: &'static str },

    #[error("Invalid configuration: {variable} {reason}")]
    Invalid { variable: &'static str, reason: String },

    #[error("Missing storage credentials: set PINATA_JWT, or both PINATA_API_KEY and PINATA_SECRET_API_KEY")]
    MissingCredentials,
}

impl ConfigError {
    /// The environment variable this error is about.
    pub fn variable(&self) -> &'static str {
        match self {
            ConfigError::Missing { variable } | ConfigError::Invalid { variable, .. } => *variable,
            ConfigError::MissingCredentials => PINATA_JWT_VAR,
        }
    }
}

/// Authentication for the pinning service.
#[derive(Debug, Clone)]
pub enum StorageCredentials {
    /// `Authorization: Bearer <jwt>`.
    Bearer(SecretString),
    /// `pinata_api_key` / `pinata_secret_api_key` header pair.
    KeyPair {
        api_key: String,
        secret_api_key: SecretString,
    },
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Pinning API base URL, without trailing slash.
    pub api_url: String,
    /// Gateway hostname used to build retrieval URLs.
    pub gateway: String,
    pub credentials: StorageCredentials,
}

impl StorageConfig {
    /// `https://{gateway}/ipfs/{cid}`.
    pub fn retrieval_url(&self, cid: &str) -> String {
        gateway_url(&self.gateway, cid)
    }
}

/// Builds a gateway retrieval URL. The gateway may be a bare hostname or a full base URL.
pub fn gateway_url(gateway: &str, cid: &str) -> String {
    let gateway = gateway.trim_end_matches('/');
    if gateway.starts_with("http://") || gateway.starts_with("https://") {
        format!("{}/ipfs/{}", gateway, cid)
    } else {
        format!("https://{}/ipfs/{}", gateway, cid)
    }
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub rpc_url: String,
    /// Hex secp256k1 key; validated here, parsed again by the ledger client.
    pub private_key: SecretString,
    pub contract_address: Address,
    /// Expected chain id. When set, a node reporting another chain is rejected.
    pub chain_id: Option<u64>,
    pub gas_limit: u64,
    pub confirm_timeout: Duration,
    pub poll_interval: Duration,
    /// First block for `ReportStored` log scans (`earliest` or a block number).
    pub deploy_block: String,
}

/// Validated service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub ledger: Result<LedgerConfig, ConfigError>,
    pub storage: Result<StorageConfig, ConfigError>,
    pub database_url: Option<SecretString>,
    pub http_timeout: Duration,
    pub max_upload_bytes: usize,
    pub bind_addr: SocketAddr,
}

impl Config {
    /// Reads the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which returns a variable's raw value.
    ///
    /// Service-level settings (bind address, timeouts) fail the whole load;
    /// ledger and storage problems are kept in their sections.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let http_timeout = Duration::from_secs(parse_or(&get, HTTP_TIMEOUT_VAR, DEFAULT_HTTP_TIMEOUT_SECS)?);
        let max_upload_bytes = parse_or(&get, MAX_UPLOAD_BYTES_VAR, DEFAULT_MAX_UPLOAD_BYTES)?;
        let bind_addr = get(BIND_ADDR_VAR)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                variable: BIND_ADDR_VAR,
                reason: format!("is not a socket address: {}", e),
            })?;

        Ok(Self {
            ledger: ledger_section(&get),
            storage: storage_section(&get),
            database_url: get(DATABASE_URL_VAR).map(SecretString::from),
            http_timeout,
            max_upload_bytes,
            bind_addr,
        })
    }

    /// Ledger section, or the error explaining why it is unusable.
    pub fn ledger(&self) -> Result<&LedgerConfig, ConfigError> {
        self.ledger.as_ref().map_err(Clone::clone)
    }

    /// Storage section, or the error explaining why it is unusable.
    pub fn storage(&self) -> Result<&StorageConfig, ConfigError> {
        self.storage.as_ref().map_err(Clone::clone)
    }
}

fn parse_or<G, T>(get: &G, variable: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(variable) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            variable,
            reason: format!("is not a valid number: {}", e),
        }),
    }
}

fn require<G>(get: &G, variable: &'static str) -> Result<String, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    get(variable).ok_or(ConfigError::Missing { variable })
}

fn ledger_section<G>(get: &G) -> Result<LedgerConfig, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let rpc_url = require(get, RPC_URL_VAR)?;
    if !(rpc_url.starts_with("http://") || rpc_url.starts_with("https://")) {
        return Err(ConfigError::Invalid {
            variable: RPC_URL_VAR,
            reason: "must be an http(s) URL".to_string(),
        });
    }

    let private_key = require(get, PRIVATE_KEY_VAR)?;
    signing_key_from_hex(&private_key).map_err(|e| ConfigError::Invalid {
        variable: PRIVATE_KEY_VAR,
        reason: e.to_string(),
    })?;

    let contract_address = require(get, CONTRACT_ADDRESS_VAR)?
        .parse::<Address>()
        .map_err(|e| ConfigError::Invalid {
            variable: CONTRACT_ADDRESS_VAR,
            reason: format!("is not a valid address: {}", e),
        })?;

    let chain_id = match get(CHAIN_ID_VAR) {
        None => None,
        Some(_) => Some(parse_or(get, CHAIN_ID_VAR, 0u64)?),
    };

    let deploy_block = get(DEPLOY_BLOCK_VAR).unwrap_or_else(|| DEFAULT_DEPLOY_BLOCK.to_string());
    let deploy_block = normalize_block_tag(&deploy_block).ok_or_else(|| ConfigError::Invalid {
        variable: DEPLOY_BLOCK_VAR,
        reason: "must be `earliest`, a decimal or a 0x-prefixed block number".to_string(),
    })?;

    Ok(LedgerConfig {
        rpc_url,
        private_key: SecretString::from(private_key),
        contract_address,
        chain_id,
        gas_limit: parse_or(get, GAS_LIMIT_VAR, DEFAULT_GAS_LIMIT)?,
        confirm_timeout: Duration::from_secs(parse_or(get, CONFIRM_TIMEOUT_VAR, DEFAULT_CONFIRM_TIMEOUT_SECS)?),
        poll_interval: Duration::from_millis(parse_or(get, POLL_INTERVAL_VAR, DEFAULT_POLL_INTERVAL_MS)?),
        deploy_block,
    })
}

/// Normalizes a block tag to its JSON-RPC form.
fn normalize_block_tag(raw: &str) -> Option<String> {
    if raw == "earliest" {
        return Some(raw.to_string());
    }
    if let Some(hex_part) = raw.strip_prefix("0x") {
        return u64::from_str_radix(hex_part, 16).ok().map(|n| format!("0x{:x}", n));
    }
    raw.parse::<u64>().ok().map(|n| format!("0x{:x}", n))
}

fn storage_section<G>(get: &G) -> Result<StorageConfig, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let credentials = match (get(PINATA_JWT_VAR), get(PINATA_API_KEY_VAR), get(PINATA_SECRET_VAR)) {
        (Some(jwt), _, _) => StorageCredentials::Bearer(SecretString::from(jwt)),
        (None, Some(api_key), Some(secret)) => StorageCredentials::KeyPair {
            api_key,
            secret_api_key: SecretString::from(secret),
        },
        _ => return Err(ConfigError::MissingCredentials),
    };

    let api_url = get(PINATA_API_URL_VAR)
        .unwrap_or_else(|| DEFAULT_PINATA_API_URL.to_string())
        .trim_end_matches('/')
        .to_string();

    Ok(StorageConfig {
        api_url,
        gateway: get(PINATA_GATEWAY_VAR).unwrap_or_else(|| DEFAULT_PINATA_GATEWAY.to_string()),
        credentials,
    })
}
