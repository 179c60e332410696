//! Error types for the ReportSeal server.
//!
//! Every failure leaves the API as `{success: false, error, kind, statusCode, details}`,
//! where `kind` is one of the taxonomy names returned by [`AppError::kind`].

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reportseal_crypto::{ReportDigest, StorageReceipt};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::ConfigError;
use crate::ledger::LedgerError;
use crate::registry::RegistryError;
use crate::storage::StorageError;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// The artifact was pinned but anchoring failed. The CID travels in the
    /// details so the digest can be anchored later.
    #[error("Report stored but not anchored: {error}")]
    Partial {
        #[source]
        error: LedgerError,
        digest: ReportDigest,
        receipt: StorageReceipt,
        /// Partial registry entry, when it could be recorded.
        entry_id: Option<Uuid>,
    },
}

/// Wire form of an error.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub kind: &'static str,
    pub status_code: u16,
    pub details: Value,
}

fn ledger_kind(error: &LedgerError) -> &'static str {
    match error {
        LedgerError::Unavailable { .. } | LedgerError::InvalidResponse(_) => "LedgerUnavailable",
        LedgerError::ContractNotDeployed { .. } => "ContractNotDeployed",
        LedgerError::DuplicateRecord { .. } => "DuplicateRecord",
        LedgerError::InsufficientFunds { .. } => "InsufficientFunds",
    }
}

fn ledger_status(error: &LedgerError) -> StatusCode {
    match error {
        LedgerError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
        LedgerError::ContractNotDeployed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        LedgerError::DuplicateRecord { .. } => StatusCode::CONFLICT,
        LedgerError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
    }
}

fn ledger_details(error: &LedgerError) -> Value {
    match error {
        LedgerError::Unavailable { rpc_url, chain_id, .. } => json!({
            "rpcUrl": rpc_url,
            "chainId": chain_id,
        }),
        LedgerError::ContractNotDeployed { address, chain_id, rpc_url } => json!({
            "address": address,
            "chainId": chain_id,
            "rpcUrl": rpc_url,
        }),
        LedgerError::DuplicateRecord { digest } => json!({ "digest": digest }),
        LedgerError::InsufficientFunds { address, balance, required } => json!({
            "address": address,
            "balance": balance,
            "required": required,
        }),
        LedgerError::InvalidResponse(_) => Value::Null,
    }
}

impl AppError {
    /// Taxonomy name reported as `kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(ConfigError::MissingCredentials) => "MisconfiguredCredentials",
            AppError::Config(_) => "Misconfigured",
            AppError::Storage(StorageError::Unavailable { .. }) => "StorageUnavailable",
            AppError::Storage(StorageError::Rejected { .. }) => "StorageRejected",
            AppError::Storage(StorageError::Gateway { .. }) => "GatewayError",
            AppError::Storage(StorageError::NotFound { .. }) | AppError::NotFound(_) => "NotFound",
            AppError::Ledger(e) | AppError::Partial { error: e, .. } => ledger_kind(e),
            AppError::Registry(_) => "PersistenceUnavailable",
            AppError::BadRequest(_) => "BadRequest",
            AppError::Internal(_) => "Internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Storage(StorageError::Unavailable { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Storage(StorageError::Rejected { .. }) | AppError::Storage(StorageError::Gateway { .. }) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Storage(StorageError::NotFound { .. }) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Ledger(e) | AppError::Partial { error: e, .. } => ledger_status(e),
            AppError::Registry(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Structured context for the `details` field.
    pub fn details(&self) -> Value {
        match self {
            AppError::Config(e) => json!({ "variable": e.variable() }),
            AppError::Storage(StorageError::Unavailable { status, .. }) => json!({ "status": status }),
            AppError::Storage(StorageError::Rejected { status, message, details }) => json!({
                "status": status,
                "message": message,
                "response": details,
            }),
            AppError::Storage(StorageError::Gateway { status, details }) => json!({
                "status": status,
                "body": details,
            }),
            AppError::Storage(StorageError::NotFound { cid }) => json!({ "cid": cid }),
            AppError::Ledger(e) => ledger_details(e),
            AppError::Partial { error, digest, receipt, entry_id } => {
                let mut details = json!({
                    "digest": digest,
                    "cid": receipt.cid,
                    "retrievalUrl": receipt.retrieval_url,
                    "entryId": entry_id,
                });
                if let (Value::Object(target), Value::Object(extra)) = (&mut details, ledger_details(error)) {
                    for (key, value) in extra {
                        target.entry(key).or_insert(value);
                    }
                }
                details
            }
            AppError::Registry(_)
            | AppError::BadRequest(_)
            | AppError::NotFound(_)
            | AppError::Internal(_) => Value::Null,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        let error = match self {
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        ErrorBody {
            success: false,
            error,
            kind: self.kind(),
            status_code: self.status().as_u16(),
            details: self.details(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), status = status.as_u16(), "{}", self);
        } else {
            tracing::warn!(kind = self.kind(), status = status.as_u16(), "{}", self);
        }
        (status, Json(self.to_body())).into_response()
    }
}

// Extractor rejections leave as `BadRequest` so every failure keeps the error body.

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}
