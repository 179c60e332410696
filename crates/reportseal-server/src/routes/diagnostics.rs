//! Diagnostics endpoint. Always answers 200; problems are reported inline.

use axum::{extract::State, routing::get, Json, Router};
use reportseal_crypto::Cid;
use serde::Serialize;

use crate::error::{AppError, ErrorBody};
use crate::ledger::NetworkStatus;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionStatus<T> {
    pub configured: bool,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> SectionStatus<T> {
    fn healthy(status: T) -> Self {
        Self {
            configured: true,
            ok: true,
            status: Some(status),
            error: None,
        }
    }

    fn failed(error: AppError) -> Self {
        Self {
            configured: !matches!(error, AppError::Config(_)),
            ok: false,
            status: None,
            error: Some(error.to_body()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStatus {
    /// Example retrieval URL, shows which gateway is in use.
    pub gateway_example: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStatus {
    pub backend: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsResponse {
    pub success: bool,
    pub ledger: SectionStatus<NetworkStatus>,
    pub storage: SectionStatus<StorageStatus>,
    pub registry: RegistryStatus,
}

/// Creates the diagnostics router.
pub fn router(state: AppState) -> Router {
    Router::new().route("/", get(diagnostics)).with_state(state)
}

/// GET /api/v1/diagnostics
///
/// Network, contract, signer and storage status.
async fn diagnostics(State(state): State<AppState>) -> Json<DiagnosticsResponse> {
    let ledger = match state.ledger() {
        Ok(ledger) => match ledger.network_status().await {
            Ok(status) => {
                if !status.contract_deployed {
                    tracing::warn!(contract = %status.contract_address, "No contract code at configured address");
                }
                SectionStatus::healthy(status)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ledger diagnostics failed");
                SectionStatus::failed(e.into())
            }
        },
        Err(e) => SectionStatus::failed(e),
    };

    let storage = match state.storage() {
        Ok(storage) => {
            // Well-known CID of the empty unixfs directory.
            let example = "QmUNLLsPACCz1vLxQVkXqqLX5R1X345qqfHbsf67hvA3Nn"
                .parse::<Cid>()
                .map(|cid| storage.retrieval_url(&cid))
                .unwrap_or_default();
            SectionStatus::healthy(StorageStatus {
                gateway_example: example,
            })
        }
        Err(e) => SectionStatus::failed(e),
    };

    Json(DiagnosticsResponse {
        success: ledger.ok && storage.ok,
        ledger,
        storage,
        registry: RegistryStatus {
            backend: state.registry().backend(),
        },
    })
}
