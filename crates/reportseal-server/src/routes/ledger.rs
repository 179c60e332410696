//! Direct ledger lookups.

use axum::{
    extract::{rejection::PathRejection, Path, State},
    routing::get,
    Json, Router,
};
use reportseal_crypto::{LedgerRecord, ReportDigest};
use serde::Serialize;

use super::parse_digest;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResponse {
    pub found: bool,
    pub digest: ReportDigest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<LedgerRecord>,
}

/// Creates the ledger router.
pub fn router(state: AppState) -> Router {
    Router::new().route("/{digest}", get(lookup)).with_state(state)
}

/// GET /api/v1/ledger/{digest}
async fn lookup(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<LookupResponse>, AppError> {
    let Path(raw) = path?;
    let digest = parse_digest(&raw)?;
    let record = state.ledger()?.lookup_record(&digest).await?;
    Ok(Json(LookupResponse {
        found: record.is_some(),
        digest,
        record,
    }))
}
