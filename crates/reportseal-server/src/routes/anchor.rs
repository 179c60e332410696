//! Anchoring endpoint for already-known digests.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use super::parse_digest;
use crate::error::AppError;
use crate::pipeline::{self, normalize_owner, AnchorOutcome};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorRequest {
    pub digest: String,
    pub owner_identity: Option<String>,
}

/// Creates the anchor router.
pub fn router(state: AppState) -> Router {
    Router::new().route("/", post(anchor_digest)).with_state(state)
}

/// POST /api/v1/anchor
///
/// Anchors a digest. Anchoring an already-anchored digest succeeds with
/// `alreadyAnchored: true`. With `ownerIdentity`, a registry entry is added,
/// which is how an upload whose anchoring failed gets repaired.
async fn anchor_digest(
    State(state): State<AppState>,
    body: Result<Json<AnchorRequest>, JsonRejection>,
) -> Result<Json<AnchorOutcome>, AppError> {
    let Json(request) = body?;
    let digest = parse_digest(&request.digest)?;
    let owner = normalize_owner(request.owner_identity.as_deref());
    let outcome = pipeline::anchor(&state, digest, owner.as_deref()).await?;
    Ok(Json(outcome))
}
