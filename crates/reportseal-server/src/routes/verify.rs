//! Verification endpoint.

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};

use super::{read_report_form, upload_body_limit};
use crate::error::AppError;
use crate::state::AppState;
use crate::verify::{verify_report, VerificationOutcome};

/// Creates the verify router.
pub fn router(state: AppState) -> Router {
    let limit = upload_body_limit(&state);
    Router::new()
        .route("/", post(verify_upload).layer(DefaultBodyLimit::max(limit)))
        .with_state(state)
}

/// POST /api/v1/verify
///
/// Multipart `file`. Returns `{valid: true, timestamp, ...}` when the file's
/// digest is anchored and `{valid: false, message}` when it is not.
async fn verify_upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<VerificationOutcome>, AppError> {
    let form = read_report_form(multipart?, state.max_upload_bytes).await?;
    let bytes = form
        .file
        .ok_or_else(|| AppError::BadRequest("PDF file is required".to_string()))?;

    let outcome = verify_report(&state, &bytes).await?;
    Ok(Json(outcome))
}
