//! API routes for the ReportSeal server.

pub mod anchor;
pub mod diagnostics;
pub mod ledger;
pub mod reports;
pub mod storage;
pub mod verify;

use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use axum::http::{StatusCode, Uri};
use axum::Router;
use bytes::Bytes;
use reportseal_crypto::ReportDigest;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::state::AppState;

/// Room for multipart boundaries and the text fields around the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Creates the main API router with all routes mounted.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes(state))
        .fallback(unknown_route)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn unknown_route(uri: Uri) -> AppError {
    AppError::NotFound(format!("No route for {}", uri.path()))
}

/// Creates the v1 API routes.
fn api_v1_routes(state: AppState) -> Router {
    Router::new()
        .nest("/storage", storage::router(state.clone()))
        .nest("/anchor", anchor::router(state.clone()))
        .nest("/verify", verify::router(state.clone()))
        .nest("/ledger", ledger::router(state.clone()))
        .nest("/reports", reports::router(state.clone()))
        .nest("/diagnostics", diagnostics::router(state))
}

/// Request body limit for routes that accept an artifact.
pub(crate) fn upload_body_limit(state: &AppState) -> usize {
    state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD)
}

/// Fields of a multipart report submission.
#[derive(Debug, Default)]
pub(crate) struct ReportForm {
    pub file: Option<Bytes>,
    pub filename: Option<String>,
    pub owner_identity: Option<String>,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::BadRequest("File exceeds the upload size limit".to_string())
    } else {
        AppError::BadRequest(format!("Malformed multipart body: {}", e.body_text()))
    }
}

/// Reads `file` and `ownerIdentity` (or its alias `walletAddress`). Unknown fields are skipped.
pub(crate) async fn read_report_form(mut multipart: Multipart, max_file_bytes: usize) -> Result<ReportForm, AppError> {
    let mut form = ReportForm::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                form.filename = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if bytes.len() > max_file_bytes {
                    return Err(AppError::BadRequest(format!(
                        "File is {} bytes; the limit is {} bytes",
                        bytes.len(),
                        max_file_bytes
                    )));
                }
                form.file = Some(bytes);
            }
            Some("ownerIdentity") | Some("walletAddress") => {
                let value = field.text().await.map_err(multipart_error)?;
                if form.owner_identity.is_none() {
                    form.owner_identity = crate::pipeline::normalize_owner(Some(&value));
                }
            }
            _ => {}
        }
    }
    Ok(form)
}

/// Parses a digest from a path or body, as a `BadRequest` on failure.
pub(crate) fn parse_digest(raw: &str) -> Result<ReportDigest, AppError> {
    raw.trim()
        .parse::<ReportDigest>()
        .map_err(|e| AppError::BadRequest(format!("Invalid digest '{}': {}", raw, e)))
}
