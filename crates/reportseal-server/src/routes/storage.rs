//! Upload and download endpoints.

use axum::{
    body::Body,
    extract::{
        multipart::MultipartRejection,
        rejection::QueryRejection,
        DefaultBodyLimit, Multipart, Query, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::{read_report_form, upload_body_limit};
use crate::error::AppError;
use crate::pipeline::{self, PublishOutcome};
use crate::state::AppState;
use crate::storage::{parse_cid, DEFAULT_CONTENT_TYPE};

/// Used when the multipart file part carries no name.
const DEFAULT_FILENAME: &str = "report.pdf";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadQuery {
    pub cid: Option<String>,
    /// `true` returns `{url}` instead of the bytes. Any other value means false.
    pub as_url: Option<String>,
}

impl DownloadQuery {
    fn wants_url(&self) -> bool {
        self.as_url.as_deref().map(str::trim) == Some("true")
    }
}

#[derive(serde::Serialize)]
pub struct DownloadUrlResponse {
    pub url: String,
}

/// Creates the storage router.
pub fn router(state: AppState) -> Router {
    let limit = upload_body_limit(&state);
    Router::new()
        .route("/upload", post(upload).layer(DefaultBodyLimit::max(limit)))
        .route("/download", get(download))
        .with_state(state)
}

/// POST /api/v1/storage/upload
///
/// Multipart `file` plus `ownerIdentity` (or `walletAddress`). Pins the file,
/// anchors its digest and records it in the registry.
async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PublishOutcome>, AppError> {
    let form = read_report_form(multipart?, state.max_upload_bytes).await?;

    let bytes = form
        .file
        .ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;
    if bytes.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
    }
    let owner = form.owner_identity.ok_or_else(|| {
        AppError::BadRequest(
            "Owner identity is required. Please connect your wallet before uploading.".to_string(),
        )
    })?;
    let filename = form.filename.unwrap_or_else(|| DEFAULT_FILENAME.to_string());

    let outcome = pipeline::publish(&state, &owner, &filename, bytes).await?;
    Ok(Json(outcome))
}

/// GET /api/v1/storage/download?cid=...&asUrl=...
///
/// Streams the artifact from the gateway as an attachment, or returns its
/// retrieval URL when `asUrl=true`.
async fn download(
    State(state): State<AppState>,
    query: Result<Query<DownloadQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query?;
    let raw_cid = query
        .cid
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("cid is required".to_string()))?;
    let storage = state.storage()?;

    if query.wants_url() {
        let cid = parse_cid(raw_cid)?;
        let url = storage.retrieval_url(&cid);
        return Ok(Json(DownloadUrlResponse { url }).into_response());
    }

    let download = storage.download(raw_cid).await?;
    let content_type = HeaderValue::from_str(&download.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    let disposition = format!("attachment; filename=\"{}\"", download.filename());

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, disposition);
    if let Some(length) = download.content_length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }

    tracing::info!(cid = %download.cid, "Streaming artifact");
    builder
        .body(Body::from_stream(download.body))
        .map_err(|e| AppError::Internal(format!("Failed to build download response: {}", e)))
}
