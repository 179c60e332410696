//! Registry endpoints: listing, live snapshots and digest lookup.

use std::convert::Infallible;

use axum::{
    extract::{rejection::PathRejection, Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::Serialize;

use super::parse_digest;
use crate::error::AppError;
use crate::models::ReportEntry;
use crate::registry;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ReportsResponse {
    pub success: bool,
    pub reports: Vec<ReportEntry>,
}

/// Creates the reports router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/by-digest/{digest}", get(by_digest))
        .route("/{owner}", get(list_reports))
        .route("/{owner}/events", get(report_events))
        .with_state(state)
}

fn owner_from_path(raw: &str) -> Result<String, AppError> {
    crate::pipeline::normalize_owner(Some(raw))
        .ok_or_else(|| AppError::BadRequest("Owner identity is required".to_string()))
}

/// GET /api/v1/reports/{owner}
///
/// Newest first.
async fn list_reports(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<ReportsResponse>, AppError> {
    let Path(owner) = path?;
    let owner = owner_from_path(&owner)?;
    let reports = state.registry().list_by_owner(&owner).await?;
    Ok(Json(ReportsResponse { success: true, reports }))
}

/// GET /api/v1/reports/{owner}/events
///
/// Server-sent events. Each `snapshot` event carries the owner's full list.
async fn report_events(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let Path(owner) = path?;
    let owner = owner_from_path(&owner)?;
    tracing::debug!(owner = %owner, "Registry subscription opened");

    let stream = registry::subscribe(state.registry().clone(), owner).map(|snapshot| {
        let event = match snapshot {
            Ok(reports) => Event::default()
                .event("snapshot")
                .json_data(ReportsResponse { success: true, reports }),
            Err(e) => Event::default()
                .event("error")
                .json_data(AppError::from(e).to_body()),
        };
        Ok(event.unwrap_or_else(|e| Event::default().event("error").data(e.to_string())))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// GET /api/v1/reports/by-digest/{digest}
///
/// The earliest registry entry for a digest.
async fn by_digest(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<ReportEntry>, AppError> {
    let Path(raw) = path?;
    let digest = parse_digest(&raw)?;
    state
        .registry()
        .find_by_digest(&digest)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No registry entry for {}", digest)))
}
