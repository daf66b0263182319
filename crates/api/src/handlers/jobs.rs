//! Handlers for the `/jobs` resource and aggregate statistics.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use foresight_core::error::CoreError;
use foresight_core::types::JobId;
use foresight_db::models::JobListQuery;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
///
/// Current record of a job. 404 if the id is unknown.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state
        .store
        .get(job_id)
        .await?
        .ok_or_else(|| CoreError::job_not_found(job_id))?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs
///
/// Job history. Supports `status`, `search`, `sort_by`, `sort_desc`,
/// `limit` and `offset` query parameters.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let page = state.store.list(&params).await?;
    Ok(Json(DataResponse { data: page }))
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// DELETE /api/v1/jobs/{id}
///
/// Remove a job record. Idempotent: deleting an unknown id also returns 204.
/// A running job stops processing and its subscribers are closed.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    state.processor.delete_job(job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// GET /api/v1/statistics
pub async fn get_statistics(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let stats = state.store.statistics().await?;
    Ok(Json(DataResponse { data: stats }))
}
