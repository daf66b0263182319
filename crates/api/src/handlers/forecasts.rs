//! Handlers for forecast submission.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use foresight_core::job::ForecastRequest;
use foresight_core::preset::UkraineForecastRequest;

use crate::error::AppResult;
use crate::middleware::json::JsonBody;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/forecasts
///
/// Create a forecast job. Returns 201 with the initial `pending` record;
/// processing continues in the background. Invalid requests are rejected
/// with 400 and nothing is stored.
pub async fn create_forecast(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<ForecastRequest>,
) -> AppResult<impl IntoResponse> {
    let job = state.processor.create_job(input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

/// POST /api/v1/forecasts/ukraine
///
/// Start the Ukraine ceasefire forecast. Every field of the body is
/// optional, so `{}` runs the preset with default iterations.
pub async fn create_ukraine_forecast(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<UkraineForecastRequest>,
) -> AppResult<impl IntoResponse> {
    let job = state.processor.create_ukraine_job(input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}
