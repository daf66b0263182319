pub mod forecasts;
pub mod health;
pub mod jobs;

use axum::routing::get;
use axum::Router;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /forecasts                   create forecast job (POST)
/// /forecasts/ukraine           start the Ukraine ceasefire preset (POST)
///
/// /jobs                        list with filters (GET)
/// /jobs/{id}                   get, delete
///
/// /statistics                  aggregate job statistics (GET)
/// /models                      model catalogue (GET)
///
/// /ws/jobs/{id}                WebSocket job subscription
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/forecasts", forecasts::router())
        .nest("/jobs", jobs::router())
        .route("/statistics", get(handlers::jobs::get_statistics))
        .route("/models", get(handlers::models::list_models))
        .route("/ws/jobs/{id}", get(ws::ws_handler))
}
