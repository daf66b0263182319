use axum::routing::post;
use axum::Router;

use crate::handlers::forecasts;
use crate::state::AppState;

/// Routes mounted at `/forecasts`.
///
/// ```text
/// POST   /                -> create_forecast
/// POST   /ukraine         -> create_ukraine_forecast
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(forecasts::create_forecast))
        .route("/ukraine", post(forecasts::create_ukraine_forecast))
}
