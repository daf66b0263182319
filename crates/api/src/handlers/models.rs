use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::response::DataResponse;
use crate::state::AppState;

/// Model catalogue payload.
#[derive(Debug, Serialize)]
pub struct ModelCatalogue {
    /// Models queried when a request does not name any.
    pub models: Vec<String>,
}

/// GET /api/v1/models
pub async fn list_models(State(state): State<AppState>) -> Json<DataResponse<ModelCatalogue>> {
    Json(DataResponse {
        data: ModelCatalogue {
            models: state.config.models.clone(),
        },
    })
}
