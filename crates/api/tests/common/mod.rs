#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use foresight_compute::{ForecastCompute, SimulatedCompute};
use foresight_db::MemoryJobStore;
use http_body_util::BodyExt;
use tower::ServiceExt;

use foresight_api::config::ServerConfig;
use foresight_api::router::build_app_router;
use foresight_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
///
/// No database and no compute service; the simulated backend advances one
/// step every 10 ms so jobs finish well under a second.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        database_url: None,
        compute_service_url: None,
        compute_poll_interval_secs: 5,
        compute_max_poll_attempts: 120,
        compute_timeout_secs: 30,
        simulated_step_millis: 10,
        models: vec!["model-a".to_string(), "model-b".to_string()],
    }
}

/// Application state over an in-memory store and the given compute backend.
pub fn test_state(compute: Arc<dyn ForecastCompute>) -> AppState {
    AppState::new(test_config(), Arc::new(MemoryJobStore::new()), compute)
}

/// Build the full application router with all middleware layers.
///
/// Returns the state as well so tests can inspect the store and the
/// subscriber registry behind the router.
pub fn build_test_app() -> (Router, AppState) {
    let state = test_state(Arc::new(SimulatedCompute::new()));
    (build_app_router(state.clone(), &test_config()), state)
}

pub async fn get(app: Router, uri: &str) -> Response {
    send(app, Method::GET, uri, Body::empty()).await
}

pub async fn delete(app: Router, uri: &str) -> Response {
    send(app, Method::DELETE, uri, Body::empty()).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send(app, Method::POST, uri, Body::from(body.to_string())).await
}

async fn send(app: Router, method: Method, uri: &str, body: Body) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Read the full response body as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Serve the app on an ephemeral port and return its base URL.
pub async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}
