use std::sync::Arc;

use foresight_db::JobStore;

use crate::config::ServerConfig;
use crate::engine::JobProcessor;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Single source of truth for job records.
    pub store: Arc<dyn JobStore>,
    /// Creates jobs and drives them to a terminal state.
    pub processor: Arc<JobProcessor>,
    /// Per-job WebSocket subscriber registry.
    pub ws_manager: Arc<WsManager>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Wire a processor to `store`, `compute` and a fresh subscriber registry.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn JobStore>,
        compute: Arc<dyn foresight_compute::ForecastCompute>,
    ) -> Self {
        let ws_manager = Arc::new(WsManager::new());
        let processor = Arc::new(JobProcessor::new(
            Arc::clone(&store),
            compute,
            Arc::clone(&ws_manager),
            config.processor_config(),
        ));
        Self {
            store,
            processor,
            ws_manager,
            config: Arc::new(config),
        }
    }
}
