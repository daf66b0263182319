use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use foresight_compute::{ForecastCompute, HttpComputeService, SimulatedCompute};
use foresight_db::{JobStore, MemoryJobStore, PgJobStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use foresight_api::config::ServerConfig;
use foresight_api::router::build_app_router;
use foresight_api::state::AppState;
use foresight_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "foresight_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Job store ---
    let store = build_store(&config).await;

    // --- Compute backend ---
    let compute: Arc<dyn ForecastCompute> = match &config.compute_service_url {
        Some(url) => {
            tracing::info!(
                url = %url,
                timeout_secs = config.compute_timeout_secs,
                "Using remote compute service",
            );
            Arc::new(
                HttpComputeService::new(url.clone(), config.compute_timeout())
                    .expect("Failed to build compute service client"),
            )
        }
        None => {
            tracing::info!(
                step_ms = config.simulated_step_millis,
                "COMPUTE_SERVICE_URL not set, using simulated compute",
            );
            Arc::new(SimulatedCompute::new())
        }
    };

    // --- App state ---
    let state = AppState::new(config.clone(), store, compute);
    let ws_manager = Arc::clone(&state.ws_manager);

    // --- Heartbeat ---
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    let cleanup = async {
        let ws_count = ws_manager.connection_count().await;
        tracing::info!(ws_count, "Closing remaining WebSocket connections");
        ws_manager.shutdown_all().await;
    };
    if tokio::time::timeout(Duration::from_secs(config.shutdown_timeout_secs), cleanup)
        .await
        .is_err()
    {
        tracing::warn!("Shutdown cleanup timed out");
    }

    heartbeat_handle.abort();
    tracing::info!("Heartbeat task stopped");

    tracing::info!("Graceful shutdown complete");
}

/// PostgreSQL when `DATABASE_URL` is set, process memory otherwise.
///
/// Panics on an unreachable database or failed migration so the server
/// never starts against a broken store.
async fn build_store(config: &ServerConfig) -> Arc<dyn JobStore> {
    let Some(database_url) = &config.database_url else {
        tracing::info!("DATABASE_URL not set, using in-memory job store");
        return Arc::new(MemoryJobStore::new());
    };

    let pool = foresight_db::create_pool(database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    foresight_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let store = PgJobStore::new(pool);
    store
        .health_check()
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    Arc::new(store)
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
