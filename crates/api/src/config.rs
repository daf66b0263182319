use std::str::FromStr;
use std::time::Duration;

use foresight_compute::DEFAULT_MODELS;

use crate::engine::ProcessorConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development: no
/// database (in-memory store) and no compute service (simulated backend).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Upper bound on post-shutdown cleanup in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// PostgreSQL URL. `None` selects the in-memory job store.
    pub database_url: Option<String>,
    /// Base URL of the compute service. `None` selects the simulated backend.
    pub compute_service_url: Option<String>,
    /// Seconds between compute status polls (default: `5`).
    pub compute_poll_interval_secs: u64,
    /// Poll budget per job before it is failed as timed out (default: `120`).
    pub compute_max_poll_attempts: u32,
    /// Bound on a single call to the compute service in seconds (default: `30`).
    pub compute_timeout_secs: u64,
    /// Step length of the simulated backend in milliseconds (default: `500`).
    pub simulated_step_millis: u64,
    /// Model catalogue served by `GET /api/v1/models`.
    pub models: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                    |
    /// |------------------------------|----------------------------|
    /// | `HOST`                       | `0.0.0.0`                  |
    /// | `PORT`                       | `3000`                     |
    /// | `CORS_ORIGINS`               | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`       | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`      | `30`                       |
    /// | `DATABASE_URL`               | unset (in-memory store)    |
    /// | `COMPUTE_SERVICE_URL`        | unset (simulated compute)  |
    /// | `COMPUTE_POLL_INTERVAL_SECS` | `5`                        |
    /// | `COMPUTE_MAX_POLL_ATTEMPTS`  | `120`                      |
    /// | `COMPUTE_TIMEOUT_SECS`       | `30`                       |
    /// | `SIMULATED_STEP_MILLIS`      | `500`                      |
    /// | `FORECAST_MODELS`            | built-in free model list   |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let cors_origins = split_list(
            &std::env::var("CORS_ORIGINS").unwrap_or_else(|_| "http://localhost:5173".into()),
        );

        let models = match std::env::var("FORECAST_MODELS") {
            Ok(list) if !split_list(&list).is_empty() => split_list(&list),
            _ => DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
        };

        Self {
            host,
            port: parse_var("PORT", 3000),
            cors_origins,
            request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: parse_var("SHUTDOWN_TIMEOUT_SECS", 30),
            database_url: non_empty_var("DATABASE_URL"),
            compute_service_url: non_empty_var("COMPUTE_SERVICE_URL"),
            compute_poll_interval_secs: parse_var("COMPUTE_POLL_INTERVAL_SECS", 5),
            compute_max_poll_attempts: parse_var("COMPUTE_MAX_POLL_ATTEMPTS", 120),
            compute_timeout_secs: parse_var("COMPUTE_TIMEOUT_SECS", 30),
            simulated_step_millis: parse_var("SIMULATED_STEP_MILLIS", 500),
            models,
        }
    }

    /// Poll cadence and limits for the job processor.
    ///
    /// A remote service is polled every `compute_poll_interval_secs`; the
    /// simulated backend advances one step per poll, so it is polled every
    /// `simulated_step_millis`.
    pub fn processor_config(&self) -> ProcessorConfig {
        let poll_interval = if self.compute_service_url.is_some() {
            Duration::from_secs(self.compute_poll_interval_secs)
        } else {
            Duration::from_millis(self.simulated_step_millis)
        };
        ProcessorConfig {
            poll_interval,
            max_poll_attempts: self.compute_max_poll_attempts,
            call_timeout: self.compute_timeout(),
            default_model_count: self.models.len(),
        }
    }

    /// Bound on one submit or poll, also used as the HTTP client timeout.
    pub fn compute_timeout(&self) -> Duration {
        Duration::from_secs(self.compute_timeout_secs)
    }
}

/// Parse an env var, falling back to `default` when unset.
///
/// Panics on an unparsable value so misconfiguration fails fast at startup.
fn parse_var<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a valid value: {e}")),
        Err(_) => default,
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
