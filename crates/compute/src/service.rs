//! The narrow contract between the job processor and a compute backend.

use std::fmt;

use async_trait::async_trait;
use foresight_core::job::{ForecastRequest, ModelProgressMap};
use serde::{Deserialize, Serialize};

/// Opaque identifier of a computation on the compute service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalHandle(pub String);

impl fmt::Display for ExternalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a computation as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl ComputeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One poll result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeReport {
    pub status: ComputeStatus,
    /// Fraction in `[0.0, 1.0]`.
    pub progress: f64,
    pub message: String,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Per-model query counts, when the service reports them.
    #[serde(default)]
    pub model_progress: ModelProgressMap,
}

impl ComputeReport {
    pub fn running(progress: f64, message: impl Into<String>) -> Self {
        Self {
            status: ComputeStatus::Running,
            progress,
            message: message.into(),
            result: None,
            model_progress: ModelProgressMap::new(),
        }
    }

    pub fn completed(result: serde_json::Value, message: impl Into<String>) -> Self {
        Self {
            status: ComputeStatus::Completed,
            progress: 1.0,
            message: message.into(),
            result: Some(result),
            model_progress: ModelProgressMap::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ComputeStatus::Failed,
            progress: 0.0,
            message: message.into(),
            result: None,
            model_progress: ModelProgressMap::new(),
        }
    }
}

/// Errors from a compute backend.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    /// The service could not be reached or refused work.
    #[error("Compute service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The service answered with a non-2xx status code.
    #[error("Compute service error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The HTTP request failed after a connection was made.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The handle is not known to the service.
    #[error("Unknown computation handle: {0}")]
    UnknownHandle(String),
}

/// A pluggable forecasting backend.
#[async_trait]
pub trait ForecastCompute: Send + Sync {
    /// Start a computation. Fails with
    /// [`ComputeError::ServiceUnavailable`] when the service is unreachable.
    async fn submit(&self, request: &ForecastRequest) -> Result<ExternalHandle, ComputeError>;

    /// Report the current state of a computation.
    async fn poll(&self, handle: &ExternalHandle) -> Result<ComputeReport, ComputeError>;

    /// Drop a computation the caller stopped following before it reached a
    /// terminal report. Backends without per-run state need not override.
    async fn release(&self, _handle: &ExternalHandle) {}
}
