//! Forecast job record, request payload, and lifecycle rules.
//!
//! A job moves `pending -> running -> {completed | failed}`. All mutation
//! goes through [`Job::apply`], which enforces the state machine and the
//! record invariants:
//!
//! - no transition out of a terminal state, none back to `pending`;
//! - `progress` never decreases;
//! - `progress == 1.0` iff `status == completed` iff `result` is present.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Message stored on every freshly created job.
pub const INITIAL_MESSAGE: &str = "Job created";

/// Highest progress a non-completed job may report.
pub const MAX_RUNNING_PROGRESS: f64 = 0.99;

/// Default number of iterations per model when the request omits it.
pub const DEFAULT_ITERATIONS: u32 = 10;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// `completed` and `failed` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Forecast type and per-model progress
// ---------------------------------------------------------------------------

/// Which entry point created the job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastType {
    /// A caller-supplied question.
    #[default]
    Custom,
    /// The built-in Ukraine ceasefire question.
    Ukraine,
}

/// Query progress of one model within a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelProgress {
    pub completed_queries: u32,
    pub total_queries: u32,
    /// `pending` before the first answer, `completed` once all are in.
    pub status: JobStatus,
}

impl ModelProgress {
    pub fn new(completed_queries: u32, total_queries: u32) -> Self {
        let completed_queries = completed_queries.min(total_queries);
        let status = if completed_queries == 0 {
            JobStatus::Pending
        } else if completed_queries == total_queries {
            JobStatus::Completed
        } else {
            JobStatus::Running
        };
        Self {
            completed_queries,
            total_queries,
            status,
        }
    }
}

/// Model name -> progress, ordered by name.
pub type ModelProgressMap = BTreeMap<String, ModelProgress>;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

pub(crate) fn default_iterations() -> u32 {
    DEFAULT_ITERATIONS
}

/// Payload accepted by the create-job operation.
///
/// Field constraints beyond shape checks belong to the compute service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ForecastRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question: String,
    #[validate(length(min = 1, max = 5000))]
    pub definition: String,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    /// Model names to query; `None` means the service default set.
    #[serde(default)]
    #[validate(length(min = 1, max = 20))]
    pub models: Option<Vec<String>>,
    #[serde(default = "default_iterations")]
    #[validate(range(min = 1, max = 100))]
    pub iterations: u32,
    #[serde(default)]
    pub enhanced_prompts: bool,
}

impl ForecastRequest {
    /// Minimal request with only the required fields set.
    pub fn new(question: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            definition: definition.into(),
            timeframe: None,
            context: None,
            models: None,
            iterations: DEFAULT_ITERATIONS,
            enhanced_prompts: false,
        }
    }

    /// Check the request is well-formed.
    ///
    /// Runs the declarative length/range rules, then rejects blank text
    /// fields, which `length(min = 1)` lets through.
    pub fn validate_request(&self) -> Result<(), CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        if self.question.trim().is_empty() {
            return Err(CoreError::Validation("question must not be blank".into()));
        }
        if self.definition.trim().is_empty() {
            return Err(CoreError::Validation(
                "definition must not be blank".into(),
            ));
        }
        if let Some(models) = &self.models {
            if models.iter().any(|m| m.trim().is_empty()) {
                return Err(CoreError::Validation(
                    "model names must not be blank".into(),
                ));
            }
        }
        Ok(())
    }

    /// Number of model queries the request issues, given the size of the
    /// default model set used when it names none.
    pub fn total_queries(&self, default_model_count: usize) -> u64 {
        let models = match &self.models {
            Some(models) if !models.is_empty() => models.len(),
            _ => default_model_count,
        };
        models as u64 * u64::from(self.iterations)
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// The authoritative record of one forecast job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Fraction in `[0.0, 1.0]`.
    pub progress: f64,
    pub message: String,
    pub request: ForecastRequest,
    #[serde(default)]
    pub forecast_type: ForecastType,
    pub result: Option<serde_json::Value>,
    pub eta_seconds: Option<u64>,
    /// Human-readable query throughput while running.
    #[serde(default)]
    pub speed_str: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub model_progress: ModelProgressMap,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub duration_seconds: Option<f64>,
}

/// A partial update merged into a [`Job`] by [`Job::apply`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub result: Option<serde_json::Value>,
    pub eta_seconds: Option<u64>,
    pub speed_str: Option<String>,
    /// Replaces the per-model breakdown when set.
    pub model_progress: Option<ModelProgressMap>,
}

impl JobUpdate {
    /// Intermediate progress report for a running job.
    pub fn running(progress: f64, message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Running),
            progress: Some(progress),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Successful completion carrying the result payload.
    pub fn completed(result: serde_json::Value, message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(1.0),
            message: Some(message.into()),
            result: Some(result),
            ..Default::default()
        }
    }

    /// Terminal failure with a description of what went wrong.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_eta(mut self, eta_seconds: Option<u64>, speed_str: Option<String>) -> Self {
        self.eta_seconds = eta_seconds;
        self.speed_str = speed_str;
        self
    }

    /// Attach a per-model breakdown; an empty map leaves the stored one.
    pub fn with_model_progress(mut self, model_progress: ModelProgressMap) -> Self {
        if !model_progress.is_empty() {
            self.model_progress = Some(model_progress);
        }
        self
    }
}

impl Job {
    /// Build the initial `pending` record for a request.
    pub fn new(id: JobId, request: ForecastRequest, now: Timestamp) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            progress: 0.0,
            message: INITIAL_MESSAGE.to_string(),
            request,
            forecast_type: ForecastType::Custom,
            result: None,
            eta_seconds: None,
            speed_str: None,
            model_progress: ModelProgressMap::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            duration_seconds: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Merge `update` into this record at time `now`.
    ///
    /// Returns [`CoreError::Conflict`] (leaving the record untouched) for a
    /// transition the state machine forbids or a completion without result.
    /// Progress is clamped rather than rejected: a lower value keeps the
    /// current one and a non-completed job stays below `1.0`.
    pub fn apply(&mut self, update: JobUpdate, now: Timestamp) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "job {} is already {}",
                self.id, self.status
            )));
        }

        let next = update.status.unwrap_or(self.status);
        if next == JobStatus::Pending && self.status != JobStatus::Pending {
            return Err(CoreError::Conflict(format!(
                "job {} cannot return to pending",
                self.id
            )));
        }

        let requested = update
            .progress
            .map(|p| p.clamp(0.0, 1.0))
            .unwrap_or(self.progress);
        let progress = requested.max(self.progress);

        let (progress, result, eta_seconds, speed_str) = match next {
            JobStatus::Completed => {
                let result = update.result.ok_or_else(|| {
                    CoreError::Conflict(format!("job {} completed without a result", self.id))
                })?;
                (1.0, Some(result), None, None)
            }
            JobStatus::Failed => (self.progress, None, None, None),
            JobStatus::Running => (
                progress.min(MAX_RUNNING_PROGRESS),
                None,
                update.eta_seconds.or(self.eta_seconds),
                update.speed_str.or_else(|| self.speed_str.clone()),
            ),
            JobStatus::Pending => (self.progress, None, None, None),
        };

        self.status = next;
        self.progress = progress;
        self.result = result;
        self.eta_seconds = eta_seconds;
        self.speed_str = speed_str;
        if let Some(model_progress) = update.model_progress {
            self.model_progress = model_progress;
        }
        if let Some(message) = update.message {
            self.message = message;
        }

        // Strictly increasing, so readers can order records by it.
        let tick = self.updated_at + chrono::Duration::microseconds(1);
        self.updated_at = now.max(tick);

        if next != JobStatus::Pending && self.started_at.is_none() {
            self.started_at = Some(self.updated_at);
        }
        if next.is_terminal() {
            self.completed_at = Some(self.updated_at);
            self.duration_seconds = self
                .started_at
                .map(|start| (self.updated_at - start).num_milliseconds() as f64 / 1000.0);
        }

        Ok(())
    }

    /// Whether the completion/progress/result invariants hold.
    pub fn satisfies_invariants(&self) -> bool {
        let completed = self.status == JobStatus::Completed;
        (0.0..=1.0).contains(&self.progress)
            && completed == (self.progress == 1.0)
            && completed == self.result.is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
