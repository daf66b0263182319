//! Job processor: owns the `pending -> running -> completed | failed`
//! lifecycle of every forecast job.
//!
//! Each job is driven on its own Tokio task. The task submits the request
//! to the compute backend, polls it, and funnels every report through
//! [`JobProcessor::update_job`], which serializes writes per job so that
//! store state and WebSocket frames follow issue order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use foresight_compute::{
    ComputeError, ComputeStatus, ExternalHandle, ForecastCompute, DEFAULT_MODELS,
};
use foresight_core::error::CoreError;
use foresight_core::eta::{format_duration, EtaCalculator};
use foresight_core::job::{ForecastRequest, ForecastType, Job, JobStatus, JobUpdate};
use foresight_core::preset::UkraineForecastRequest;
use foresight_core::types::{JobId, Timestamp};
use foresight_db::JobStore;
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};
use crate::ws::WsManager;

/// Default delay between compute status polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default poll budget (10 minutes at the default interval).
const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 120;

/// Default bound on a single submit or poll call.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Message of the first `running` update, before the first report.
const SUBMITTED_MESSAGE: &str = "Forecast submitted";

/// Polling cadence and limits for compute delegation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorConfig {
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    /// A submit or poll that takes longer counts as an unavailable service.
    pub call_timeout: Duration,
    /// Models queried for requests that name none; sizes the speed estimate.
    pub default_model_count: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            default_model_count: DEFAULT_MODELS.len(),
        }
    }
}

/// Why processing of a job stopped short of completion.
///
/// Never returned to clients: it becomes the job's `failed` message.
#[derive(Debug, thiserror::Error)]
enum ProcessingFailure {
    #[error("Error: {0}")]
    Compute(#[from] ComputeError),

    /// The compute service reported failure with this message.
    #[error("{0}")]
    Remote(String),

    /// The compute service reported failure without saying why.
    #[error("Error: compute service reported failure")]
    RemoteUnspecified,

    #[error("Error: forecast timed out after {0} status checks")]
    TimedOut(u32),

    #[error("Error: compute service completed without a result")]
    MissingResult,

    #[error("Error: {0}")]
    Store(#[from] AppError),

    /// The job record was removed while it was being processed.
    #[error("job deleted while running")]
    Deleted,
}

impl ProcessingFailure {
    fn remote(message: String) -> Self {
        if message.trim().is_empty() {
            Self::RemoteUnspecified
        } else {
            Self::Remote(message)
        }
    }
}

/// Creates forecast jobs and drives them to a terminal state.
pub struct JobProcessor {
    store: Arc<dyn JobStore>,
    compute: Arc<dyn ForecastCompute>,
    ws_manager: Arc<WsManager>,
    config: ProcessorConfig,
    /// Per-job write locks, held across merge, persist and broadcast.
    locks: Mutex<HashMap<JobId, Arc<Mutex<()>>>>,
    /// Per-job ETA estimators, dropped when the job finishes.
    etas: Mutex<HashMap<JobId, EtaCalculator>>,
}

impl JobProcessor {
    pub fn new(
        store: Arc<dyn JobStore>,
        compute: Arc<dyn ForecastCompute>,
        ws_manager: Arc<WsManager>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            store,
            compute,
            ws_manager,
            config,
            locks: Mutex::new(HashMap::new()),
            etas: Mutex::new(HashMap::new()),
        }
    }

    /// Validate and persist a new `pending` job, then start processing it
    /// in the background. Returns the initial record immediately.
    pub async fn create_job(self: &Arc<Self>, request: ForecastRequest) -> AppResult<Job> {
        self.start_job(request, ForecastType::Custom).await
    }

    /// Start the preset Ukraine ceasefire forecast.
    pub async fn create_ukraine_job(
        self: &Arc<Self>,
        preset: UkraineForecastRequest,
    ) -> AppResult<Job> {
        self.start_job(preset.into_forecast_request(), ForecastType::Ukraine)
            .await
    }

    async fn start_job(
        self: &Arc<Self>,
        request: ForecastRequest,
        forecast_type: ForecastType,
    ) -> AppResult<Job> {
        request.validate_request()?;

        let mut job = Job::new(uuid::Uuid::new_v4(), request.clone(), Utc::now());
        job.forecast_type = forecast_type;
        self.store.put(&job).await?;
        tracing::info!(
            job_id = %job.id,
            forecast_type = ?forecast_type,
            iterations = request.iterations,
            "Forecast job created",
        );

        let processor = Arc::clone(self);
        tokio::spawn(processor.process_job(job.id, request));

        Ok(job)
    }

    /// Merge `update` into the stored record, persist it and notify
    /// subscribers.
    ///
    /// Returns `false` when the job no longer exists. Transitions the state
    /// machine rejects are logged and ignored. Store failures propagate.
    pub async fn update_job(&self, id: JobId, update: JobUpdate) -> AppResult<bool> {
        let lock = self.job_lock(id).await;
        let _guard = lock.lock().await;

        let Some(mut job) = self.store.get(id).await? else {
            tracing::debug!(job_id = %id, "Update for unknown job ignored");
            self.forget(id).await;
            return Ok(false);
        };

        let now = Utc::now();
        let update = if job.is_terminal() {
            update
        } else {
            self.attach_eta(id, update, &job.request, now).await
        };
        match job.apply(update, now) {
            Ok(()) => {}
            Err(CoreError::Conflict(reason)) => {
                tracing::warn!(job_id = %id, reason = %reason, "Rejected job transition");
                if job.is_terminal() {
                    self.forget(id).await;
                }
                return Ok(true);
            }
            Err(e) => return Err(e.into()),
        }

        self.store.put(&job).await?;
        self.ws_manager.broadcast(id, &job).await;

        if job.is_terminal() {
            self.forget(id).await;
        }
        Ok(true)
    }

    /// Remove a job record and close its subscriptions. A job still being
    /// processed stops at its next update. Returns whether the job existed.
    pub async fn delete_job(&self, id: JobId) -> AppResult<bool> {
        let lock = self.job_lock(id).await;
        let existed = {
            let _guard = lock.lock().await;
            self.store.delete(id).await?
        };

        self.ws_manager.close_job(id).await;
        self.forget(id).await;
        tracing::info!(job_id = %id, existed, "Job deleted");
        Ok(existed)
    }

    /// Background task body for one job.
    async fn process_job(self: Arc<Self>, id: JobId, request: ForecastRequest) {
        let started = Utc::now();
        match self.drive(id, &request).await {
            Ok(()) => {
                let elapsed = (Utc::now() - started).num_seconds().max(0) as u64;
                tracing::info!(
                    job_id = %id,
                    elapsed = %format_duration(elapsed),
                    "Forecast job completed",
                );
            }
            Err(ProcessingFailure::Deleted) => {
                tracing::info!(job_id = %id, "Forecast job abandoned after deletion");
            }
            Err(failure) => {
                tracing::warn!(job_id = %id, error = %failure, "Forecast job failed");
                if let Err(e) = self.update_job(id, JobUpdate::failed(failure.to_string())).await {
                    tracing::error!(job_id = %id, error = %e, "Failed to record job failure");
                }
            }
        }
    }

    /// Submit to the compute backend and follow the run to its end.
    async fn drive(&self, id: JobId, request: &ForecastRequest) -> Result<(), ProcessingFailure> {
        let handle = self.bounded(self.compute.submit(request)).await?;
        tracing::debug!(job_id = %id, handle = %handle, "Compute run started");

        let outcome = self.follow(id, &handle).await;
        if outcome.is_err() {
            self.release(&handle).await;
        }
        outcome
    }

    /// Poll `handle` until a terminal report, mirroring each into the job.
    async fn follow(&self, id: JobId, handle: &ExternalHandle) -> Result<(), ProcessingFailure> {
        self.record(id, JobUpdate::running(0.0, SUBMITTED_MESSAGE))
            .await?;

        for _ in 0..self.config.max_poll_attempts {
            tokio::time::sleep(self.config.poll_interval).await;

            let report = self.bounded(self.compute.poll(handle)).await?;
            match report.status {
                ComputeStatus::Queued | ComputeStatus::Running => {
                    let update = JobUpdate::running(report.progress, report.message)
                        .with_model_progress(report.model_progress);
                    self.record(id, update).await?;
                }
                ComputeStatus::Completed => {
                    let result = report.result.ok_or(ProcessingFailure::MissingResult)?;
                    let update = JobUpdate::completed(result, report.message)
                        .with_model_progress(report.model_progress);
                    self.record(id, update).await?;
                    return Ok(());
                }
                ComputeStatus::Failed => return Err(ProcessingFailure::remote(report.message)),
            }
        }

        Err(ProcessingFailure::TimedOut(self.config.max_poll_attempts))
    }

    /// [`update_job`](Self::update_job) for the processing task: a missing
    /// record ends processing.
    async fn record(&self, id: JobId, update: JobUpdate) -> Result<(), ProcessingFailure> {
        if self.update_job(id, update).await? {
            Ok(())
        } else {
            Err(ProcessingFailure::Deleted)
        }
    }

    /// Run one compute call under the configured time limit.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ComputeError>>,
    ) -> Result<T, ComputeError> {
        let limit = self.config.call_timeout;
        tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
            Err(ComputeError::ServiceUnavailable(format!(
                "no response within {}s",
                limit.as_secs_f64()
            )))
        })
    }

    /// Tell the backend a run is no longer followed.
    async fn release(&self, handle: &ExternalHandle) {
        let limit = self.config.call_timeout;
        if tokio::time::timeout(limit, self.compute.release(handle))
            .await
            .is_err()
        {
            tracing::warn!(handle = %handle, "Compute release timed out");
        }
    }

    /// Feed running progress to the job's estimator and attach its ETA and
    /// query speed.
    async fn attach_eta(
        &self,
        id: JobId,
        update: JobUpdate,
        request: &ForecastRequest,
        now: Timestamp,
    ) -> JobUpdate {
        match (update.status, update.progress) {
            (Some(JobStatus::Running), Some(progress)) => {
                let mut etas = self.etas.lock().await;
                let calc = etas.entry(id).or_default();
                calc.record(progress, now);
                let speed = calc.speed_str(request.total_queries(self.config.default_model_count));
                update.with_eta(calc.eta_seconds(), speed)
            }
            _ => update,
        }
    }

    async fn job_lock(&self, id: JobId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(id).or_default())
    }

    async fn forget(&self, id: JobId) {
        self.locks.lock().await.remove(&id);
        self.etas.lock().await.remove(&id);
    }
}
