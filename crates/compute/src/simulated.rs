//! In-process stand-in for the compute service.
//!
//! Each poll advances the computation by one step of a fixed sequence and
//! the last step completes with a synthetic ensemble result. Pacing comes
//! from the caller's poll interval.

use std::collections::HashMap;

use async_trait::async_trait;
use foresight_core::job::{ForecastRequest, ModelProgress, ModelProgressMap};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::service::{ComputeError, ComputeReport, ExternalHandle, ForecastCompute};
use crate::DEFAULT_MODELS;

/// Number of "querying models" steps between start-up and post-processing.
const QUERY_STEPS: usize = 3;

/// Progress checkpoints of the querying phase.
const QUERY_PROGRESS: [f64; QUERY_STEPS] = [0.30, 0.55, 0.80];

/// State of one simulated computation.
#[derive(Debug, Clone)]
struct Run {
    request: ForecastRequest,
    step: usize,
}

/// Simulated forecasting backend.
#[derive(Debug, Default)]
pub struct SimulatedCompute {
    runs: Mutex<HashMap<String, Run>>,
    failure: Option<(usize, String)>,
}

impl SimulatedCompute {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every run fail with `message` when it reaches `step`
    /// (0-based poll count).
    pub fn failing_at(mut self, step: usize, message: impl Into<String>) -> Self {
        self.failure = Some((step, message.into()));
        self
    }

    /// Total number of polls a successful run takes to complete.
    pub fn total_steps() -> usize {
        // initializing, starting, querying..., processing, saving, done
        2 + QUERY_STEPS + 3
    }

    fn report_for(step: usize, request: &ForecastRequest) -> ComputeReport {
        match step {
            0 => ComputeReport::running(0.05, "Initializing ensemble manager..."),
            1 => ComputeReport::running(0.10, "Starting forecast queries..."),
            s if s < 2 + QUERY_STEPS => {
                let done = s - 1;
                let mut report = ComputeReport::running(
                    QUERY_PROGRESS[done - 1],
                    format!("Querying models ({done}/{QUERY_STEPS})"),
                );
                report.model_progress = model_progress(request, done);
                report
            }
            s if s == 2 + QUERY_STEPS => ComputeReport::running(0.85, "Processing results..."),
            s if s == 3 + QUERY_STEPS => ComputeReport::running(0.95, "Saving results..."),
            _ => {
                let mut report = ComputeReport::completed(
                    synthetic_result(request),
                    "Forecast completed successfully",
                );
                report.model_progress = model_progress(request, QUERY_STEPS);
                report
            }
        }
    }
}

fn model_names(request: &ForecastRequest) -> Vec<String> {
    match &request.models {
        Some(models) if !models.is_empty() => models.clone(),
        _ => DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
    }
}

/// Per-model counts after `steps_done` of the querying steps. Until the
/// last step each model lags one query behind the one before it.
fn model_progress(request: &ForecastRequest, steps_done: usize) -> ModelProgressMap {
    let total = request.iterations;
    let on_schedule = (total as usize * steps_done / QUERY_STEPS) as u32;
    model_names(request)
        .into_iter()
        .enumerate()
        .map(|(i, model)| {
            let lag = if steps_done < QUERY_STEPS { i as u32 } else { 0 };
            let completed = on_schedule.saturating_sub(lag);
            (model, ModelProgress::new(completed, total))
        })
        .collect()
}

/// Deterministic result shaped like a real ensemble forecast.
fn synthetic_result(request: &ForecastRequest) -> Value {
    let models = model_names(request);

    let total_queries = models.len() as u64 * u64::from(request.iterations);
    let probabilities: Vec<f64> = (0..models.len())
        .map(|i| 0.35 + 0.05 * i as f64)
        .collect();
    let n = probabilities.len() as f64;
    let mean = probabilities.iter().sum::<f64>() / n;
    let variance = probabilities.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
    let min = probabilities.iter().copied().fold(f64::INFINITY, f64::min);
    let max = probabilities.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let median = {
        let mid = probabilities.len() / 2;
        if probabilities.len() % 2 == 0 {
            (probabilities[mid - 1] + probabilities[mid]) / 2.0
        } else {
            probabilities[mid]
        }
    };

    json!({
        "ensemble_probability": mean,
        "total_queries": total_queries,
        "successful_queries": total_queries,
        "models_used": models,
        "statistics": {
            "mean": mean,
            "median": median,
            "std": variance.sqrt(),
            "min": min,
            "max": max,
        },
        "simulated": true,
    })
}

#[async_trait]
impl ForecastCompute for SimulatedCompute {
    async fn submit(&self, request: &ForecastRequest) -> Result<ExternalHandle, ComputeError> {
        let handle = format!("sim-{}", uuid::Uuid::new_v4());
        self.runs.lock().await.insert(
            handle.clone(),
            Run {
                request: request.clone(),
                step: 0,
            },
        );
        tracing::debug!(handle = %handle, "Simulated forecast started");
        Ok(ExternalHandle(handle))
    }

    async fn poll(&self, handle: &ExternalHandle) -> Result<ComputeReport, ComputeError> {
        let mut runs = self.runs.lock().await;
        let run = runs
            .get_mut(&handle.0)
            .ok_or_else(|| ComputeError::UnknownHandle(handle.to_string()))?;
        let step = run.step;
        run.step += 1;

        let report = match &self.failure {
            Some((fail_step, message)) if step >= *fail_step => {
                ComputeReport::failed(message.clone())
            }
            _ => Self::report_for(step, &run.request),
        };

        if report.status.is_terminal() {
            runs.remove(&handle.0);
        }
        Ok(report)
    }

    async fn release(&self, handle: &ExternalHandle) {
        if self.runs.lock().await.remove(&handle.0).is_some() {
            tracing::debug!(handle = %handle, "Simulated forecast released");
        }
    }
}

impl SimulatedCompute {
    /// Number of computations started and not yet finished or released.
    pub async fn active_runs(&self) -> usize {
        self.runs.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use foresight_core::job::JobStatus;

    use super::*;
    use crate::service::ComputeStatus;

    async fn run_to_end(compute: &SimulatedCompute, request: &ForecastRequest) -> Vec<ComputeReport> {
        let handle = compute.submit(request).await.unwrap();
        let mut reports = Vec::new();
        loop {
            let report = compute.poll(&handle).await.unwrap();
            let done = report.status.is_terminal();
            reports.push(report);
            if done {
                return reports;
            }
        }
    }

    #[tokio::test]
    async fn runs_fixed_sequence_to_completion() {
        let compute = SimulatedCompute::new();
        let reports = run_to_end(&compute, &ForecastRequest::new("Q", "D")).await;

        assert_eq!(reports.len(), SimulatedCompute::total_steps());
        assert!(reports
            .windows(2)
            .all(|w| w[0].progress < w[1].progress));

        let last = reports.last().unwrap();
        assert_eq!(last.status, ComputeStatus::Completed);
        assert_eq!(last.progress, 1.0);
        let result = last.result.as_ref().unwrap();
        assert_eq!(result["simulated"], true);
        assert_eq!(result["models_used"].as_array().unwrap().len(), DEFAULT_MODELS.len());
    }

    #[tokio::test]
    async fn result_uses_requested_models() {
        let mut request = ForecastRequest::new("Q", "D");
        request.models = Some(vec!["a".into(), "b".into()]);
        request.iterations = 3;

        let reports = run_to_end(&SimulatedCompute::new(), &request).await;
        let result = reports.last().unwrap().result.clone().unwrap();
        assert_eq!(result["models_used"], json!(["a", "b"]));
        assert_eq!(result["total_queries"], 6);
    }

    #[tokio::test]
    async fn failing_at_stops_with_message() {
        let compute = SimulatedCompute::new().failing_at(2, "rate limited");
        let reports = run_to_end(&compute, &ForecastRequest::new("Q", "D")).await;

        assert_eq!(reports.len(), 3);
        let last = reports.last().unwrap();
        assert_eq!(last.status, ComputeStatus::Failed);
        assert_eq!(last.message, "rate limited");
        assert!(last.result.is_none());
    }

    #[tokio::test]
    async fn finished_handles_are_forgotten() {
        let compute = SimulatedCompute::new().failing_at(0, "boom");
        let handle = compute.submit(&ForecastRequest::new("Q", "D")).await.unwrap();
        compute.poll(&handle).await.unwrap();

        assert_matches!(
            compute.poll(&handle).await,
            Err(ComputeError::UnknownHandle(_))
        );
    }

    #[tokio::test]
    async fn released_runs_are_dropped() {
        let compute = SimulatedCompute::new();
        let handle = compute.submit(&ForecastRequest::new("Q", "D")).await.unwrap();
        compute.poll(&handle).await.unwrap();
        assert_eq!(compute.active_runs().await, 1);

        compute.release(&handle).await;
        assert_eq!(compute.active_runs().await, 0);
        assert_matches!(
            compute.poll(&handle).await,
            Err(ComputeError::UnknownHandle(_))
        );
    }

    #[tokio::test]
    async fn model_progress_advances_during_queries() {
        let mut request = ForecastRequest::new("Q", "D");
        request.models = Some(vec!["a".into(), "b".into()]);
        request.iterations = 6;

        let reports = run_to_end(&SimulatedCompute::new(), &request).await;
        assert!(reports[0].model_progress.is_empty());

        let first_query = &reports[2].model_progress;
        assert_eq!(first_query["a"].status, JobStatus::Running);
        assert!(first_query["a"].completed_queries >= first_query["b"].completed_queries);

        let last = &reports.last().unwrap().model_progress;
        assert!(last.values().all(|m| m.status == JobStatus::Completed));
        assert!(last.values().all(|m| m.completed_queries == 6));
    }
}
