//! Query and aggregate DTOs for history browsing.

use std::cmp::Ordering;

use foresight_core::job::{Job, JobStatus};
use serde::{Deserialize, Serialize};

/// Maximum page size for job listing.
pub const MAX_LIMIT: i64 = 200;

/// Default page size for job listing.
pub const DEFAULT_LIMIT: i64 = 50;

/// Column a listing is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Progress,
}

impl SortField {
    /// Column name used by the SQL backend.
    pub fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::Progress => "progress",
        }
    }

    /// Ascending comparison of two jobs on this field.
    pub fn compare(self, a: &Job, b: &Job) -> Ordering {
        match self {
            Self::CreatedAt => a.created_at.cmp(&b.created_at),
            Self::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            Self::Progress => a.progress.total_cmp(&b.progress),
        }
    }
}

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobListQuery {
    /// Only jobs in this status.
    pub status: Option<JobStatus>,
    /// Case-insensitive substring of the question or definition.
    pub search: Option<String>,
    pub sort_by: Option<SortField>,
    /// Defaults to `true` (newest first).
    pub sort_desc: Option<bool>,
    /// Maximum number of results. Defaults to 50, capped at 200.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

impl JobListQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    pub fn sort_by(&self) -> SortField {
        self.sort_by.unwrap_or_default()
    }

    pub fn sort_desc(&self) -> bool {
        self.sort_desc.unwrap_or(true)
    }

    /// Trimmed search term, `None` when absent or blank.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Whether `job` passes the status and search filters.
    pub fn matches(&self, job: &Job) -> bool {
        if let Some(status) = self.status {
            if job.status != status {
                return false;
            }
        }
        match self.search_term() {
            Some(term) => {
                let term = term.to_lowercase();
                job.request.question.to_lowercase().contains(&term)
                    || job.request.definition.to_lowercase().contains(&term)
            }
            None => true,
        }
    }
}

/// One page of a job listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    /// Matching jobs before pagination.
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Aggregate statistics across all stored jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStatistics {
    pub total_jobs: i64,
    pub pending_jobs: i64,
    pub running_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
    /// Completed jobs as a percentage of all jobs.
    pub success_rate: f64,
    /// Mean duration of completed jobs that recorded one.
    pub average_duration_seconds: f64,
}

impl JobStatistics {
    /// Compute statistics from an in-memory set of jobs.
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut stats = Self::default();
        let mut duration_sum = 0.0;
        let mut duration_count = 0u32;

        for job in jobs {
            stats.total_jobs += 1;
            match job.status {
                JobStatus::Pending => stats.pending_jobs += 1,
                JobStatus::Running => stats.running_jobs += 1,
                JobStatus::Completed => {
                    stats.completed_jobs += 1;
                    if let Some(d) = job.duration_seconds {
                        duration_sum += d;
                        duration_count += 1;
                    }
                }
                JobStatus::Failed => stats.failed_jobs += 1,
            }
        }

        stats.success_rate = success_rate(stats.completed_jobs, stats.total_jobs);
        if duration_count > 0 {
            stats.average_duration_seconds = duration_sum / f64::from(duration_count);
        }
        stats
    }
}

/// Percentage of `completed` over `total`, `0.0` when there are no jobs.
pub fn success_rate(completed: i64, total: i64) -> f64 {
    if total > 0 {
        completed as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}
