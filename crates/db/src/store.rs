//! The storage contract consumed by the job processor and the HTTP layer.

use async_trait::async_trait;
use foresight_core::job::Job;
use foresight_core::types::JobId;

use crate::models::{JobListQuery, JobPage, JobStatistics};

/// Errors raised by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database query failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the backend could not be reached at all, as opposed to a
    /// query or record being wrong.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StoreError::Database(
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            )
        )
    }
}

/// Durable key-value store of job records with atomic per-key writes.
///
/// Readers never mutate; the job processor is the only writer of a given
/// job.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Fetch a job, `None` if it does not exist.
    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Insert or overwrite the record keyed by `job.id`.
    async fn put(&self, job: &Job) -> Result<(), StoreError>;

    /// Remove a job. Returns whether a record existed; a missing id is not
    /// an error.
    async fn delete(&self, id: JobId) -> Result<bool, StoreError>;

    /// Filtered, sorted, paginated listing for history browsing.
    async fn list(&self, query: &JobListQuery) -> Result<JobPage, StoreError>;

    /// Aggregate counts across all jobs.
    async fn statistics(&self) -> Result<JobStatistics, StoreError>;

    /// Cheap liveness probe of the backend.
    async fn health_check(&self) -> Result<(), StoreError>;
}
