//! PostgreSQL-backed [`JobStore`] (table `forecast_jobs`).
//!
//! The full record is stored as JSONB; status, progress, text and timing
//! columns are denormalised copies used for filtering, ordering and
//! aggregate statistics. Every write is a single upsert, so per-key writes
//! are atomic.

use async_trait::async_trait;
use foresight_core::job::{Job, JobStatus};
use foresight_core::types::JobId;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::{success_rate, JobListQuery, JobPage, JobStatistics};
use crate::store::{JobStore, StoreError};

/// Shared filter clause for listing and counting.
///
/// `$1` is the optional status, `$2` the optional ILIKE pattern.
const FILTER: &str = "\
    ($1::TEXT IS NULL OR status = $1) \
    AND ($2::TEXT IS NULL OR question ILIKE $2 OR definition ILIKE $2)";

/// Job store persisting records in PostgreSQL.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Build an ILIKE pattern matching `term` anywhere, escaping wildcards.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query_scalar::<_, Json<Job>>(
            "SELECT record FROM forecast_jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|Json(job)| job))
    }

    async fn put(&self, job: &Job) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO forecast_jobs \
                 (id, status, progress, question, definition, duration_seconds, \
                  record, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO UPDATE SET \
                 status = EXCLUDED.status, \
                 progress = EXCLUDED.progress, \
                 duration_seconds = EXCLUDED.duration_seconds, \
                 record = EXCLUDED.record, \
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.progress)
        .bind(&job.request.question)
        .bind(&job.request.definition)
        .bind(job.duration_seconds)
        .bind(Json(job))
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: JobId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM forecast_jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, query: &JobListQuery) -> Result<JobPage, StoreError> {
        let status = query.status.map(JobStatus::as_str);
        let pattern = query.search_term().map(like_pattern);
        let order = if query.sort_desc() { "DESC" } else { "ASC" };

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM forecast_jobs WHERE {FILTER}"
        ))
        .bind(status)
        .bind(pattern.as_deref())
        .fetch_one(&self.pool)
        .await?;

        let select = format!(
            "SELECT record FROM forecast_jobs WHERE {FILTER} \
             ORDER BY {column} {order}, id {order} \
             LIMIT $3 OFFSET $4",
            column = query.sort_by().column(),
        );
        let rows = sqlx::query_scalar::<_, Json<Job>>(&select)
            .bind(status)
            .bind(pattern.as_deref())
            .bind(query.limit())
            .bind(query.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(JobPage {
            jobs: rows.into_iter().map(|Json(job)| job).collect(),
            total,
            limit: query.limit(),
            offset: query.offset(),
        })
    }

    async fn statistics(&self) -> Result<JobStatistics, StoreError> {
        let (total, pending, running, completed, failed, avg_duration) =
            sqlx::query_as::<_, (i64, i64, i64, i64, i64, f64)>(
                "SELECT \
                     COUNT(*), \
                     COUNT(*) FILTER (WHERE status = 'pending'), \
                     COUNT(*) FILTER (WHERE status = 'running'), \
                     COUNT(*) FILTER (WHERE status = 'completed'), \
                     COUNT(*) FILTER (WHERE status = 'failed'), \
                     COALESCE(AVG(duration_seconds) \
                         FILTER (WHERE status = 'completed'), 0)::DOUBLE PRECISION \
                 FROM forecast_jobs",
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(JobStatistics {
            total_jobs: total,
            pending_jobs: pending,
            running_jobs: running,
            completed_jobs: completed,
            failed_jobs: failed,
            success_rate: success_rate(completed, total),
            average_duration_seconds: avg_duration,
        })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
