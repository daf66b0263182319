//! In-process [`JobStore`] backed by a `HashMap`.

use std::collections::HashMap;

use async_trait::async_trait;
use foresight_core::job::Job;
use foresight_core::types::JobId;
use tokio::sync::RwLock;

use crate::models::{JobListQuery, JobPage, JobStatistics};
use crate::store::{JobStore, StoreError};

/// Job store that lives only as long as the process.
///
/// Each call takes the lock once, so per-key reads and writes are atomic.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn put(&self, job: &Job) -> Result<(), StoreError> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn delete(&self, id: JobId) -> Result<bool, StoreError> {
        Ok(self.jobs.write().await.remove(&id).is_some())
    }

    async fn list(&self, query: &JobListQuery) -> Result<JobPage, StoreError> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<&Job> = jobs.values().filter(|j| query.matches(j)).collect();

        let field = query.sort_by();
        matching.sort_by(|a, b| {
            let ord = field.compare(a, b).then_with(|| a.id.cmp(&b.id));
            if query.sort_desc() {
                ord.reverse()
            } else {
                ord
            }
        });

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .cloned()
            .collect();

        Ok(JobPage {
            jobs: page,
            total,
            limit: query.limit(),
            offset: query.offset(),
        })
    }

    async fn statistics(&self) -> Result<JobStatistics, StoreError> {
        Ok(JobStatistics::from_jobs(self.jobs.read().await.values()))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
