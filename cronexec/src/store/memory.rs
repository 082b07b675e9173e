//! Provides an in memory implementation of [`JobStore`].
//!
//! It is not optimized instead is designed to be a correct implementation for use in a test setup
//! or for hosts that do not need jobs to outlive the process.
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc, RwLock,
    },
};

use async_trait::async_trait;

use super::{ExecutionLog, Job, JobId, JobStats, JobStore, StoreError};

/// An in memory implementation of [`JobStore`].
///
/// Clones share the same underlying storage.
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    jobs: Arc<RwLock<BTreeMap<JobId, Job>>>,
    logs: Arc<RwLock<Vec<ExecutionLog>>>,
    stats: Arc<RwLock<BTreeMap<JobId, JobStats>>>,
    id_counter: Arc<AtomicI32>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            jobs: Default::default(),
            logs: Default::default(),
            stats: Default::default(),
            id_counter: Arc::new(AtomicI32::new(1)),
        }
    }
}

impl InMemoryStore {
    /// Creates a new instance of [`InMemoryStore`].
    pub fn new() -> Self {
        Self::default()
    }
}

fn name_taken(jobs: &BTreeMap<JobId, Job>, name: &str, except: Option<JobId>) -> bool {
    jobs.values()
        .any(|job| job.name == name && Some(job.id) != except)
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Job>, StoreError> {
        Ok(self
            .jobs
            .read()
            .map_err(|_| StoreError::BadState)?
            .values()
            .find(|job| job.name == name)
            .cloned())
    }

    async fn create(&self, job: Job) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::BadState)?;
        if name_taken(&jobs, &job.name, None) {
            return Err(StoreError::DuplicateName(job.name));
        }
        let id = JobId::from(self.id_counter.fetch_add(1, Ordering::SeqCst));
        let job = Job { id, ..job };
        jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::BadState)?;
        if name_taken(&jobs, &job.name, Some(job.id)) {
            return Err(StoreError::DuplicateName(job.name.clone()));
        }
        match jobs.get_mut(&job.id) {
            None => Err(StoreError::JobNotFound(job.id)),
            Some(stored) => {
                *stored = job.clone();
                Ok(())
            }
        }
    }

    async fn delete(&self, id: JobId) -> Result<(), StoreError> {
        self.jobs
            .write()
            .map_err(|_| StoreError::BadState)?
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::JobNotFound(id))
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self
            .jobs
            .read()
            .map_err(|_| StoreError::BadState)?
            .get(&id)
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .jobs
            .read()
            .map_err(|_| StoreError::BadState)?
            .values()
            .cloned()
            .collect())
    }

    async fn create_log(&self, log: &ExecutionLog) -> Result<(), StoreError> {
        self.logs
            .write()
            .map_err(|_| StoreError::BadState)?
            .push(log.clone());
        Ok(())
    }

    async fn list_logs(&self, job_id: JobId) -> Result<Vec<ExecutionLog>, StoreError> {
        let mut logs: Vec<_> = self
            .logs
            .read()
            .map_err(|_| StoreError::BadState)?
            .iter()
            .filter(|log| log.job_id == job_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(logs)
    }

    async fn get_stats(&self, job_id: JobId) -> Result<Option<JobStats>, StoreError> {
        Ok(self
            .stats
            .read()
            .map_err(|_| StoreError::BadState)?
            .get(&job_id)
            .cloned())
    }

    async fn upsert_stats(&self, stats: &JobStats) -> Result<(), StoreError> {
        self.stats
            .write()
            .map_err(|_| StoreError::BadState)?
            .insert(stats.job_id, stats.clone());
        Ok(())
    }

    async fn list_all_stats(&self) -> Result<Vec<JobStats>, StoreError> {
        Ok(self
            .stats
            .read()
            .map_err(|_| StoreError::BadState)?
            .values()
            .cloned()
            .collect())
    }
}
