//! The persistence contract the scheduler relies on.
//!
//! The store is the single source of truth for jobs, execution logs and stats. The scheduler holds
//! no job state of its own beyond armed triggers.
use async_trait::async_trait;
use thiserror::Error;

use crate::{
    job::{ExecutionLog, Job, JobId},
    stats::JobStats,
};

pub mod memory;
#[doc(hidden)]
pub mod testing;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Option<Job>, StoreError>;
    /// Persist a new job, returning it with its assigned id.
    ///
    /// Fails with [`StoreError::DuplicateName`] if the name is taken.
    async fn create(&self, job: Job) -> Result<Job, StoreError>;
    /// Overwrite an existing job.
    async fn save(&self, job: &Job) -> Result<(), StoreError>;
    /// Delete a job. Its logs and stats are kept.
    async fn delete(&self, id: JobId) -> Result<(), StoreError>;
    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, StoreError>;
    /// All jobs, ordered by id.
    async fn list_all(&self) -> Result<Vec<Job>, StoreError>;
    async fn create_log(&self, log: &ExecutionLog) -> Result<(), StoreError>;
    /// Logs of a job, most recent first.
    async fn list_logs(&self, job_id: JobId) -> Result<Vec<ExecutionLog>, StoreError>;
    async fn get_stats(&self, job_id: JobId) -> Result<Option<JobStats>, StoreError>;
    /// Create the stats row of the job if absent, else replace it.
    async fn upsert_stats(&self, stats: &JobStats) -> Result<(), StoreError>;
    async fn list_all_stats(&self) -> Result<Vec<JobStats>, StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),
    #[error("A job named `{0}` already exists")]
    DuplicateName(String),
    #[error("Store in bad state")]
    BadState,
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use super::*;

    #[test]
    fn other_keeps_the_backend_error() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");

        let err = StoreError::Other(Box::new(io));

        assert_eq!(err.to_string(), "connection refused");
        assert!(err.source().is_none());
    }

    #[test]
    fn messages_name_the_job() {
        assert_eq!(
            StoreError::JobNotFound(4.into()).to_string(),
            "Job not found: JobId(4)"
        );
        assert_eq!(
            StoreError::DuplicateName("nightly".to_owned()).to_string(),
            "A job named `nightly` already exists"
        );
    }
}
