//! Helpers for testing code that schedules jobs.
//!
//! Firings run on their own tasks, so tests observe their effects by polling the store.
use std::{future::Future, time::Duration};

use crate::{
    job::{ExecutionLog, JobId},
    store::{JobStore, StoreError},
};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Poll `condition` until it holds, giving up after `timeout`. Returns whether it held.
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(timeout, async {
        while !condition().await {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .is_ok()
}

/// Wait until at least `count` execution logs exist for the job, returning them most recent
/// first. On timeout the logs found so far are returned.
///
/// # Example
///
/// ```
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// use std::time::Duration;
/// use cronexec::{job::builder::JobBuilder, store::memory::InMemoryStore, testing::wait_for_logs, Scheduler};
///
/// let store = InMemoryStore::new();
/// let scheduler = Scheduler::new(store.clone());
/// let job = scheduler
///     .add_job(JobBuilder::cron("echo", "0 0 1 1 *").shell("echo hi").build())
///     .await
///     .unwrap();
///
/// scheduler.run_now(job.clone());
///
/// let logs = wait_for_logs(&store, job.id, 1, Duration::from_secs(5)).await.unwrap();
/// assert!(logs[0].is_success());
/// # });
/// ```
pub async fn wait_for_logs<S>(
    store: &S,
    job_id: JobId,
    count: usize,
    timeout: Duration,
) -> Result<Vec<ExecutionLog>, StoreError>
where
    S: JobStore + ?Sized,
{
    let poll = async {
        loop {
            let logs = store.list_logs(job_id).await?;
            if logs.len() >= count {
                return Ok::<_, StoreError>(logs);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    };

    match tokio::time::timeout(timeout, poll).await {
        Ok(result) => result,
        Err(_elapsed) => store.list_logs(job_id).await,
    }
}
