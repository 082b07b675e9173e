//! Rolling per job aggregates of completed runs.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    job::{ExecutionLog, JobId},
    store::{JobStore, StoreError},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStats {
    pub job_id: JobId,
    pub total_runs: i64,
    pub success_runs: i64,
    pub failed_runs: i64,
    pub timeout_runs: i64,
    pub total_duration_secs: i64,
    /// Always `total_duration_secs / total_runs`.
    pub avg_duration_secs: f64,
    pub retry_count: i64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl JobStats {
    /// The zero aggregate.
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            total_runs: 0,
            success_runs: 0,
            failed_runs: 0,
            timeout_runs: 0,
            total_duration_secs: 0,
            avg_duration_secs: 0.0,
            retry_count: 0,
            last_success_at: None,
            last_failure_at: None,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    /// Fold one completed run into the aggregate.
    pub fn record(&mut self, log: &ExecutionLog) {
        self.total_runs += 1;
        self.total_duration_secs += log.duration_secs;
        self.avg_duration_secs = self.total_duration_secs as f64 / self.total_runs as f64;
        self.retry_count += i64::from(log.retries);

        if log.is_success() {
            self.success_runs += 1;
            self.last_success_at = Some(log.ended_at);
        } else {
            self.failed_runs += 1;
            self.last_failure_at = Some(log.ended_at);
            self.last_error = log.error.clone();
            if log.is_timeout() {
                self.timeout_runs += 1;
            }
        }
        self.updated_at = Utc::now();
    }
}

/// Apply one completed run to the stored aggregate of its job, creating it if absent.
///
/// Must be called exactly once per firing.
pub(crate) async fn update<S>(store: &S, log: &ExecutionLog) -> Result<JobStats, StoreError>
where
    S: JobStore + ?Sized,
{
    let mut stats = store
        .get_stats(log.job_id)
        .await?
        .unwrap_or_else(|| JobStats::new(log.job_id));
    stats.record(log);
    store.upsert_stats(&stats).await?;
    Ok(stats)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        job::{ErrorType, RunStatus},
        store::{memory::InMemoryStore, JobStore},
    };

    fn log(status: RunStatus, duration_secs: i64, retries: i32) -> ExecutionLog {
        ExecutionLog {
            duration_secs,
            retries,
            error: (status == RunStatus::Failure).then(|| "boom".to_owned()),
            error_type: (status == RunStatus::Failure).then_some(ErrorType::Failure),
            ..ExecutionLog::raw_log(status)
        }
    }

    #[test]
    fn average_tracks_every_update() {
        let mut stats = JobStats::new(1.into());
        let runs = [
            log(RunStatus::Success, 3, 0),
            log(RunStatus::Failure, 0, 2),
            log(RunStatus::Success, 10, 1),
            log(RunStatus::Success, 1, 0),
        ];

        for run in &runs {
            stats.record(run);
            assert_eq!(
                stats.avg_duration_secs,
                stats.total_duration_secs as f64 / stats.total_runs as f64
            );
        }

        assert_eq!(stats.total_runs, 4);
        assert_eq!(stats.success_runs, 3);
        assert_eq!(stats.failed_runs, 1);
        assert_eq!(stats.total_duration_secs, 14);
        assert_eq!(stats.retry_count, 3);
        assert_eq!(stats.avg_duration_secs, 3.5);
        assert_eq!(stats.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn timeouts_are_counted_once() {
        let mut stats = JobStats::new(1.into());
        stats.record(&ExecutionLog {
            error: Some("job failed to complete within timeout of 1s".to_owned()),
            error_type: Some(ErrorType::Timeout),
            ..ExecutionLog::raw_log(RunStatus::Failure)
        });
        stats.record(&log(RunStatus::Failure, 0, 0));

        assert_eq!(stats.timeout_runs, 1);
        assert_eq!(stats.failed_runs, 2);
    }

    #[test]
    fn success_keeps_last_error() {
        let mut stats = JobStats::new(1.into());
        stats.record(&log(RunStatus::Failure, 0, 0));
        stats.record(&log(RunStatus::Success, 0, 0));

        assert_eq!(stats.last_error.as_deref(), Some("boom"));
        assert!(stats.last_success_at.is_some());
        assert!(stats.last_failure_at.is_some());
    }

    #[tokio::test]
    async fn update_creates_then_accumulates() {
        let store = InMemoryStore::new();

        let first = update(&store, &log(RunStatus::Success, 2, 0)).await.unwrap();
        assert_eq!(first.total_runs, 1);

        update(&store, &log(RunStatus::Failure, 4, 1)).await.unwrap();
        let stats = store.get_stats(1.into()).await.unwrap().unwrap();

        assert_eq!(stats.total_runs, 2);
        assert_eq!(stats.avg_duration_secs, 3.0);
        assert_eq!(stats.retry_count, 1);
    }
}
