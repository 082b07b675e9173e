use chrono::{DateTime, Utc};
use tokio::task::JoinError;
use tracing::{instrument, Instrument};

use crate::{
    executor::{ExecutionError, Executors},
    isolate::{catch_panic, panic_message},
};

use super::{ExecutionLog, Job, RunStatus};

/// The retry/timeout loop around an [`crate::executor::Executor`].
#[derive(Debug, Clone)]
pub(crate) struct JobRunner {
    executors: Executors,
}

/// What the retry loop concluded for one firing.
#[derive(Debug)]
pub(crate) struct RunOutcome {
    pub output: String,
    pub error: Option<ExecutionError>,
    /// Index of the final attempt.
    pub retries: i32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl RunOutcome {
    pub(crate) fn into_log(self, job: &Job) -> ExecutionLog {
        let duration_secs = (self.ended_at - self.started_at).num_seconds().max(0);
        ExecutionLog {
            job_id: job.id,
            status: match self.error {
                None => RunStatus::Success,
                Some(_) => RunStatus::Failure,
            },
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration_secs,
            output: self.output,
            error_type: self.error.as_ref().map(ExecutionError::error_type),
            error: self.error.map(|error| error.to_string()),
            retries: self.retries,
        }
    }
}

impl JobRunner {
    pub(crate) fn new(executors: Executors) -> Self {
        Self { executors }
    }

    /// Run the job until an attempt succeeds or `1 + retry_times` attempts have failed.
    ///
    /// Every attempt runs on its own task bounded by the job's timeout, so a panicking or hung
    /// attempt is contained and classified like any other failure.
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub(crate) async fn run(&self, job: &Job) -> RunOutcome {
        let job_id = job.id;
        let executor = self.executors.for_kind(job.exec_kind);
        let timeout = job.timeout();
        let max_retries = job.retry_times.max(0);
        let started_at = Utc::now();
        let mut attempt = 0;

        loop {
            tracing::debug!(%job_id, attempt, "Executing job {job_id}");
            let fut = {
                let executor = executor.clone();
                let job = job.clone();
                async move {
                    catch_panic(tokio::time::timeout(timeout, executor.execute(&job))).await
                }
            };

            let result = match tokio::spawn(fut.in_current_span()).await {
                Ok(Ok(Ok(result))) => result,
                Ok(Ok(Err(_elapsed))) => Err(ExecutionError::Timeout(timeout)),
                Ok(Err(panic)) => {
                    let message = &panic.message;
                    let backtrace = panic.backtrace_text();
                    tracing::error!(
                        %job_id,
                        attempt,
                        %backtrace,
                        "Job {job_id} panicked: {message}\n{backtrace}"
                    );
                    Err(ExecutionError::Panicked(panic.message))
                }
                Err(error) => Err(error.into()),
            };

            let error = match result {
                Ok(output) => {
                    tracing::debug!(%job_id, attempt, "Job {job_id} succeeded");
                    return RunOutcome {
                        output,
                        error: None,
                        retries: attempt,
                        started_at,
                        ended_at: Utc::now(),
                    };
                }
                Err(error) => error,
            };

            if attempt >= max_retries {
                tracing::error!(
                    %job_id,
                    ?error,
                    "Job {job_id} failed after {} attempts: error type: {}, message: {error}",
                    attempt + 1,
                    error.error_type().as_str(),
                );
                return RunOutcome {
                    output: error.output().to_owned(),
                    error: Some(error),
                    retries: attempt,
                    started_at,
                    ended_at: Utc::now(),
                };
            }

            let delay = job.retry_delay();
            tracing::warn!(
                %job_id,
                ?error,
                "Job {job_id} failed and will be retried in {}s: error type: {}, message: {error}",
                delay.as_secs(),
                error.error_type().as_str(),
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl From<JoinError> for ExecutionError {
    fn from(value: JoinError) -> Self {
        let msg = value.to_string();
        let message = match value.try_into_panic() {
            Ok(panic) => panic_message(panic.as_ref()).map_or(msg, ToOwned::to_owned),
            Err(_) => msg,
        };
        Self::Panicked(message)
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use assert_matches::assert_matches;

    use super::*;
    use crate::{
        executor::MockExecutor,
        job::ErrorType,
    };

    fn runner(executor: MockExecutor) -> JobRunner {
        JobRunner::new(Executors::default().with_shell(executor))
    }

    fn job(retry_times: i32) -> Job {
        Job {
            retry_times,
            retry_delay_secs: 0,
            ..Job::raw_job()
        }
    }

    #[tokio::test]
    async fn always_failing_makes_n_plus_one_attempts() {
        let mut executor = MockExecutor::new();
        executor
            .expect_execute()
            .times(4)
            .returning(|_| Err(ExecutionError::failed("nope")));

        let outcome = runner(executor).run(&job(3)).await;

        assert_eq!(outcome.retries, 3);
        assert_matches!(outcome.error, Some(ExecutionError::Failed { .. }));
    }

    #[tokio::test]
    async fn zero_retries_means_one_attempt() {
        let mut executor = MockExecutor::new();
        executor
            .expect_execute()
            .times(1)
            .returning(|_| Err(ExecutionError::failed("nope")));

        let outcome = runner(executor).run(&job(0)).await;
        assert_eq!(outcome.retries, 0);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn success_on_attempt_k_stops() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut executor = MockExecutor::new();
        executor.expect_execute().times(3).returning({
            let calls = calls.clone();
            move |_| {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ExecutionError::failed("not yet"))
                } else {
                    Ok("done".to_owned())
                }
            }
        });

        let outcome = runner(executor).run(&job(5)).await;

        assert_eq!(outcome.retries, 2);
        assert_eq!(outcome.output, "done");
        assert!(outcome.error.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failure_output_is_from_last_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut executor = MockExecutor::new();
        executor.expect_execute().times(2).returning({
            let calls = calls.clone();
            move |_| {
                Err(ExecutionError::Failed {
                    message: "exit status: 1".to_owned(),
                    output: format!("attempt {}", calls.fetch_add(1, Ordering::SeqCst)),
                })
            }
        });

        let outcome = runner(executor).run(&job(1)).await;
        let log = outcome.into_log(&job(1));

        assert_eq!(log.status, RunStatus::Failure);
        assert_eq!(log.output, "attempt 1");
        assert_eq!(log.error.as_deref(), Some("exit status: 1"));
        assert_eq!(log.error_type, Some(ErrorType::Failure));
        assert_eq!(log.retries, 1);
    }

    struct Sleeper;

    #[async_trait::async_trait]
    impl crate::executor::Executor for Sleeper {
        async fn execute(&self, _job: &Job) -> Result<String, ExecutionError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("too late".to_owned())
        }
    }

    #[tokio::test]
    async fn overrunning_attempt_is_a_timeout() {
        let runner = JobRunner::new(Executors::default().with_shell(Sleeper));
        let job = Job {
            timeout_secs: 1,
            ..job(0)
        };

        let outcome = runner.run(&job).await;
        let log = outcome.into_log(&job);

        assert!(log.is_timeout());
        assert_eq!(
            log.error.as_deref(),
            Some("job failed to complete within timeout of 1s")
        );
        assert_eq!(log.duration_secs, 1);
    }

    struct Panicker;

    #[async_trait::async_trait]
    impl crate::executor::Executor for Panicker {
        async fn execute(&self, _job: &Job) -> Result<String, ExecutionError> {
            panic!("executor blew up")
        }
    }

    #[tokio::test]
    async fn panicking_attempt_is_contained_and_retried() {
        let runner = JobRunner::new(Executors::default().with_shell(Panicker));

        let outcome = runner.run(&job(1)).await;

        assert_eq!(outcome.retries, 1);
        assert_matches!(
            outcome.error,
            Some(ExecutionError::Panicked(message)) if message == "executor blew up"
        );
    }

    #[tokio::test]
    async fn successful_log() {
        let mut executor = MockExecutor::new();
        executor
            .expect_execute()
            .returning(|_| Ok("hello\n".to_owned()));

        let job = job(0);
        let log = runner(executor).run(&job).await.into_log(&job);

        assert!(log.is_success());
        assert_eq!(log.output, "hello\n");
        assert_eq!(log.error, None);
        assert_eq!(log.error_type, None);
        assert_eq!(log.duration_secs, 0);
    }
}
