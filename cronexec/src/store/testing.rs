//! Test suite for ensuring a correct implementation of a [`JobStore`].
use chrono::{TimeDelta, Utc};

use crate::job::{builder::JobBuilder, ErrorType, RunStatus};

use super::*;

fn sample_job(name: &str) -> Job {
    JobBuilder::cron(name, "*/5 * * * *")
        .shell("echo hello")
        .with_header("x-trace", "1")
        .with_timeout_secs(30)
        .with_retries(2, 1)
        .build()
}

fn sample_log(job_id: JobId, status: RunStatus, minutes_ago: i64) -> ExecutionLog {
    let started_at = Utc::now() - TimeDelta::minutes(minutes_ago);
    ExecutionLog {
        job_id,
        status,
        started_at,
        ended_at: started_at + TimeDelta::seconds(2),
        duration_secs: 2,
        output: "output".to_owned(),
        error: (status == RunStatus::Failure).then(|| "failed".to_owned()),
        error_type: (status == RunStatus::Failure).then_some(ErrorType::Failure),
        retries: 1,
    }
}

/// Create test suite for cronexec job stores.
///
/// For store implementors, it is useful to include this as part of your test suites.
///
/// # Example
///
/// ```
/// use cronexec::test_suite;
/// use cronexec::store::memory::InMemoryStore;
/// test_suite!(for: InMemoryStore::new());
/// ```
///
/// If you are using a different async test attribute you can configure the macro to use that
/// instead. For example when using `sqlx::test` you could do the following:
///
/// ```ignore
/// use cronexec::test_suite;
/// test_suite!(
///     attr: sqlx::test,
///     args: (pool: PgPool),
///     store: StoreImplementation::from(pool)
/// );
/// ```
#[macro_export]
macro_rules! test_suite {
    (for: $store:expr) => {
        $crate::test_suite!(attr: tokio::test, args: (), store: $store);
    };
    (attr: $attr:meta, args: $args:tt, store: $store:expr) => {
        #[$attr]
        async fn create_assigns_ids $args {
          let store = $store;
          $crate::store::testing::create_assigns_ids(store).await;
        }
        #[$attr]
        async fn create_duplicate_name $args {
          let store = $store;
          $crate::store::testing::create_duplicate_name(store).await;
        }
        #[$attr]
        async fn find_by_name $args {
          let store = $store;
          $crate::store::testing::find_by_name(store).await;
        }
        #[$attr]
        async fn save $args {
          let store = $store;
          $crate::store::testing::save(store).await;
        }
        #[$attr]
        async fn save_not_found $args {
          let store = $store;
          $crate::store::testing::save_not_found(store).await;
        }
        #[$attr]
        async fn save_duplicate_name $args {
          let store = $store;
          $crate::store::testing::save_duplicate_name(store).await;
        }
        #[$attr]
        async fn delete $args {
          let store = $store;
          $crate::store::testing::delete(store).await;
        }
        #[$attr]
        async fn delete_not_found $args {
          let store = $store;
          $crate::store::testing::delete_not_found(store).await;
        }
        #[$attr]
        async fn list_all_ordered_by_id $args {
          let store = $store;
          $crate::store::testing::list_all_ordered_by_id(store).await;
        }
        #[$attr]
        async fn logs_most_recent_first $args {
          let store = $store;
          $crate::store::testing::logs_most_recent_first(store).await;
        }
        #[$attr]
        async fn upsert_stats $args {
          let store = $store;
          $crate::store::testing::upsert_stats(store).await;
        }
    };
}

#[doc(hidden)]
pub async fn create_assigns_ids(store: impl JobStore) {
    let first = store.create(sample_job("first")).await.unwrap();
    let second = store.create(sample_job("second")).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(first.name, "first");
    assert_eq!(first.headers.get("x-trace").map(String::as_str), Some("1"));
    assert_eq!(first.retry_times, 2);
}

#[doc(hidden)]
pub async fn create_duplicate_name(store: impl JobStore) {
    store.create(sample_job("dup")).await.unwrap();

    assert!(matches!(
        store.create(sample_job("dup")).await,
        Err(StoreError::DuplicateName(name)) if name == "dup"
    ));
    assert_eq!(store.list_all().await.unwrap().len(), 1);
}

#[doc(hidden)]
pub async fn find_by_name(store: impl JobStore) {
    let job = store.create(sample_job("named")).await.unwrap();

    let found = store.find_by_name("named").await.unwrap().unwrap();
    assert_eq!(found.id, job.id);
    assert!(store.find_by_name("missing").await.unwrap().is_none());
}

#[doc(hidden)]
pub async fn save(store: impl JobStore) {
    let mut job = store.create(sample_job("to-save")).await.unwrap();
    let last_run_at = Utc::now();
    job.enabled = false;
    job.description = "updated".to_owned();
    job.last_run_at = Some(last_run_at);

    store.save(&job).await.unwrap();

    let saved = store.find_by_id(job.id).await.unwrap().unwrap();
    assert!(!saved.enabled);
    assert_eq!(saved.description, "updated");
    assert_eq!(
        saved.last_run_at.map(|at| at.timestamp_millis()),
        Some(last_run_at.timestamp_millis())
    );
}

#[doc(hidden)]
pub async fn save_not_found(store: impl JobStore) {
    let job = Job {
        id: 42.into(),
        ..sample_job("ghost")
    };

    assert!(matches!(
        store.save(&job).await,
        Err(StoreError::JobNotFound(_))
    ));
}

#[doc(hidden)]
pub async fn save_duplicate_name(store: impl JobStore) {
    store.create(sample_job("taken")).await.unwrap();
    let mut job = store.create(sample_job("free")).await.unwrap();
    job.name = "taken".to_owned();

    assert!(matches!(
        store.save(&job).await,
        Err(StoreError::DuplicateName(_))
    ));
}

#[doc(hidden)]
pub async fn delete(store: impl JobStore) {
    let job = store.create(sample_job("to-delete")).await.unwrap();
    store
        .create_log(&sample_log(job.id, RunStatus::Success, 1))
        .await
        .unwrap();

    store.delete(job.id).await.unwrap();

    assert!(store.find_by_id(job.id).await.unwrap().is_none());
    assert_eq!(store.list_logs(job.id).await.unwrap().len(), 1);
}

#[doc(hidden)]
pub async fn delete_not_found(store: impl JobStore) {
    assert!(matches!(
        store.delete(42.into()).await,
        Err(StoreError::JobNotFound(_))
    ));
}

#[doc(hidden)]
pub async fn list_all_ordered_by_id(store: impl JobStore) {
    for name in ["c", "a", "b"] {
        store.create(sample_job(name)).await.unwrap();
    }

    let jobs = store.list_all().await.unwrap();
    let names: Vec<_> = jobs.iter().map(|job| job.name.as_str()).collect();
    assert_eq!(names, ["c", "a", "b"]);
    assert!(jobs.windows(2).all(|pair| pair[0].id < pair[1].id));
}

#[doc(hidden)]
pub async fn logs_most_recent_first(store: impl JobStore) {
    let job = store.create(sample_job("logged")).await.unwrap();
    let other = store.create(sample_job("other")).await.unwrap();
    store
        .create_log(&sample_log(job.id, RunStatus::Success, 10))
        .await
        .unwrap();
    store
        .create_log(&sample_log(job.id, RunStatus::Failure, 1))
        .await
        .unwrap();
    store
        .create_log(&sample_log(other.id, RunStatus::Success, 5))
        .await
        .unwrap();

    let logs = store.list_logs(job.id).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].status, RunStatus::Failure);
    assert_eq!(logs[0].error.as_deref(), Some("failed"));
    assert_eq!(logs[0].error_type, Some(ErrorType::Failure));
    assert_eq!(logs[1].status, RunStatus::Success);
    assert!(logs[0].started_at > logs[1].started_at);
}

#[doc(hidden)]
pub async fn upsert_stats(store: impl JobStore) {
    let job = store.create(sample_job("counted")).await.unwrap();
    assert!(store.get_stats(job.id).await.unwrap().is_none());

    let mut stats = JobStats::new(job.id);
    stats.record(&sample_log(job.id, RunStatus::Success, 1));
    store.upsert_stats(&stats).await.unwrap();

    stats.record(&sample_log(job.id, RunStatus::Failure, 0));
    store.upsert_stats(&stats).await.unwrap();

    let stored = store.get_stats(job.id).await.unwrap().unwrap();
    assert_eq!(stored.total_runs, 2);
    assert_eq!(stored.success_runs, 1);
    assert_eq!(stored.failed_runs, 1);
    assert_eq!(stored.retry_count, 2);
    assert_eq!(stored.avg_duration_secs, 2.0);
    assert_eq!(stored.last_error.as_deref(), Some("failed"));
    assert_eq!(store.list_all_stats().await.unwrap().len(), 1);
}
