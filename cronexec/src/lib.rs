//! A job scheduler for recurring (cron) and one-shot jobs that run shell commands or HTTP
//! requests, with per attempt timeouts, retries, execution logs, rolling stats and completion
//! callbacks.
//!
//! The [`Scheduler`] is the entry point. Jobs, logs and stats live in a [`store::JobStore`];
//! [`store::memory::InMemoryStore`] is provided, and `cronexec-sqlx` provides a PostgreSQL store.
//!
//! # Example
//!
//! ```
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! use cronexec::{job::builder::JobBuilder, store::memory::InMemoryStore, Scheduler};
//!
//! let scheduler = Scheduler::new(InMemoryStore::new());
//! scheduler.start().await.unwrap();
//!
//! let job = scheduler
//!     .add_job(
//!         JobBuilder::cron("heartbeat", "*/30 * * * * *")
//!             .http("GET", "http://localhost:8080/health")
//!             .with_timeout_secs(5)
//!             .with_retries(0, 0)
//!             .build(),
//!     )
//!     .await
//!     .unwrap();
//! assert!(job.next_run_at.is_some());
//!
//! scheduler.graceful_shutdown().await.unwrap();
//! # });
//! ```
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;

pub mod config;
pub mod executor;
mod firing;
pub mod isolate;
pub mod job;
pub mod notifier;
pub mod prelude;
mod registry;
pub mod schedule;
pub mod stats;
pub mod store;
pub mod testing;

use config::SchedulerConfig;
use executor::Executors;
use firing::{Firing, Origin};
use job::{
    runner::JobRunner,
    validation::{self, ValidationError},
    ExecutionLog, Job, JobId,
};
use notifier::Notifier;
use registry::Registry;
use schedule::Trigger;
use stats::JobStats;
use store::{JobStore, StoreError};

/// The scheduler facade.
///
/// Adding, updating and removing jobs keeps the store and the armed triggers in step. Firings
/// run on isolated tasks, so neither a slow job nor a failing one holds up the clock or other
/// jobs.
pub struct Scheduler<S: JobStore + 'static> {
    store: Arc<S>,
    registry: Arc<Registry>,
    firing: Arc<Firing<S>>,
    config: SchedulerConfig,
    executors: Executors,
}

impl<S> Scheduler<S>
where
    S: JobStore + 'static,
{
    pub fn new(store: S) -> Self {
        let config = SchedulerConfig::default();
        let executors = Executors::from_config(&config);
        Self::assemble(Arc::new(store), config, executors)
    }

    /// Replace the engine defaults. This also resets the executors to the defaults for `config`,
    /// so call [`Scheduler::with_executors`] afterwards.
    pub fn with_config(self, config: SchedulerConfig) -> Self {
        let executors = Executors::from_config(&config);
        Self::assemble(self.store, config, executors)
    }

    /// Use custom execution strategies.
    pub fn with_executors(self, executors: Executors) -> Self {
        Self::assemble(self.store, self.config, executors)
    }

    fn assemble(store: Arc<S>, config: SchedulerConfig, executors: Executors) -> Self {
        let registry = Arc::new(Registry::default());
        let notifier = Notifier::new(reqwest::Client::new(), config.callback_timeout);
        let firing = Arc::new(Firing::new(
            store.clone(),
            registry.clone(),
            JobRunner::new(executors.clone()),
            notifier,
        ));
        Self {
            store,
            registry,
            firing,
            config,
            executors,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn executors(&self) -> &Executors {
        &self.executors
    }

    /// Start the clock and arm every enabled job in the store.
    ///
    /// Jobs that can no longer be armed, a one-shot job whose time has passed or a schedule that
    /// no longer parses, are skipped with a warning.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if !self.registry.spawn(self.firing.clone().on_fire()) {
            return Err(SchedulerError::AlreadyStarted);
        }

        let now = Utc::now();
        for mut job in self.store.list_all().await? {
            if !job.enabled {
                continue;
            }
            let job_id = job.id;
            let next = match Trigger::for_job(&job)
                .and_then(|trigger| self.registry.register(job_id, trigger, now))
            {
                Ok(next) => next,
                Err(err) => {
                    tracing::warn!(?err, %job_id, "Not arming job {job_id}: {err}");
                    continue;
                }
            };
            if job.next_run_at != Some(next) {
                job.next_run_at = Some(next);
                if let Err(err) = self.store.save(&job).await {
                    tracing::error!(?err, %job_id, "Failed to save next run of job {job_id}: {err}");
                }
            }
        }
        tracing::info!("Scheduler started");
        Ok(())
    }

    /// Stop the clock. Firings already in flight run to completion on their own tasks.
    pub async fn graceful_shutdown(&self) -> Result<(), SchedulerError> {
        tracing::debug!("Shutting down the scheduler");
        if let Some(handle) = self.registry.shutdown() {
            handle
                .await
                .map_err(|_| SchedulerError::GracefulShutdownFailed)?;
        }
        Ok(())
    }

    /// Validate, persist and arm a new job, returning it with its id and first fire time.
    pub async fn add_job(&self, mut job: Job) -> Result<Job, SchedulerError> {
        let now = Utc::now();
        let (trigger, _) = validation::validate(&mut job, &self.config, now, false)?;
        if self.store.find_by_name(&job.name).await?.is_some() {
            return Err(ValidationError::DuplicateName(job.name).into());
        }

        let job = self.store.create(job).await.map_err(duplicate_name)?;
        if job.enabled {
            self.registry
                .register(job.id, trigger, now)
                .map_err(ValidationError::from)?;
        }
        tracing::info!(job_id = %job.id, "Added job {} ({})", job.id, job.name);
        Ok(job)
    }

    /// Replace a job's definition and re-arm it according to its new schedule.
    ///
    /// The engine maintained `last_run_at` and `inserted_at` of the stored job are kept. A job that
    /// is disabled and stays disabled, such as a one-shot job that has fired, may keep a past
    /// one-shot time.
    pub async fn update_job(&self, mut job: Job) -> Result<Job, SchedulerError> {
        let job_id = job.id;
        let existing = self
            .store
            .find_by_id(job_id)
            .await?
            .ok_or(SchedulerError::JobNotFound(job_id))?;

        let now = Utc::now();
        let (trigger, _) =
            validation::validate(&mut job, &self.config, now, !existing.enabled)?;
        if let Some(other) = self.store.find_by_name(&job.name).await? {
            if other.id != job_id {
                return Err(ValidationError::DuplicateName(job.name).into());
            }
        }
        job.last_run_at = existing.last_run_at;
        job.inserted_at = existing.inserted_at;

        self.store.save(&job).await.map_err(duplicate_name)?;
        self.registry.deregister(job_id);
        if job.enabled {
            self.registry
                .register(job_id, trigger, now)
                .map_err(ValidationError::from)?;
        }
        tracing::info!(%job_id, "Updated job {job_id} ({})", job.name);
        Ok(job)
    }

    /// Disarm and delete a job. A firing already in progress is not aborted.
    pub async fn remove_job(&self, job_id: JobId) -> Result<(), SchedulerError> {
        self.registry.deregister(job_id);
        self.store.delete(job_id).await.map_err(|err| match err {
            StoreError::JobNotFound(id) => SchedulerError::JobNotFound(id),
            err => err.into(),
        })?;
        tracing::info!(%job_id, "Removed job {job_id}");
        Ok(())
    }

    /// Fire the job once, now, without touching its schedule.
    ///
    /// Unset numeric settings take the engine defaults. The firing runs in the background; the
    /// handle resolves once it has completed.
    pub fn run_now(&self, mut job: Job) -> JoinHandle<()> {
        validation::apply_defaults(&mut job, &self.config);
        let firing = self.firing.clone();
        isolate::spawn_isolated("manual firing", async move {
            firing.fire(job, Origin::Manual).await
        })
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>, SchedulerError> {
        Ok(self.store.list_all().await?)
    }

    pub async fn get_job(&self, job_id: JobId) -> Result<Job, SchedulerError> {
        self.store
            .find_by_id(job_id)
            .await?
            .ok_or(SchedulerError::JobNotFound(job_id))
    }

    /// Execution logs of a job, most recent first.
    pub async fn get_logs(&self, job_id: JobId) -> Result<Vec<ExecutionLog>, SchedulerError> {
        Ok(self.store.list_logs(job_id).await?)
    }

    pub async fn get_stats(&self, job_id: JobId) -> Result<Option<JobStats>, SchedulerError> {
        Ok(self.store.get_stats(job_id).await?)
    }

    pub async fn get_all_stats(&self) -> Result<Vec<JobStats>, SchedulerError> {
        Ok(self.store.list_all_stats().await?)
    }
}

fn duplicate_name(err: StoreError) -> SchedulerError {
    match err {
        StoreError::DuplicateName(name) => ValidationError::DuplicateName(name).into(),
        err => err.into(),
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid job: {0}")]
    Validation(#[from] ValidationError),
    #[error("Job not found: {0}")]
    JobNotFound(JobId),
    #[error("Error communicating with the job store")]
    Store(#[from] StoreError),
    #[error("Scheduler already started")]
    AlreadyStarted,
    #[error("Failed to gracefully shut down")]
    GracefulShutdownFailed,
}
