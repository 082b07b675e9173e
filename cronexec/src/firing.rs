//! One firing of a job, end to end.
//!
//! Within a firing the log is persisted before the stats are updated, and the stats before the
//! job's run times. The callback is dispatched last, on its own isolated task. A persistence
//! failure at any step is logged and the remaining steps still run.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::{
    isolate::spawn_isolated,
    job::{runner::JobRunner, ExecutionLog, Job, JobId, ScheduleKind},
    notifier::Notifier,
    registry::{OnFire, Registry},
    stats,
    store::JobStore,
};

/// What started a firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// The registry's clock, at the given scheduled time.
    Scheduled(DateTime<Utc>),
    /// A manual run, which leaves the job's schedule untouched.
    Manual,
}

pub(crate) struct Firing<S> {
    store: Arc<S>,
    registry: Arc<Registry>,
    runner: JobRunner,
    notifier: Notifier,
}

impl<S> Firing<S>
where
    S: JobStore + 'static,
{
    pub(crate) fn new(
        store: Arc<S>,
        registry: Arc<Registry>,
        runner: JobRunner,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            registry,
            runner,
            notifier,
        }
    }

    /// The registry callback: every due trigger becomes an isolated firing.
    pub(crate) fn on_fire(self: Arc<Self>) -> OnFire {
        Arc::new(move |job_id, scheduled_at| {
            let firing = self.clone();
            spawn_isolated("firing", async move {
                firing.fire_scheduled(job_id, scheduled_at).await
            });
        })
    }

    /// Fire a triggered job, reloading it first: a job deleted or disabled since it was armed is
    /// skipped.
    async fn fire_scheduled(&self, job_id: JobId, scheduled_at: DateTime<Utc>) {
        match self.store.find_by_id(job_id).await {
            Ok(Some(job)) if job.enabled => self.fire(job, Origin::Scheduled(scheduled_at)).await,
            Ok(Some(_)) => {
                tracing::debug!(%job_id, "Skipping disabled job {job_id}");
            }
            Ok(None) => {
                tracing::debug!(%job_id, "Skipping deleted job {job_id}");
                self.registry.deregister(job_id);
            }
            Err(err) => {
                tracing::error!(?err, %job_id, "Failed to load job {job_id} for firing: {err}")
            }
        }
    }

    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub(crate) async fn fire(&self, job: Job, origin: Origin) {
        let job_id = job.id;
        let log = self.runner.run(&job).await.into_log(&job);

        if let Err(err) = self.store.create_log(&log).await {
            tracing::error!(?err, %job_id, "Failed to persist execution log of job {job_id}: {err}");
        }
        if let Err(err) = stats::update(self.store.as_ref(), &log).await {
            tracing::error!(?err, %job_id, "Failed to update stats of job {job_id}: {err}");
        }
        self.record_run(job_id, &log, origin).await;

        if job.callback.is_some() {
            let notifier = self.notifier.clone();
            spawn_isolated("callback", async move { notifier.notify(&job, &log).await });
        }
    }

    /// Write the run times against a freshly loaded copy of the job, so changes made while it ran
    /// are kept.
    async fn record_run(&self, job_id: JobId, log: &ExecutionLog, origin: Origin) {
        let mut job = match self.store.find_by_id(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::debug!(%job_id, "Job {job_id} was deleted while running");
                return;
            }
            Err(err) => {
                tracing::error!(?err, %job_id, "Failed to reload job {job_id}: {err}");
                return;
            }
        };

        job.last_run_at = Some(log.started_at);
        if let Origin::Scheduled(_) = origin {
            match job.schedule_kind {
                ScheduleKind::Once => {
                    job.enabled = false;
                    job.next_run_at = None;
                }
                ScheduleKind::Cron => {
                    if let Some(next) = self.registry.next_fire(job_id) {
                        job.next_run_at = Some(next);
                    }
                }
            }
        }

        if let Err(err) = self.store.save(&job).await {
            tracing::error!(?err, %job_id, "Failed to save run times of job {job_id}: {err}");
        }
    }
}
