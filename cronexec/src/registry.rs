//! The recurrence registry: armed triggers and the clock that fires them.
//!
//! A single clock task sleeps until the earliest due trigger, or until a trigger is registered or
//! deregistered, and hands every due firing to a caller supplied callback. The callback is
//! expected to return immediately, spawning the actual work, so the clock never waits on a
//! running job.
use std::{
    collections::HashMap,
    ops::Sub,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::{sync::Notify, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    job::JobId,
    schedule::{ScheduleError, Trigger},
};

/// Invoked by the clock with the job id and the scheduled time of each due firing.
pub(crate) type OnFire = Arc<dyn Fn(JobId, DateTime<Utc>) + Send + Sync>;

#[derive(Debug)]
struct Entry {
    trigger: Trigger,
    next: DateTime<Utc>,
}

type Entries = Arc<Mutex<HashMap<JobId, Entry>>>;

#[derive(Debug)]
pub(crate) struct Registry {
    entries: Entries,
    // Holds at most one pending wake-up while the clock is busy or not yet started.
    wake: Arc<Notify>,
    started: AtomicBool,
    cancellation_token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            entries: Default::default(),
            wake: Arc::new(Notify::new()),
            started: AtomicBool::new(false),
            cancellation_token: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }
}

// The guarded state stays consistent across a panic, so a poisoned lock is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Registry {
    const IDLE_DELAY: Duration = Duration::from_secs(30);

    /// Arm `trigger` for the job, replacing any trigger it already had.
    ///
    /// Returns the first fire time.
    pub(crate) fn register(
        &self,
        job_id: JobId,
        trigger: Trigger,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, ScheduleError> {
        let next = trigger.first_fire_after(now)?;
        lock(&self.entries).insert(job_id, Entry { trigger, next });
        tracing::debug!(%job_id, %next, "Registered trigger for job {job_id}");
        self.wake.notify_one();
        Ok(next)
    }

    /// Disarm the job's trigger. Returns whether one was armed.
    pub(crate) fn deregister(&self, job_id: JobId) -> bool {
        let removed = lock(&self.entries).remove(&job_id).is_some();
        if removed {
            tracing::debug!(%job_id, "Deregistered trigger for job {job_id}");
            self.wake.notify_one();
        }
        removed
    }

    pub(crate) fn next_fire(&self, job_id: JobId) -> Option<DateTime<Utc>> {
        lock(&self.entries).get(&job_id).map(|entry| entry.next)
    }

    /// Start the clock. Returns `false` if it was already started.
    pub(crate) fn spawn(&self, on_fire: OnFire) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            return false;
        }
        let entries = self.entries.clone();
        let wake = self.wake.clone();
        let cancellation_token = self.cancellation_token.clone();

        let handle = tokio::spawn(async move {
            loop {
                let now = Utc::now();
                for (job_id, scheduled_at) in take_due(&entries, now) {
                    tracing::debug!(%job_id, %scheduled_at, "Firing job {job_id}");
                    on_fire(job_id, scheduled_at);
                }

                let delay = lock(&entries)
                    .values()
                    .map(|entry| entry.next)
                    .min()
                    .map(|next| {
                        next.sub(Utc::now())
                            .to_std()
                            .unwrap_or(Duration::ZERO)
                            .min(Self::IDLE_DELAY)
                    })
                    .unwrap_or(Self::IDLE_DELAY);

                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        tracing::debug!("Shutting down the scheduler clock");
                        break;
                    }
                    _ = wake.notified() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        });
        *lock(&self.handle) = Some(handle);
        true
    }

    /// Stop the clock, returning its task handle if it was running.
    pub(crate) fn shutdown(&self) -> Option<JoinHandle<()>> {
        self.cancellation_token.cancel();
        lock(&self.handle).take()
    }
}

/// Collect the firings due at `now` and advance their entries.
///
/// A one-shot entry is removed as it fires. A recurring entry advances from its scheduled time,
/// skipping ticks the clock has already fallen behind on.
fn take_due(entries: &Entries, now: DateTime<Utc>) -> Vec<(JobId, DateTime<Utc>)> {
    let mut entries = lock(entries);
    let mut due = Vec::new();
    let mut expired = Vec::new();

    for (job_id, entry) in entries.iter_mut() {
        if entry.next > now {
            continue;
        }
        let scheduled_at = entry.next;
        due.push((*job_id, scheduled_at));

        let next = match entry.trigger.next_after_fire(scheduled_at) {
            Some(next) if next <= now => entry.trigger.next_after_fire(now),
            next => next,
        };
        match next {
            Some(next) => entry.next = next,
            None => expired.push(*job_id),
        }
    }
    for job_id in expired {
        entries.remove(&job_id);
    }
    due
}
