//! Completion callbacks.
//!
//! A job may carry a [`Callback`] whose body template is rendered against the finished
//! [`ExecutionLog`] and delivered once, without retries. Delivery failures are logged and never
//! reach the job's own outcome.
use std::{borrow::Cow, sync::OnceLock, time::Duration};

use chrono::SecondsFormat;
use regex::{Captures, Regex};
use reqwest::{header::CONTENT_TYPE, Client, Method, StatusCode};
use thiserror::Error;

use crate::job::{Callback, ExecutionLog, Job};

/// The placeholder names a callback body template may use, as `${name}`.
pub const SUPPORTED_PLACEHOLDERS: &[&str] = &[
    "task_id",
    "name",
    "status",
    "output",
    "error",
    "start_time",
    "end_time",
    "duration",
];

fn placeholder_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\$\{([^}]*)\}").expect("placeholder pattern is valid"))
}

/// The names of every `${name}` placeholder in `template`, in order of appearance.
pub fn placeholders(template: &str) -> impl Iterator<Item = &str> {
    placeholder_regex()
        .captures_iter(template)
        .filter_map(|captures| captures.get(1))
        .map(|name| name.as_str())
}

/// Substitute the supported placeholders of `template` with the values of the completed run.
///
/// ```
/// # use cronexec::notifier::render;
/// # use cronexec::job::{builder::JobBuilder, ExecutionLog, RunStatus};
/// # use chrono::Utc;
/// let mut job = JobBuilder::cron("report", "0 * * * *").shell("true").build();
/// job.id = 7.into();
/// let log = ExecutionLog {
///     job_id: job.id,
///     status: RunStatus::Success,
///     started_at: Utc::now(),
///     ended_at: Utc::now(),
///     duration_secs: 0,
///     output: String::new(),
///     error: None,
///     error_type: None,
///     retries: 0,
/// };
///
/// assert_eq!(render("task ${task_id} ${status}", &job, &log), "task 7 1");
/// ```
pub fn render<'a>(template: &'a str, job: &Job, log: &ExecutionLog) -> Cow<'a, str> {
    placeholder_regex().replace_all(template, |captures: &Captures<'_>| {
        let whole = &captures[0];
        match &captures[1] {
            "task_id" => i32::from(job.id).to_string(),
            "name" => job.name.clone(),
            "status" => log.status.code().to_string(),
            "output" => log.output.clone(),
            "error" => log.error.clone().unwrap_or_default(),
            "start_time" => log.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            "end_time" => log.ended_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            "duration" => log.duration_secs.to_string(),
            _ => whole.to_owned(),
        }
    })
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid callback method `{0}`")]
    InvalidMethod(String),
    #[error("callback request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("callback responded with status {0}")]
    Status(StatusCode),
}

/// Delivers completion callbacks.
#[derive(Debug, Clone)]
pub struct Notifier {
    client: Client,
    timeout: Duration,
}

impl Notifier {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Deliver the job's callback for `log`, if it has one. Never fails: the outcome is logged.
    pub async fn notify(&self, job: &Job, log: &ExecutionLog) {
        let Some(callback) = job.callback.as_ref().filter(|cb| !cb.url.trim().is_empty()) else {
            return;
        };
        let job_id = job.id;
        match self.deliver(callback, job, log).await {
            Ok(status) => tracing::info!(
                %job_id,
                %status,
                "Delivered callback for job {job_id} to {}",
                callback.url
            ),
            Err(err) => tracing::warn!(
                ?err,
                %job_id,
                "Failed to deliver callback for job {job_id} to {}: {err}",
                callback.url
            ),
        }
    }

    async fn deliver(
        &self,
        callback: &Callback,
        job: &Job,
        log: &ExecutionLog,
    ) -> Result<StatusCode, NotifyError> {
        let method = match callback.method.trim() {
            "" => Method::POST,
            method => Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map_err(|_| NotifyError::InvalidMethod(callback.method.clone()))?,
        };

        let mut request = self
            .client
            .request(method, &callback.url)
            .timeout(self.timeout);
        for (key, value) in &callback.headers {
            request = request.header(key, value);
        }
        let body = render(&callback.body_template, job, log);
        if !body.is_empty() {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(body.into_owned());
        }

        let status = request.send().await?.status();
        if status.is_success() {
            Ok(status)
        } else {
            Err(NotifyError::Status(status))
        }
    }
}
