//! The job data model: what to run, when to run it, and the record left behind by a run.
use std::{collections::BTreeMap, fmt::Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod builder;
pub(crate) mod runner;
pub mod validation;

/// Stable numeric identity of a job, assigned by the [`crate::store::JobStore`] on creation.
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Clone, Copy, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(i32);

impl From<i32> for JobId {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl From<JobId> for i32 {
    fn from(value: JobId) -> Self {
        value.0
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

/// How a job recurs.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    /// A single execution at the absolute RFC 3339 timestamp held in [`Job::spec`].
    Once,
    /// Recurring execution following the cron expression held in [`Job::spec`].
    Cron,
}

/// What a job runs.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecKind {
    /// [`Job::command`] is run through the system command interpreter.
    Shell,
    /// [`Job::command`] is the target URL of an HTTP request.
    Http,
}

/// A recurring or one-shot unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Unique among all jobs.
    pub name: String,
    pub schedule_kind: ScheduleKind,
    /// A cron expression, or an RFC 3339 timestamp for [`ScheduleKind::Once`].
    pub spec: String,
    pub exec_kind: ExecKind,
    /// The shell command or the target URL.
    pub command: String,
    /// HTTP method, `GET` when empty.
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    /// Per attempt deadline in seconds.
    pub timeout_secs: i64,
    /// Number of retries after the first failed attempt.
    pub retry_times: i32,
    pub retry_delay_secs: i64,
    pub description: String,
    pub callback: Option<Callback>,
    pub inserted_at: DateTime<Utc>,
}

impl Job {
    pub(crate) fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs.max(0) as u64)
    }

    pub(crate) fn retry_delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.retry_delay_secs.max(0) as u64)
    }

    pub(crate) fn http_method(&self) -> &str {
        match self.method.trim() {
            "" => "GET",
            method => method,
        }
    }
}

/// Where and how to report a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Callback {
    pub url: String,
    /// `POST` when empty.
    pub method: String,
    pub headers: BTreeMap<String, String>,
    /// Body template; see [`crate::notifier::SUPPORTED_PLACEHOLDERS`].
    pub body_template: String,
}

/// Outcome of a run.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failure,
}

impl RunStatus {
    /// The numeric code exposed to callback templates.
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 1,
            Self::Failure => 0,
        }
    }
}

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Panic,
    Timeout,
    Failure,
}

impl ErrorType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Panic => "panic",
            Self::Timeout => "timeout",
            Self::Failure => "failure",
        }
    }
}

/// The immutable record of one firing.
///
/// Exactly one log is produced per firing, however many attempts the retry loop made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub job_id: JobId,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Wall clock seconds from the first attempt's start to the last attempt's end, truncated.
    pub duration_secs: i64,
    pub output: String,
    pub error: Option<String>,
    pub error_type: Option<ErrorType>,
    pub retries: i32,
}

impl ExecutionLog {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn is_timeout(&self) -> bool {
        self.error_type == Some(ErrorType::Timeout)
    }
}
