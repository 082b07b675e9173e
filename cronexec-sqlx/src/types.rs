use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use cronexec::{
    job::{Callback, ExecutionLog},
    stats::JobStats,
};
use sqlx::{prelude::FromRow, types::Json};

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "cronexec_schedule_kind", rename_all = "lowercase")]
pub(crate) enum ScheduleKind {
    Once,
    Cron,
}

impl From<ScheduleKind> for cronexec::job::ScheduleKind {
    fn from(value: ScheduleKind) -> Self {
        match value {
            ScheduleKind::Once => Self::Once,
            ScheduleKind::Cron => Self::Cron,
        }
    }
}

impl From<cronexec::job::ScheduleKind> for ScheduleKind {
    fn from(value: cronexec::job::ScheduleKind) -> Self {
        match value {
            cronexec::job::ScheduleKind::Once => Self::Once,
            cronexec::job::ScheduleKind::Cron => Self::Cron,
        }
    }
}

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "cronexec_exec_kind", rename_all = "lowercase")]
pub(crate) enum ExecKind {
    Shell,
    Http,
}

impl From<ExecKind> for cronexec::job::ExecKind {
    fn from(value: ExecKind) -> Self {
        match value {
            ExecKind::Shell => Self::Shell,
            ExecKind::Http => Self::Http,
        }
    }
}

impl From<cronexec::job::ExecKind> for ExecKind {
    fn from(value: cronexec::job::ExecKind) -> Self {
        match value {
            cronexec::job::ExecKind::Shell => Self::Shell,
            cronexec::job::ExecKind::Http => Self::Http,
        }
    }
}

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "cronexec_run_status", rename_all = "lowercase")]
pub(crate) enum RunStatus {
    Success,
    Failure,
}

impl From<RunStatus> for cronexec::job::RunStatus {
    fn from(value: RunStatus) -> Self {
        match value {
            RunStatus::Success => Self::Success,
            RunStatus::Failure => Self::Failure,
        }
    }
}

impl From<cronexec::job::RunStatus> for RunStatus {
    fn from(value: cronexec::job::RunStatus) -> Self {
        match value {
            cronexec::job::RunStatus::Success => Self::Success,
            cronexec::job::RunStatus::Failure => Self::Failure,
        }
    }
}

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "cronexec_error_type", rename_all = "lowercase")]
pub(crate) enum ErrorType {
    Panic,
    Timeout,
    Failure,
}

impl From<ErrorType> for cronexec::job::ErrorType {
    fn from(value: ErrorType) -> Self {
        match value {
            ErrorType::Panic => Self::Panic,
            ErrorType::Timeout => Self::Timeout,
            ErrorType::Failure => Self::Failure,
        }
    }
}

impl From<cronexec::job::ErrorType> for ErrorType {
    fn from(value: cronexec::job::ErrorType) -> Self {
        match value {
            cronexec::job::ErrorType::Panic => Self::Panic,
            cronexec::job::ErrorType::Timeout => Self::Timeout,
            cronexec::job::ErrorType::Failure => Self::Failure,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct Job {
    pub id: i32,
    pub name: String,
    pub schedule_kind: ScheduleKind,
    pub spec: String,
    pub exec_kind: ExecKind,
    pub command: String,
    pub method: String,
    pub headers: Json<BTreeMap<String, String>>,
    pub body: Option<String>,
    pub enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub timeout_secs: i64,
    pub retry_times: i32,
    pub retry_delay_secs: i64,
    pub description: String,
    pub callback: Option<Json<Callback>>,
    pub inserted_at: DateTime<Utc>,
}

impl From<Job> for cronexec::job::Job {
    fn from(value: Job) -> Self {
        Self {
            id: value.id.into(),
            name: value.name,
            schedule_kind: value.schedule_kind.into(),
            spec: value.spec,
            exec_kind: value.exec_kind.into(),
            command: value.command,
            method: value.method,
            headers: value.headers.0,
            body: value.body,
            enabled: value.enabled,
            last_run_at: value.last_run_at,
            next_run_at: value.next_run_at,
            timeout_secs: value.timeout_secs,
            retry_times: value.retry_times,
            retry_delay_secs: value.retry_delay_secs,
            description: value.description,
            callback: value.callback.map(|callback| callback.0),
            inserted_at: value.inserted_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct Log {
    pub job_id: i32,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: i64,
    pub output: String,
    pub error: Option<String>,
    pub error_type: Option<ErrorType>,
    pub retries: i32,
}

impl From<Log> for ExecutionLog {
    fn from(value: Log) -> Self {
        Self {
            job_id: value.job_id.into(),
            status: value.status.into(),
            started_at: value.started_at,
            ended_at: value.ended_at,
            duration_secs: value.duration_secs,
            output: value.output,
            error: value.error,
            error_type: value.error_type.map(From::from),
            retries: value.retries,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct Stats {
    pub job_id: i32,
    pub total_runs: i64,
    pub success_runs: i64,
    pub failed_runs: i64,
    pub timeout_runs: i64,
    pub total_duration_secs: i64,
    pub avg_duration_secs: f64,
    pub retry_count: i64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<Stats> for JobStats {
    fn from(value: Stats) -> Self {
        Self {
            job_id: value.job_id.into(),
            total_runs: value.total_runs,
            success_runs: value.success_runs,
            failed_runs: value.failed_runs,
            timeout_runs: value.timeout_runs,
            total_duration_secs: value.total_duration_secs,
            avg_duration_secs: value.avg_duration_secs,
            retry_count: value.retry_count,
            last_success_at: value.last_success_at,
            last_failure_at: value.last_failure_at,
            last_error: value.last_error,
            updated_at: value.updated_at,
        }
    }
}
