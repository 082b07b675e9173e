use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};

use super::{Callback, ExecKind, Job, ScheduleKind};

/// Builder for [`Job`] values to hand to [`crate::Scheduler::add_job`].
///
/// Numeric settings left untouched are sent as non-positive and replaced by the
/// [`crate::config::SchedulerConfig`] defaults when the job is added.
///
/// # Example
///
/// ```
/// use cronexec::job::builder::JobBuilder;
///
/// let job = JobBuilder::cron("nightly-backup", "0 3 * * *")
///     .shell("pg_dump app > /tmp/app.sql")
///     .with_timeout_secs(600)
///     .with_retries(2, 30)
///     .build();
///
/// assert_eq!(job.name, "nightly-backup");
/// assert_eq!(job.retry_times, 2);
/// ```
#[derive(Debug, Clone)]
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    fn new(name: impl Into<String>, schedule_kind: ScheduleKind, spec: String) -> Self {
        Self {
            job: Job {
                id: Default::default(),
                name: name.into(),
                schedule_kind,
                spec,
                exec_kind: ExecKind::Shell,
                command: String::new(),
                method: String::new(),
                headers: BTreeMap::new(),
                body: None,
                enabled: true,
                last_run_at: None,
                next_run_at: None,
                timeout_secs: 0,
                retry_times: -1,
                retry_delay_secs: -1,
                description: String::new(),
                callback: None,
                inserted_at: Utc::now(),
            },
        }
    }

    /// A recurring job following the given cron expression.
    pub fn cron(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::new(name, ScheduleKind::Cron, expression.into())
    }

    /// A one-shot job firing at `at`.
    pub fn once(name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::new(
            name,
            ScheduleKind::Once,
            at.to_rfc3339_opts(SecondsFormat::Millis, true),
        )
    }

    pub fn shell(self, command: impl Into<String>) -> Self {
        Self {
            job: Job {
                exec_kind: ExecKind::Shell,
                command: command.into(),
                ..self.job
            },
        }
    }

    pub fn http(self, method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            job: Job {
                exec_kind: ExecKind::Http,
                method: method.into(),
                command: url.into(),
                ..self.job
            },
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.job.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_body(self, body: impl Into<String>) -> Self {
        Self {
            job: Job {
                body: Some(body.into()),
                ..self.job
            },
        }
    }

    pub fn with_timeout_secs(self, timeout_secs: i64) -> Self {
        Self {
            job: Job {
                timeout_secs,
                ..self.job
            },
        }
    }

    pub fn with_retries(self, retry_times: i32, retry_delay_secs: i64) -> Self {
        Self {
            job: Job {
                retry_times,
                retry_delay_secs,
                ..self.job
            },
        }
    }

    pub fn with_description(self, description: impl Into<String>) -> Self {
        Self {
            job: Job {
                description: description.into(),
                ..self.job
            },
        }
    }

    pub fn with_callback(self, callback: Callback) -> Self {
        Self {
            job: Job {
                callback: Some(callback),
                ..self.job
            },
        }
    }

    pub fn disabled(self) -> Self {
        Self {
            job: Job {
                enabled: false,
                ..self.job
            },
        }
    }

    pub fn build(self) -> Job {
        self.job
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn once_formats_rfc3339() {
        let at = Utc::now() + TimeDelta::minutes(5);
        let job = JobBuilder::once("once", at).shell("true").build();

        let parsed = DateTime::parse_from_rfc3339(&job.spec).unwrap();
        assert_eq!(job.schedule_kind, ScheduleKind::Once);
        assert_eq!(parsed.timestamp_millis(), at.timestamp_millis());
    }

    #[test]
    fn http_job() {
        let job = JobBuilder::cron("ping", "*/10 * * * * *")
            .http("POST", "http://localhost/ping")
            .with_header("X-Token", "abc")
            .with_body("{}")
            .build();

        assert_eq!(job.exec_kind, ExecKind::Http);
        assert_eq!(job.command, "http://localhost/ping");
        assert_eq!(job.method, "POST");
        assert_eq!(job.headers.get("X-Token").map(String::as_str), Some("abc"));
        assert_eq!(job.body.as_deref(), Some("{}"));
    }

    #[test]
    fn unset_numbers_fall_through_to_defaults() {
        let job = JobBuilder::cron("defaults", "* * * * *").shell("true").build();

        assert!(job.timeout_secs <= 0);
        assert!(job.retry_times < 0);
        assert!(job.retry_delay_secs < 0);
        assert!(job.enabled);
    }
}
