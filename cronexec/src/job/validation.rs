//! Checks applied to a job before it is persisted or armed.
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    config::SchedulerConfig,
    notifier,
    schedule::{ScheduleError, Trigger},
};

use super::{ExecKind, Job};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("job name must not be empty")]
    EmptyName,
    #[error("job command must not be empty")]
    EmptyCommand,
    #[error("unsupported HTTP method `{0}`")]
    InvalidMethod(String),
    #[error("invalid schedule: {0}")]
    Schedule(#[from] ScheduleError),
    #[error("a job named `{0}` already exists")]
    DuplicateName(String),
    #[error("unsupported callback method `{0}`, expected GET or POST")]
    InvalidCallbackMethod(String),
    #[error("unsupported callback placeholder `${{{0}}}`")]
    UnsupportedPlaceholder(String),
}

/// Validate `job` and fill in defaults, returning the trigger it should be armed with and its
/// first fire time.
///
/// A one-shot time in the past is rejected unless `allow_past_once` is set and the job is
/// disabled. Only a job that is already disabled in the store may keep such a time, since it will
/// never be armed.
pub(crate) fn validate(
    job: &mut Job,
    config: &SchedulerConfig,
    now: DateTime<Utc>,
    allow_past_once: bool,
) -> Result<(Trigger, Option<DateTime<Utc>>), ValidationError> {
    if job.name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if job.command.trim().is_empty() {
        return Err(ValidationError::EmptyCommand);
    }
    if job.exec_kind == ExecKind::Http {
        let method = job.http_method().to_ascii_uppercase();
        reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| ValidationError::InvalidMethod(job.method.clone()))?;
        job.method = method;
    }
    apply_defaults(job, config);

    if let Some(callback) = job.callback.as_mut() {
        let method = callback.method.trim().to_ascii_uppercase();
        if !matches!(method.as_str(), "" | "GET" | "POST") {
            return Err(ValidationError::InvalidCallbackMethod(
                callback.method.clone(),
            ));
        }
        callback.method = method;
        if let Some(name) = notifier::placeholders(&callback.body_template)
            .find(|name| !notifier::SUPPORTED_PLACEHOLDERS.contains(name))
        {
            return Err(ValidationError::UnsupportedPlaceholder(name.to_owned()));
        }
    }

    let trigger = Trigger::for_job(job)?;
    let next_run_at = match trigger.first_fire_after(now) {
        Ok(next) => Some(next),
        Err(ScheduleError::InPast(_)) if allow_past_once && !job.enabled => None,
        Err(err) => return Err(err.into()),
    };
    job.next_run_at = next_run_at;
    Ok((trigger, next_run_at))
}

/// Replace unset numeric settings with the engine defaults.
pub(crate) fn apply_defaults(job: &mut Job, config: &SchedulerConfig) {
    if job.timeout_secs <= 0 {
        job.timeout_secs = config.default_timeout.as_secs() as i64;
    }
    if job.retry_times < 0 {
        job.retry_times = config.default_retry_times;
    }
    if job.retry_delay_secs < 0 {
        job.retry_delay_secs = config.default_retry_delay.as_secs() as i64;
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;
    use chrono::TimeDelta;

    use super::*;
    use crate::job::{builder::JobBuilder, Callback};

    fn validate_now(job: &mut Job) -> Result<(Trigger, Option<DateTime<Utc>>), ValidationError> {
        validate(job, &SchedulerConfig::default(), Utc::now(), false)
    }

    #[test]
    fn fills_defaults() {
        let mut job = JobBuilder::cron("defaults", "* * * * *")
            .shell("true")
            .build();
        validate_now(&mut job).unwrap();

        assert_eq!(job.timeout_secs, 60);
        assert_eq!(job.retry_times, 3);
        assert_eq!(job.retry_delay_secs, 5);
    }

    #[test]
    fn zero_retries_are_kept() {
        let mut job = JobBuilder::cron("no-retries", "* * * * *")
            .shell("true")
            .with_retries(0, 0)
            .build();
        validate_now(&mut job).unwrap();

        assert_eq!(job.retry_times, 0);
        assert_eq!(job.retry_delay_secs, 0);
    }

    #[test]
    fn once_in_the_future_sets_next_run() {
        let at = Utc::now() + TimeDelta::hours(1);
        let mut job = JobBuilder::once("later", at).shell("true").build();
        let (_, next) = validate_now(&mut job).unwrap();

        assert_eq!(next.map(|n| n.timestamp_millis()), Some(at.timestamp_millis()));
        assert_eq!(job.next_run_at, next);
    }

    #[test]
    fn once_in_the_past_is_rejected() {
        let mut job = JobBuilder::once("late", Utc::now() - TimeDelta::seconds(1))
            .shell("true")
            .build();

        assert_matches!(
            validate_now(&mut job),
            Err(ValidationError::Schedule(ScheduleError::InPast(_)))
        );
    }

    #[test]
    fn disabled_once_in_the_past_is_rejected_for_new_jobs() {
        let mut job = JobBuilder::once("done", Utc::now() - TimeDelta::days(1))
            .shell("true")
            .disabled()
            .build();

        assert_matches!(
            validate_now(&mut job),
            Err(ValidationError::Schedule(ScheduleError::InPast(_)))
        );
    }

    #[test]
    fn disabled_once_in_the_past_may_be_kept() {
        let mut job = JobBuilder::once("done", Utc::now() - TimeDelta::days(1))
            .shell("true")
            .disabled()
            .build();

        let (_, next) = validate(&mut job, &SchedulerConfig::default(), Utc::now(), true).unwrap();
        assert_eq!(next, None);

        let mut job = Job {
            enabled: true,
            ..job
        };
        assert_matches!(
            validate(&mut job, &SchedulerConfig::default(), Utc::now(), true),
            Err(ValidationError::Schedule(ScheduleError::InPast(_)))
        );
    }

    #[test]
    fn bad_cron_is_rejected() {
        let mut job = JobBuilder::cron("bad", "every minute")
            .shell("true")
            .build();

        assert_matches!(
            validate_now(&mut job),
            Err(ValidationError::Schedule(ScheduleError::FieldCount(2)))
        );
    }

    #[test]
    fn empty_fields_are_rejected() {
        let mut job = JobBuilder::cron("", "* * * * *").shell("true").build();
        assert_matches!(validate_now(&mut job), Err(ValidationError::EmptyName));

        let mut job = JobBuilder::cron("no-command", "* * * * *").build();
        assert_matches!(validate_now(&mut job), Err(ValidationError::EmptyCommand));
    }

    #[test]
    fn http_method_is_normalized() {
        let mut job = JobBuilder::cron("http", "* * * * *")
            .http("", "http://localhost")
            .build();
        validate_now(&mut job).unwrap();
        assert_eq!(job.method, "GET");

        let mut job = JobBuilder::cron("http", "* * * * *")
            .http("post", "http://localhost")
            .build();
        validate_now(&mut job).unwrap();
        assert_eq!(job.method, "POST");

        let mut job = JobBuilder::cron("http", "* * * * *")
            .http("NOT A METHOD", "http://localhost")
            .build();
        assert_matches!(validate_now(&mut job), Err(ValidationError::InvalidMethod(_)));
    }

    #[test]
    fn callback_placeholders_are_checked() {
        let callback = |template: &str| Callback {
            url: "http://localhost/hook".to_owned(),
            body_template: template.to_owned(),
            ..Default::default()
        };

        let mut job = JobBuilder::cron("hook", "* * * * *")
            .shell("true")
            .with_callback(callback("task ${task_id} ${status}"))
            .build();
        assert!(validate_now(&mut job).is_ok());

        let mut job = JobBuilder::cron("hook", "* * * * *")
            .shell("true")
            .with_callback(callback("task ${task_id} ${bogus}"))
            .build();
        assert_eq!(
            validate_now(&mut job).unwrap_err(),
            ValidationError::UnsupportedPlaceholder("bogus".to_owned())
        );
    }

    #[test]
    fn callback_method_is_checked() {
        let mut job = JobBuilder::cron("hook", "* * * * *")
            .shell("true")
            .with_callback(Callback {
                url: "http://localhost/hook".to_owned(),
                method: "PUT".to_owned(),
                ..Default::default()
            })
            .build();

        assert_matches!(
            validate_now(&mut job),
            Err(ValidationError::InvalidCallbackMethod(method)) if method == "PUT"
        );
    }
}
