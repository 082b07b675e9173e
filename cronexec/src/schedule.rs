//! Parsing of job schedules into [`Trigger`]s.
//!
//! Cron expressions are accepted in two shapes:
//!
//! - 5 fields, crontab style: `minute hour day-of-month month day-of-week`, and
//! - 6 fields, with a leading seconds field: `second minute hour day-of-month month day-of-week`.
//!
//! Numeric days of the week follow crontab numbering in both shapes: `0` (or `7`) is Sunday
//! through `6` for Saturday. Names (`MON-FRI`) are accepted as well.
//!
//! ```
//! use cronexec::schedule::CronSchedule;
//! use chrono::{TimeZone, Utc};
//!
//! let weekdays: CronSchedule = "0 9 * * 1-5".parse().unwrap();
//! let saturday = Utc.with_ymd_and_hms(2026, 2, 21, 12, 0, 0).unwrap();
//!
//! assert_eq!(
//!     weekdays.next_after(saturday),
//!     Some(Utc.with_ymd_and_hms(2026, 2, 23, 9, 0, 0).unwrap())
//! );
//! ```
use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::job::{Job, ScheduleKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("cron expression must have 5 or 6 fields, found {0}")]
    FieldCount(usize),
    #[error("invalid cron expression `{expression}`: {reason}")]
    InvalidCron { expression: String, reason: String },
    #[error("cron expression `{0}` has no upcoming fire time")]
    NoUpcoming(String),
    #[error("invalid execution time `{spec}`: {reason}")]
    InvalidTimestamp { spec: String, reason: String },
    #[error("execution time {0} has already passed")]
    InPast(DateTime<Utc>),
}

/// A parsed cron expression.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: cron::Schedule,
}

impl CronSchedule {
    /// The first fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl FromStr for CronSchedule {
    type Err = ScheduleError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let mut fields: Vec<String> = expression
            .split_whitespace()
            .map(ToOwned::to_owned)
            .collect();
        match fields.len() {
            5 => fields.insert(0, "0".to_owned()),
            6 => {}
            n => return Err(ScheduleError::FieldCount(n)),
        }
        fields[5] = crontab_day_of_week(&fields[5]);

        let schedule = cron::Schedule::from_str(&fields.join(" ")).map_err(|err| {
            ScheduleError::InvalidCron {
                expression: expression.to_owned(),
                reason: err.to_string(),
            }
        })?;
        Ok(Self {
            expression: expression.trim().to_owned(),
            schedule,
        })
    }
}

/// Shift crontab day-of-week numbers (Sunday = 0 or 7) onto the cron crate's numbering
/// (Sunday = 1). Step values after `/` are counts and stay as they are.
fn crontab_day_of_week(field: &str) -> String {
    fn flush(out: &mut String, digits: &mut String, is_step: bool) {
        if digits.is_empty() {
            return;
        }
        match digits.parse::<u32>() {
            Ok(day) if !is_step => out.push_str(&(day % 7 + 1).to_string()),
            _ => out.push_str(digits),
        }
        digits.clear();
    }

    let mut out = String::with_capacity(field.len());
    let mut digits = String::new();
    let mut is_step = false;
    for c in field.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        flush(&mut out, &mut digits, is_step);
        is_step = c == '/';
        out.push(c);
    }
    flush(&mut out, &mut digits, is_step);
    out
}

/// Parse the absolute execution time of a [`ScheduleKind::Once`] job.
pub fn parse_once(spec: &str) -> Result<DateTime<Utc>, ScheduleError> {
    DateTime::parse_from_rfc3339(spec.trim())
        .map(|at| at.with_timezone(&Utc))
        .map_err(|err| ScheduleError::InvalidTimestamp {
            spec: spec.to_owned(),
            reason: err.to_string(),
        })
}

/// The scheduling primitive deciding when a job fires.
#[derive(Debug, Clone)]
pub enum Trigger {
    Cron(CronSchedule),
    Once(DateTime<Utc>),
}

impl Trigger {
    pub fn for_job(job: &Job) -> Result<Self, ScheduleError> {
        match job.schedule_kind {
            ScheduleKind::Once => parse_once(&job.spec).map(Self::Once),
            ScheduleKind::Cron => job.spec.parse().map(Self::Cron),
        }
    }

    /// When the trigger fires first if armed at `now`.
    pub fn first_fire_after(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        match self {
            Self::Once(at) if *at <= now => Err(ScheduleError::InPast(*at)),
            Self::Once(at) => Ok(*at),
            Self::Cron(schedule) => schedule
                .next_after(now)
                .ok_or_else(|| ScheduleError::NoUpcoming(schedule.expression.clone())),
        }
    }

    /// The fire time following one scheduled at `scheduled_at`; one-shot triggers never re-arm.
    pub fn next_after_fire(&self, scheduled_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Once(_) => None,
            Self::Cron(schedule) => schedule.next_after(scheduled_at),
        }
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;
    use chrono::{TimeDelta, TimeZone, Timelike};

    use super::*;

    #[test]
    fn five_fields_fire_on_the_minute() {
        let schedule: CronSchedule = "*/15 * * * *".parse().unwrap();
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 2, 30).unwrap();

        let next = schedule.next_after(after).unwrap();
        assert_eq!((next.hour(), next.minute(), next.second()), (10, 15, 0));
    }

    #[test]
    fn six_fields_have_seconds() {
        let schedule: CronSchedule = "*/10 * * * * *".parse().unwrap();
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 2, 31).unwrap();

        assert_eq!(
            schedule.next_after(after),
            Some(Utc.with_ymd_and_hms(2026, 2, 22, 10, 2, 40).unwrap())
        );
    }

    #[test]
    fn sunday_is_zero() {
        let schedule: CronSchedule = "0 8 * * 0".parse().unwrap();
        // Monday
        let after = Utc.with_ymd_and_hms(2026, 2, 23, 0, 0, 0).unwrap();

        assert_eq!(
            schedule.next_after(after),
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn day_of_week_translation() {
        assert_eq!(crontab_day_of_week("*"), "*");
        assert_eq!(crontab_day_of_week("0"), "1");
        assert_eq!(crontab_day_of_week("7"), "1");
        assert_eq!(crontab_day_of_week("1-5"), "2-6");
        assert_eq!(crontab_day_of_week("1,3,5"), "2,4,6");
        assert_eq!(crontab_day_of_week("*/2"), "*/2");
        assert_eq!(crontab_day_of_week("1-5/2"), "2-6/2");
        assert_eq!(crontab_day_of_week("MON-FRI"), "MON-FRI");
    }

    #[test]
    fn rejects_wrong_field_counts() {
        assert_matches!(
            "* * * *".parse::<CronSchedule>(),
            Err(ScheduleError::FieldCount(4))
        );
        assert_matches!(
            "0 0 0 * * * 2030".parse::<CronSchedule>(),
            Err(ScheduleError::FieldCount(7))
        );
        assert_matches!("".parse::<CronSchedule>(), Err(ScheduleError::FieldCount(0)));
    }

    #[test]
    fn rejects_garbage() {
        assert_matches!(
            "61 * * * *".parse::<CronSchedule>(),
            Err(ScheduleError::InvalidCron { .. })
        );
        assert_matches!(
            "a b c d e".parse::<CronSchedule>(),
            Err(ScheduleError::InvalidCron { .. })
        );
    }

    #[test]
    fn once_trigger() {
        let now = Utc::now();
        let at = now + TimeDelta::minutes(1);
        let trigger = Trigger::Once(at);

        assert_eq!(trigger.first_fire_after(now), Ok(at));
        assert_eq!(trigger.next_after_fire(at), None);
        assert_matches!(
            trigger.first_fire_after(at + TimeDelta::seconds(1)),
            Err(ScheduleError::InPast(_))
        );
    }

    #[test]
    fn cron_trigger_advances_from_scheduled_time() {
        let trigger = Trigger::Cron("0 * * * *".parse().unwrap());
        let scheduled_at = Utc.with_ymd_and_hms(2026, 2, 22, 10, 0, 0).unwrap();

        assert_eq!(
            trigger.next_after_fire(scheduled_at),
            Some(Utc.with_ymd_and_hms(2026, 2, 22, 11, 0, 0).unwrap())
        );
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        let at = parse_once("2030-01-01T08:00:00+08:00").unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
        assert_matches!(
            parse_once("tomorrow"),
            Err(ScheduleError::InvalidTimestamp { .. })
        );
    }
}
