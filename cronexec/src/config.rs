use std::time::Duration;

use serde::Deserialize;

/// Engine wide defaults.
///
/// Job settings left non-positive when a job is added fall back to the values held here.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub default_timeout: Duration,
    pub default_retry_times: i32,
    pub default_retry_delay: Duration,
    /// Delivery deadline for completion callbacks, independent of the job's own timeout.
    pub callback_timeout: Duration,
    pub shell: ShellConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(60),
            default_retry_times: 3,
            default_retry_delay: Duration::from_secs(5),
            callback_timeout: Duration::from_secs(10),
            shell: ShellConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_default_timeout(self, default_timeout: Duration) -> Self {
        Self {
            default_timeout,
            ..self
        }
    }

    pub fn with_default_retries(self, retry_times: i32, retry_delay: Duration) -> Self {
        Self {
            default_retry_times: retry_times,
            default_retry_delay: retry_delay,
            ..self
        }
    }

    pub fn with_callback_timeout(self, callback_timeout: Duration) -> Self {
        Self {
            callback_timeout,
            ..self
        }
    }

    pub fn with_shell(self, shell: ShellConfig) -> Self {
        Self { shell, ..self }
    }
}

/// The command interpreter shell jobs are run through, as `<program> <flag> <command>`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShellConfig {
    pub program: String,
    pub flag: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        if cfg!(windows) {
            Self {
                program: "cmd".to_owned(),
                flag: "/C".to_owned(),
            }
        } else {
            Self {
                program: "sh".to_owned(),
                flag: "-c".to_owned(),
            }
        }
    }
}
