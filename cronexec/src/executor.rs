//! Execution strategies: how a single attempt of a job is carried out.
//!
//! The strategy is selected by the job's [`ExecKind`]. Hosts can substitute their own strategy
//! for either kind via [`crate::Scheduler::with_executors`].
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    config::SchedulerConfig,
    job::{ErrorType, ExecKind, Job},
};

pub mod http;
pub mod shell;

pub use http::HttpExecutor;
pub use shell::ShellExecutor;

/// One attempt of a job.
///
/// The caller bounds every call with the job's timeout and drops the future when the deadline
/// elapses, so implementations must release their resources on drop.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run the job once, returning its captured output.
    async fn execute(&self, job: &Job) -> Result<String, ExecutionError>;
}

/// Why an attempt did not succeed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("job failed to complete within timeout of {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("{message}")]
    Failed { message: String, output: String },
    #[error("job panicked: {0}")]
    Panicked(String),
}

impl ExecutionError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            output: String::new(),
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::Timeout(_) => ErrorType::Timeout,
            Self::Failed { .. } => ErrorType::Failure,
            Self::Panicked(_) => ErrorType::Panic,
        }
    }

    /// Output captured before the attempt failed, if any.
    pub fn output(&self) -> &str {
        match self {
            Self::Failed { output, .. } => output,
            _ => "",
        }
    }
}

/// The strategies used for each [`ExecKind`].
#[derive(Clone)]
pub struct Executors {
    shell: Arc<dyn Executor>,
    http: Arc<dyn Executor>,
}

impl Default for Executors {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

impl std::fmt::Debug for Executors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executors").finish_non_exhaustive()
    }
}

impl Executors {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            shell: Arc::new(ShellExecutor::new(&config.shell)),
            http: Arc::new(HttpExecutor::default()),
        }
    }

    pub fn with_shell(self, shell: impl Executor + 'static) -> Self {
        Self {
            shell: Arc::new(shell),
            ..self
        }
    }

    pub fn with_http(self, http: impl Executor + 'static) -> Self {
        Self {
            http: Arc::new(http),
            ..self
        }
    }

    pub fn for_kind(&self, kind: ExecKind) -> Arc<dyn Executor> {
        match kind {
            ExecKind::Shell => self.shell.clone(),
            ExecKind::Http => self.http.clone(),
        }
    }
}
