use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::{config::ShellConfig, job::Job};

use super::{ExecutionError, Executor};

/// Runs [`Job::command`] through the system command interpreter.
///
/// The result text is stdout followed by stderr. On unix the child leads its own process group,
/// and the whole group is killed when the attempt is dropped at its deadline, so pipelines and
/// subshells do not outlive the attempt.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    program: String,
    flag: String,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new(&ShellConfig::default())
    }
}

impl ShellExecutor {
    pub fn new(config: &ShellConfig) -> Self {
        Self {
            program: config.program.clone(),
            flag: config.flag.clone(),
        }
    }
}

#[async_trait]
impl Executor for ShellExecutor {
    async fn execute(&self, job: &Job) -> Result<String, ExecutionError> {
        let mut command = Command::new(&self.program);
        command
            .arg(&self.flag)
            .arg(&job.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|err| {
            ExecutionError::failed(format!("failed to spawn `{}`: {err}", self.program))
        })?;
        let group = ProcessGroupGuard::new(&child);
        let output = child.wait_with_output().await.map_err(|err| {
            ExecutionError::failed(format!("failed to wait for `{}`: {err}", self.program))
        })?;
        group.disarm();

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(combined)
        } else {
            Err(ExecutionError::Failed {
                message: format!("command failed with {}", output.status),
                output: combined,
            })
        }
    }
}

/// Kills the child's process group unless disarmed once the child has exited.
#[cfg_attr(not(unix), allow(dead_code))]
struct ProcessGroupGuard {
    pgid: Option<i32>,
}

impl ProcessGroupGuard {
    fn new(child: &Child) -> Self {
        Self {
            pgid: child.id().and_then(|id| i32::try_from(id).ok()),
        }
    }

    fn disarm(mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid.take() {
            use nix::{
                sys::signal::{killpg, Signal},
                unistd::Pid,
            };

            if let Err(err) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                tracing::debug!(?err, pgid, "Failed to kill process group {pgid}: {err}");
            }
        }
    }
}
