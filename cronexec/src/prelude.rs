//! The purpose of this module is to alleviate the need to import many of the `[cronexec]` types.
//!
//! ```
//! # #![allow(unused_imports)]
//! use cronexec::prelude::*;
//! ```
pub use crate::config::{SchedulerConfig, ShellConfig};
pub use crate::executor::{ExecutionError, Executor, Executors};
pub use crate::job::builder::JobBuilder;
pub use crate::job::{Callback, ExecKind, ExecutionLog, Job, JobId, RunStatus, ScheduleKind};
pub use crate::stats::JobStats;
pub use crate::store::{memory::InMemoryStore, JobStore};
pub use crate::{Scheduler, SchedulerError};
