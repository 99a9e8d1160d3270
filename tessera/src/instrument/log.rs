//! # LogInstrument: scheduler transitions as `tracing` events
//!
//! Task lifecycle hooks are logged at `debug`, per-step and I/O wait hooks at
//! `trace`. Example output with a `fmt` subscriber:
//!
//! ```text
//! DEBUG tessera::instrument::log: task spawned task=task#2 name="worker" parent=Some(TaskId(1))
//! TRACE tessera::instrument::log: before task step task=task#2
//! TRACE tessera::instrument::log: before io wait timeout=Some(0ns)
//! DEBUG tessera::instrument::log: task exited task=task#2 outcome="failed" error=connection refused
//! ```

use super::{Instrument, Outcome, TaskInfo};

use std::time::Duration;

/// Instrument forwarding every hook to `tracing`.
#[derive(Debug, Default)]
pub struct LogInstrument;

impl LogInstrument {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[crate::instrument]
impl Instrument for LogInstrument {
    fn before_run(&self) {
        tracing::debug!("run started");
    }

    fn after_run(&self) {
        tracing::debug!("run finished");
    }

    fn task_spawned(&self, task: &TaskInfo) {
        tracing::debug!(task = %task.id(), name = task.name(), parent = ?task.parent(), "task spawned");
    }

    fn task_scheduled(&self, task: &TaskInfo) {
        tracing::trace!(task = %task.id(), "task scheduled");
    }

    fn before_task_step(&self, task: &TaskInfo) {
        tracing::trace!(task = %task.id(), "before task step");
    }

    fn after_task_step(&self, task: &TaskInfo) {
        tracing::trace!(task = %task.id(), "after task step");
    }

    fn task_exited(&self, task: &TaskInfo, outcome: Outcome<'_>) {
        match outcome {
            Outcome::Failed(error) => {
                tracing::debug!(task = %task.id(), outcome = outcome.as_label(), error = %error, "task exited");
            }
            Outcome::Cancelled(cancelled) => {
                tracing::debug!(task = %task.id(), outcome = outcome.as_label(), scope = %cancelled.scope(), "task exited");
            }
            Outcome::Completed => {
                tracing::debug!(task = %task.id(), outcome = outcome.as_label(), "task exited");
            }
        }
    }

    fn before_io_wait(&self, timeout: Option<Duration>) {
        tracing::trace!(?timeout, "before io wait");
    }

    fn after_io_wait(&self, timeout: Option<Duration>) {
        tracing::trace!(?timeout, "after io wait");
    }
}
