//! Instrumentation hooks.
//!
//! An [`Instrument`] observes scheduler transitions: runs starting and
//! ending, tasks being spawned, scheduled, stepped and exiting, and the
//! scheduler blocking for I/O. Every method has a no-op default, so an
//! instrument implements only the hooks it cares about.
//!
//! The registry keeps, for every [`Hook`], the list of installed instruments
//! that implement it. Firing a hook nobody listens to costs one emptiness
//! check. For the registry to know which hooks an implementation overrides,
//! annotate the `impl` block with `#[tessera::instrument]`:
//!
//! ```rust,ignore
//! use tessera::instrument::{Instrument, TaskInfo};
//!
//! struct SpawnCounter(std::cell::Cell<usize>);
//!
//! #[tessera::instrument]
//! impl Instrument for SpawnCounter {
//!     fn task_spawned(&self, _task: &TaskInfo) {
//!         self.0.set(self.0.get() + 1);
//!     }
//! }
//! ```
//!
//! Without the attribute, [`Instrument::hooks`] defaults to every hook.
//!
//! A panicking instrument is logged and uninstalled; the scheduler and the
//! other instruments carry on.

mod hook;
mod log;

pub(crate) mod registry;

pub use crate::runtime::task::{TaskId, TaskInfo};
pub use hook::{Hook, HookSet};
pub use log::LogInstrument;

use crate::error::{Cancelled, Error, Result};

use std::time::Duration;

/// How a task ended, as reported to [`Instrument::task_exited`].
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    /// The task returned `Ok(())`.
    Completed,
    /// The task unwound because of a cancellation.
    Cancelled(Cancelled),
    /// The task failed.
    Failed(&'a Error),
}

impl<'a> Outcome<'a> {
    pub(crate) fn of(result: &'a Result<()>) -> Self {
        match result {
            Ok(()) => Outcome::Completed,
            Err(Error::Cancelled(cancelled)) => Outcome::Cancelled(*cancelled),
            Err(error) => Outcome::Failed(error),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Cancelled(_) => "cancelled",
            Outcome::Failed(_) => "failed",
        }
    }
}

/// Observer of scheduler transitions.
///
/// All methods run on the scheduler thread, synchronously, in the order the
/// transitions happen. They must not block.
#[allow(unused_variables)]
pub trait Instrument {
    /// The hooks this instrument implements.
    ///
    /// Read once when the instrument is installed. Generated by
    /// `#[tessera::instrument]`; the default subscribes to everything, so a
    /// hand-written impl is called for every hook, including the ones it
    /// leaves as no-ops. Annotate the impl block, or override this method,
    /// to keep unused hooks free.
    fn hooks(&self) -> HookSet {
        HookSet::ALL
    }

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn before_run(&self) {}

    fn after_run(&self) {}

    fn task_spawned(&self, task: &TaskInfo) {}

    fn task_scheduled(&self, task: &TaskInfo) {}

    fn before_task_step(&self, task: &TaskInfo) {}

    fn after_task_step(&self, task: &TaskInfo) {}

    fn task_exited(&self, task: &TaskInfo, outcome: Outcome<'_>) {}

    /// `timeout` is the longest the scheduler may block; `None` is unbounded.
    fn before_io_wait(&self, timeout: Option<Duration>) {}

    fn after_io_wait(&self, timeout: Option<Duration>) {}
}
