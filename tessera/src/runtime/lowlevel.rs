//! Low-level access to the running scheduler.
//!
//! These functions are meant for instrumentation, tests and libraries built
//! on top of the runtime. All of them fail with
//! [`Error::NoRuntime`](crate::Error::NoRuntime) outside a running task.

use super::checkpoint::poll_checkpoint;
use super::context;
use super::task::{Suspend, TaskInfo};
use crate::error::Result;
use crate::instrument::Instrument;

pub use crate::time::current_time;

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// Snapshot of the scheduler's state.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStatistics {
    /// Tasks that have not exited yet.
    pub tasks_living: usize,

    /// Tasks in the run queue.
    pub tasks_runnable: usize,

    /// Seconds until the earliest timer or scope deadline; infinite if none.
    pub seconds_to_next_deadline: f64,

    /// Installed instruments.
    pub instruments: usize,

    /// Producers that misbehaved while being finalized at task exit.
    pub finalization_defects: u64,
}

/// Describes the task calling this function.
pub fn current_task() -> Result<TaskInfo> {
    context::with_task(|_, task| task.info().clone())
}

/// Returns a snapshot of the scheduler's state.
pub fn current_statistics() -> Result<RunStatistics> {
    context::with_runner(|runner| runner.statistics())
}

/// Installs an instrument for the rest of the run.
///
/// Installing the same handle twice has no effect.
pub fn add_instrument(instrument: Rc<dyn Instrument>) -> Result<()> {
    context::with_runner(|runner| runner.instruments().add(instrument))
}

/// Uninstalls an instrument.
///
/// # Errors
///
/// [`Error::UnknownInstrument`](crate::Error::UnknownInstrument) if the
/// handle is not installed.
pub fn remove_instrument(instrument: &Rc<dyn Instrument>) -> Result<()> {
    context::with_runner(|runner| runner.instruments().remove(instrument))?
}

/// Waits until every other task is blocked.
///
/// "Blocked" means nothing is runnable and no I/O is ready right now; tasks
/// sleeping on timers count as blocked. An autojumping clock does not jump
/// while a task waits here.
///
/// # Examples
///
/// ```rust,ignore
/// tessera::open_nursery(|nursery| async move {
///     nursery.spawn(worker())?;
///     tessera::lowlevel::wait_all_tasks_blocked().await?;
///     // `worker` is now parked at its first blocking call.
///     Ok(())
/// })
/// .await?;
/// ```
pub async fn wait_all_tasks_blocked() -> Result<()> {
    WaitIdle { armed: false }.await
}

struct WaitIdle {
    armed: bool,
}

impl Future for WaitIdle {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        poll_checkpoint(|_, task| {
            if self.armed {
                return Poll::Ready(Ok(()));
            }

            self.armed = true;
            task.suspend(Suspend::WaitIdle);
            Poll::Pending
        })
    }
}
