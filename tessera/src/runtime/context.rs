use super::scheduler::Runner;
use super::task::Task;
use crate::error::{Error, Result};

use std::cell::RefCell;
use std::rc::Rc;

thread_local! {
    /// The runner driving this thread, for the duration of a run.
    ///
    /// Set when a run starts so that checkpoints, nurseries and producers can
    /// reach the scheduler without explicit parameter passing.
    static CURRENT_RUNNER: RefCell<Option<Rc<Runner>>> = const { RefCell::new(None) };

    /// The task whose step is currently executing.
    static CURRENT_TASK: RefCell<Option<Rc<Task>>> = const { RefCell::new(None) };
}

/// Restores the previous value of a context slot when dropped, so the
/// context is unwound even if the closure panics.
struct Restore<T: 'static> {
    slot: &'static std::thread::LocalKey<RefCell<Option<Rc<T>>>>,
    previous: Option<Rc<T>>,
}

impl<T: 'static> Drop for Restore<T> {
    fn drop(&mut self) {
        let previous = self.previous.take();
        self.slot.with(|cell| *cell.borrow_mut() = previous);
    }
}

fn enter<T: 'static, R>(
    slot: &'static std::thread::LocalKey<RefCell<Option<Rc<T>>>>,
    value: Rc<T>,
    f: impl FnOnce() -> R,
) -> R {
    let previous = slot.with(|cell| cell.replace(Some(value)));
    let _restore = Restore { slot, previous };

    f()
}

/// Enters the runtime execution context for the current thread.
///
/// Installs `runner` as the current runner for the duration of the closure
/// `f`; the previous context is restored afterwards.
pub(crate) fn enter_runner<R>(runner: Rc<Runner>, f: impl FnOnce() -> R) -> R {
    enter(&CURRENT_RUNNER, runner, f)
}

/// Marks `task` as the running task for the duration of `f`.
pub(crate) fn enter_task<R>(task: Rc<Task>, f: impl FnOnce() -> R) -> R {
    enter(&CURRENT_TASK, task, f)
}

pub(crate) fn runner() -> Option<Rc<Runner>> {
    CURRENT_RUNNER.with(|cell| cell.borrow().clone())
}

pub(crate) fn task() -> Option<Rc<Task>> {
    CURRENT_TASK.with(|cell| cell.borrow().clone())
}

pub(crate) fn is_active() -> bool {
    CURRENT_RUNNER.with(|cell| cell.borrow().is_some())
}

/// Runs `f` with the current runner and task.
///
/// # Errors
///
/// Returns [`Error::NoRuntime`] when no task is running on this thread.
pub(crate) fn with_task<R>(f: impl FnOnce(&Runner, &Rc<Task>) -> R) -> Result<R> {
    let runner = runner().ok_or(Error::NoRuntime)?;
    let task = task().ok_or(Error::NoRuntime)?;

    Ok(f(&runner, &task))
}

/// Runs `f` with the current runner.
pub(crate) fn with_runner<R>(f: impl FnOnce(&Runner) -> R) -> Result<R> {
    let runner = runner().ok_or(Error::NoRuntime)?;

    Ok(f(&runner))
}
