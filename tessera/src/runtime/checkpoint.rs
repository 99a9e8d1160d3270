use super::context;
use super::scheduler::Runner;
use super::task::{Suspend, Task};
use crate::error::Result;

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// Shared prologue of every checkpoint future.
///
/// Outside a task the checkpoint fails with `NoRuntime`. A task that is
/// finalizing a producer may not suspend, so the checkpoint stays pending
/// without registering anything and the finalizer reports the defect.
/// Otherwise a pending cancellation wins over whatever `f` would do.
pub(crate) fn poll_checkpoint<T>(
    f: impl FnOnce(&Runner, &Rc<Task>) -> Poll<Result<T>>,
) -> Poll<Result<T>> {
    let polled = context::with_task(|runner, task| {
        if task.is_finalizing() {
            return Poll::Pending;
        }

        if let Some(cancelled) = task.cancelled() {
            return Poll::Ready(Err(cancelled.into()));
        }

        f(runner, task)
    });

    polled.unwrap_or_else(|e| Poll::Ready(Err(e)))
}

/// A future that yields to the scheduler exactly once.
struct Checkpoint {
    yielded: bool,
}

impl Future for Checkpoint {
    type Output = Result<()>;

    /// On the first poll the task goes to the back of the run queue; on the
    /// second it completes. Both polls deliver a pending cancellation.
    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        poll_checkpoint(|_, task| {
            if self.yielded {
                return Poll::Ready(Ok(()));
            }

            self.yielded = true;
            task.suspend(Suspend::Reschedule);
            Poll::Pending
        })
    }
}

/// Checks for cancellation and lets other tasks run.
///
/// # Errors
///
/// Fails with [`Cancelled`](crate::Cancelled) if the task is cancelled, and
/// with [`NoRuntime`](crate::Error::NoRuntime) outside a runtime.
///
/// # Examples
///
/// ```rust,ignore
/// async fn crunch(items: Vec<u64>) -> tessera::Result<u64> {
///     let mut sum = 0;
///     for item in items {
///         sum += item;
///         // Allow other tasks to run, and stop early if cancelled.
///         tessera::checkpoint().await?;
///     }
///     Ok(sum)
/// }
/// ```
pub async fn checkpoint() -> Result<()> {
    Checkpoint { yielded: false }.await
}

/// Fails if the task is cancelled, without yielding otherwise.
pub fn checkpoint_if_cancelled() -> Result<()> {
    match poll_checkpoint(|_, _| Poll::Ready(Ok(()))) {
        Poll::Ready(result) => result,
        Poll::Pending => Ok(()),
    }
}
