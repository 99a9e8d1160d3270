use crate::error::Result;
use crate::runtime::checkpoint::poll_checkpoint;
use crate::runtime::context;
use crate::runtime::task::Suspend;

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Returns the current time of the runtime's clock.
///
/// # Errors
///
/// [`Error::NoRuntime`](crate::Error::NoRuntime) outside a runtime.
pub fn current_time() -> Result<Instant> {
    context::with_runner(|runner| runner.now())
}

/// Sleeps for `duration`.
///
/// Always a checkpoint, even for a zero duration. A duration too long to
/// be represented as a deadline sleeps until cancelled.
///
/// # Errors
///
/// Fails with [`Cancelled`](crate::Cancelled) if the task is cancelled
/// before or while sleeping.
///
/// # Examples
///
/// ```rust,ignore
/// use std::time::Duration;
///
/// tessera::sleep(Duration::from_millis(10)).await?;
/// ```
pub async fn sleep(duration: Duration) -> Result<()> {
    Sleep {
        deadline: current_time()?.checked_add(duration),
        armed: false,
    }
    .await
}

/// Sleeps until the runtime's clock reaches `deadline`.
pub async fn sleep_until(deadline: Instant) -> Result<()> {
    Sleep {
        deadline: Some(deadline),
        armed: false,
    }
    .await
}

/// Sleeps until cancelled.
///
/// Only ever returns an error, so `sleep_forever().await?` unwinds the task.
pub async fn sleep_forever() -> Result<Infallible> {
    loop {
        Sleep {
            deadline: None,
            armed: false,
        }
        .await?;
    }
}

/// A checkpoint that completes once a deadline is reached.
///
/// Without a deadline the task parks and only a cancellation ends the wait.
struct Sleep {
    deadline: Option<Instant>,
    armed: bool,
}

impl Future for Sleep {
    type Output = Result<()>;

    /// On the first poll a pending cancellation fails the sleep; otherwise
    /// the task is parked on the timer heap, or just rescheduled if the
    /// deadline already passed. Later polls check cancellation first and
    /// then whether the deadline was reached.
    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        poll_checkpoint(|runner, task| {
            let now = runner.now();

            if self.armed {
                return match self.deadline {
                    Some(deadline) if now >= deadline => Poll::Ready(Ok(())),
                    Some(deadline) => {
                        task.suspend(Suspend::SleepUntil(deadline));
                        Poll::Pending
                    }
                    None => Poll::Pending,
                };
            }

            self.armed = true;
            match self.deadline {
                Some(deadline) if deadline <= now => task.suspend(Suspend::Reschedule),
                Some(deadline) => task.suspend(Suspend::SleepUntil(deadline)),
                None => {}
            }
            Poll::Pending
        })
    }
}
