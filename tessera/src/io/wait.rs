use super::{Interest, RawFd};
use crate::error::{Error, Result};
use crate::runtime::checkpoint::poll_checkpoint;
use crate::runtime::task::Suspend;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Waits until `fd` is readable.
///
/// The descriptor should be in non-blocking mode. Readiness is a hint: the
/// caller retries its operation and waits again on `WouldBlock`.
///
/// # Errors
///
/// - [`Cancelled`](crate::Cancelled) if the task is cancelled while waiting.
/// - [`Error::BusyResource`] if another task already waits for the same fd to
///   become readable.
pub async fn wait_readable(fd: RawFd) -> Result<()> {
    WaitIo::new(fd, Interest::Readable).await
}

/// Waits until `fd` is writable. See [`wait_readable`].
pub async fn wait_writable(fd: RawFd) -> Result<()> {
    WaitIo::new(fd, Interest::Writable).await
}

struct WaitIo {
    fd: RawFd,
    interest: Interest,
    armed: bool,
}

impl WaitIo {
    fn new(fd: RawFd, interest: Interest) -> Self {
        Self {
            fd,
            interest,
            armed: false,
        }
    }
}

impl Future for WaitIo {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        poll_checkpoint(|runner, task| {
            if self.armed {
                return Poll::Ready(Ok(()));
            }

            if runner
                .io_waiter(self.fd, self.interest)
                .is_some_and(|owner| owner != task.id())
            {
                return Poll::Ready(Err(Error::BusyResource { fd: self.fd }));
            }

            self.armed = true;
            task.suspend(Suspend::WaitIo {
                fd: self.fd,
                interest: self.interest,
            });
            Poll::Pending
        })
    }
}
