//! The I/O wait adapter.
//!
//! The scheduler never talks to the operating system directly. Between two
//! batches of task steps it calls [`IoWait::wait`] with the descriptors tasks
//! are waiting on and a timeout, and gets back the descriptors that became
//! ready. The same adapter hands out a [`Notify`] handle so a waker fired on
//! another thread can cut the wait short.
//!
//! Two backends are provided:
//! - [`PollWait`] (unix): `poll(2)` plus a self-pipe for notifications,
//! - [`ParkWait`]: a condition variable, for runtimes that never wait on
//!   descriptors.
//!
//! Tasks wait for readiness with [`wait_readable`] and [`wait_writable`].

mod park;
mod wait;

#[cfg(unix)]
mod poll;

pub use park::ParkWait;
pub use wait::{wait_readable, wait_writable};

#[cfg(unix)]
pub use poll::PollWait;

use std::io;
use std::time::Duration;
use std::sync::Arc;

/// Raw descriptor type accepted by the I/O adapter.
#[cfg(unix)]
pub use std::os::fd::RawFd;

/// Raw descriptor type accepted by the I/O adapter.
#[cfg(not(unix))]
pub type RawFd = i32;

/// Direction of readiness a task waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interest {
    Readable,
    Writable,
}

/// Readiness reported by [`IoWait::wait`].
///
/// Errors and hang-ups are reported as both readable and writable so that
/// the waiting task retries its operation and observes the error itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoEvent {
    pub fd: RawFd,
    pub readable: bool,
    pub writable: bool,
}

impl IoEvent {
    /// Whether this event satisfies a waiter with `interest`.
    pub fn matches(&self, interest: Interest) -> bool {
        match interest {
            Interest::Readable => self.readable,
            Interest::Writable => self.writable,
        }
    }
}

/// Interrupts a blocked [`IoWait::wait`] from any thread.
pub trait Notify: Send + Sync {
    fn notify(&self);
}

/// Blocking wait-for-events primitive driven by the scheduler.
pub trait IoWait {
    /// Blocks until one of `interests` is ready, the timeout elapses, or the
    /// notifier fires, and appends the ready descriptors to `ready`.
    ///
    /// `None` means no timeout. A zero timeout must not block.
    fn wait(
        &mut self,
        timeout: Option<Duration>,
        interests: &[(RawFd, Interest)],
        ready: &mut Vec<IoEvent>,
    ) -> io::Result<()>;

    /// Handle used by wakers to interrupt [`IoWait::wait`].
    fn notifier(&self) -> Arc<dyn Notify>;
}

/// The default backend for this platform.
pub(crate) fn default_io() -> io::Result<Box<dyn IoWait>> {
    #[cfg(unix)]
    {
        Ok(Box::new(PollWait::new()?))
    }

    #[cfg(not(unix))]
    {
        Ok(Box::new(ParkWait::new()))
    }
}
