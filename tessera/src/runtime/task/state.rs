use crate::io::{Interest, RawFd};

use std::time::Instant;

/// Why a task's step ended without the task finishing.
///
/// Checkpoint futures record one of these on the running task before
/// returning `Poll::Pending`. A step that records nothing leaves the task
/// parked: only its [`Waker`](std::task::Waker) brings it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Suspend {
    /// Back of the run queue.
    Reschedule,

    /// Runnable again once the clock reaches the instant.
    SleepUntil(Instant),

    /// Runnable again once the descriptor is ready.
    WaitIo { fd: RawFd, interest: Interest },

    /// Runnable again once every other task is blocked.
    WaitIdle,
}
