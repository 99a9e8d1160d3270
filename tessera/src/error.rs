//! Error types used by the runtime and by task bodies.
//!
//! Everything a task can fail with is an [`Error`]:
//!
//! - [`Error::Cancelled`] is control flow, not a failure. It carries the
//!   [`ScopeId`] of the cancel scope that requested it and is caught by that
//!   scope only.
//! - [`Error::Failed`] wraps a task body's own failure.
//! - [`Error::Group`] bundles several failures collected by one nursery.
//! - [`Error::Finalization`] reports a producer that misbehaved while being
//!   closed (see [`FinalizeError`]).
//!
//! The remaining variants report misuse of the runtime API.

use crate::cancel::ScopeId;

use std::error::Error as StdError;
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type used throughout the runtime.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Cancellation delivered at a checkpoint.
///
/// Propagate it with `?`; the [`CancelScope`](crate::CancelScope) identified by
/// [`Cancelled::scope`] turns it back into normal control flow when its body
/// returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("cancelled by {scope}")]
pub struct Cancelled {
    pub(crate) scope: ScopeId,
}

impl Cancelled {
    /// The cancel scope that requested this cancellation.
    pub fn scope(&self) -> ScopeId {
        self.scope
    }
}

/// # Errors produced by tasks and by the runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    /// A cancel scope asked the task to unwind.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// A task body failed.
    #[error("{0}")]
    Failed(Box<dyn StdError + 'static>),

    /// Several children of one nursery failed.
    #[error(transparent)]
    Group(#[from] FailureGroup),

    /// A producer misbehaved while being finalized.
    #[error(transparent)]
    Finalization(#[from] FinalizeError),

    /// `spawn` was called on a nursery that already closed.
    #[error("nursery is closed")]
    NurseryClosed,

    /// A runtime-only operation was used outside of a running task.
    #[error("must be called from a task running inside a tessera runtime")]
    NoRuntime,

    /// `Runtime::run` was called while a runtime is already running on this thread.
    #[error("a tessera runtime is already running on this thread")]
    NestedRun,

    /// A cancel scope was entered a second time.
    #[error("{0} was already entered")]
    ScopeReentered(ScopeId),

    /// `remove_instrument` was given an instrument that is not installed.
    #[error("instrument is not installed")]
    UnknownInstrument,

    /// Another task is already waiting for the same readiness on this descriptor.
    #[error("another task is already waiting on fd {fd}")]
    BusyResource {
        /// The contended descriptor.
        fd: i32,
    },

    /// The deadline of a `fail_after`/`fail_at` block expired.
    #[error("deadline exceeded")]
    TooSlow,

    /// The producer is being closed; returned by `Yielder::emit`.
    #[error("producer was closed")]
    ProducerClosed,

    /// A run ended without the main task reporting a result.
    #[error("the main task exited without producing a result")]
    Unfinished,

    /// The I/O wait adapter failed.
    #[error("I/O wait failed: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Wraps a plain message or boxed error as a task failure.
    ///
    /// # Example
    /// ```
    /// let err = tessera::Error::failed("connection refused");
    /// assert_eq!(err.to_string(), "connection refused");
    /// assert_eq!(err.as_label(), "task_failed");
    /// ```
    pub fn failed(error: impl Into<Box<dyn StdError + 'static>>) -> Self {
        Error::Failed(error.into())
    }

    /// Wraps any error type as a task failure.
    pub fn other<E: StdError + 'static>(error: E) -> Self {
        Error::Failed(Box::new(error))
    }

    /// Returns the cancellation if this error is one.
    pub fn as_cancelled(&self) -> Option<Cancelled> {
        match self {
            Error::Cancelled(c) => Some(*c),
            _ => None,
        }
    }

    /// Returns `true` for [`Error::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }

    /// Returns the individual failures carried by this error.
    ///
    /// A group yields its members, anything else yields itself.
    pub fn failures(&self) -> &[Error] {
        match self {
            Error::Group(group) => group.failures(),
            other => std::slice::from_ref(other),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Error::Cancelled(_) => "task_cancelled",
            Error::Failed(_) => "task_failed",
            Error::Group(_) => "task_group_failed",
            Error::Finalization(e) => e.as_label(),
            Error::NurseryClosed => "nursery_closed",
            Error::NoRuntime => "no_runtime",
            Error::NestedRun => "nested_run",
            Error::ScopeReentered(_) => "scope_reentered",
            Error::UnknownInstrument => "unknown_instrument",
            Error::BusyResource { .. } => "busy_resource",
            Error::TooSlow => "too_slow",
            Error::ProducerClosed => "producer_closed",
            Error::Unfinished => "main_task_unfinished",
            Error::Io(_) => "io_wait_failed",
        }
    }
}

/// Failures of several tasks of one nursery, in the order they were recorded.
#[derive(Debug)]
pub struct FailureGroup {
    failures: Vec<Error>,
}

impl FailureGroup {
    pub(crate) fn new(failures: Vec<Error>) -> Self {
        Self { failures }
    }

    /// The collected failures, oldest first.
    pub fn failures(&self) -> &[Error] {
        &self.failures
    }

    /// Consumes the group and returns the collected failures.
    pub fn into_failures(self) -> Vec<Error> {
        self.failures
    }

    /// Number of failures in the group.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Always `false` for groups built by the runtime.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for FailureGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} tasks failed: [", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        f.write_str("]")
    }
}

impl StdError for FailureGroup {}

/// # Defects reported while force-closing a producer.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum FinalizeError {
    /// The producer yielded while inside a cancel scope or nursery it had not left.
    #[error("producer yielded inside {scope} and was finalized before leaving it")]
    ScopeCrossingYield {
        /// The scope the producer was still inside when it yielded.
        scope: ScopeId,
    },

    /// The producer tried to suspend at a checkpoint while being finalized.
    #[error("producer tried to suspend while being finalized")]
    SuspendedDuringFinalization,

    /// The producer emitted another value after being asked to close.
    #[error("producer emitted a value after being asked to close")]
    IgnoredClose,

    /// The producer's cleanup path failed.
    #[error("producer cleanup failed: {0}")]
    Failed(Box<Error>),
}

impl FinalizeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            FinalizeError::ScopeCrossingYield { .. } => "producer_scope_crossing_yield",
            FinalizeError::SuspendedDuringFinalization => "producer_suspended_in_finalizer",
            FinalizeError::IgnoredClose => "producer_ignored_close",
            FinalizeError::Failed(_) => "producer_cleanup_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_display_keeps_every_failure() {
        let group = FailureGroup::new(vec![Error::failed("a"), Error::failed("b")]);
        assert_eq!(group.to_string(), "2 tasks failed: [a; b]");

        let err = Error::from(group);
        let labels: Vec<_> = err.failures().iter().map(|e| e.to_string()).collect();
        assert_eq!(labels, ["a", "b"]);
    }

    #[test]
    fn single_failure_is_its_own_list() {
        let err = Error::TooSlow;
        assert_eq!(err.failures().len(), 1);
        assert_eq!(err.as_label(), "too_slow");
    }

    #[test]
    fn unfinished_run_is_an_error_not_a_panic() {
        let slot: Option<u32> = None;
        let err = slot.ok_or(Error::Unfinished).unwrap_err();

        assert_eq!(err.as_label(), "main_task_unfinished");
        assert!(!err.is_cancelled());
    }
}
