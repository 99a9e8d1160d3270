//! Task primitives.
//!
//! This module defines how the runtime represents a task:
//! - its identity ([`TaskId`]) and the public view handed to instruments
//!   ([`TaskInfo`]),
//! - the record the scheduler keeps per task,
//! - the suspension reasons a task reports when a step ends,
//! - the thread-safe waker that puts a task back on the run queue.
//!
//! Tasks are created with [`Nursery::spawn`](crate::Nursery::spawn); the
//! lower-level pieces are used internally by the scheduler.

pub(crate) mod core;
pub(crate) mod state;
pub(crate) mod waker;

pub(crate) use core::Task;
pub(crate) use state::Suspend;

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a task.
///
/// Ids increase monotonically and are never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);

        TaskId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        TaskId(raw)
    }

    /// Returns the raw numeric value of this id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Public description of a task, handed to instruments and returned by
/// [`lowlevel::current_task`](crate::lowlevel::current_task).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    id: TaskId,
    name: Rc<str>,
    parent: Option<TaskId>,
}

impl TaskInfo {
    pub(crate) fn new(id: TaskId, name: Rc<str>, parent: Option<TaskId>) -> Self {
        Self { id, name, parent }
    }

    /// The task's id.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The name given at spawn time, or a generated one.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The task that owns the nursery this task was spawned into.
    ///
    /// `None` for the main task.
    pub fn parent(&self) -> Option<TaskId> {
        self.parent
    }
}
