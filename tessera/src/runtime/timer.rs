use super::task::TaskId;
use crate::cancel::state::ScopeState;

use std::cmp::Ordering;
use std::rc::Weak;
use std::time::Instant;

/// A sleeping task in the scheduler's timer heap.
///
/// The entry is stale once the task has been rescheduled since it went to
/// sleep, which the scheduler detects by comparing `epoch` with the task's.
pub(crate) struct TimerEntry {
    /// The time at which the task becomes runnable.
    pub(crate) deadline: Instant,

    pub(crate) task: TaskId,

    /// Task epoch at registration time.
    pub(crate) epoch: u64,
}

/// A cancel scope deadline in the scheduler's deadline heap.
///
/// The entry is stale once the scope's deadline changed, the scope was
/// dropped, or it already fired.
pub(crate) struct DeadlineEntry {
    pub(crate) deadline: Instant,

    pub(crate) scope: Weak<ScopeState>,

    /// Scope deadline version at registration time.
    pub(crate) version: u64,
}

macro_rules! min_heap_by_deadline {
    ($entry:ty) => {
        impl Eq for $entry {}

        impl PartialEq for $entry {
            /// Two entries are equal if their deadlines are equal.
            fn eq(&self, other: &Self) -> bool {
                self.deadline.eq(&other.deadline)
            }
        }

        impl Ord for $entry {
            /// Orders entries by deadline.
            ///
            /// The comparison is **reversed** so that a `BinaryHeap` behaves
            /// as a min-heap, where the earliest deadline is popped first.
            fn cmp(&self, other: &Self) -> Ordering {
                other.deadline.cmp(&self.deadline)
            }
        }

        impl PartialOrd for $entry {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }
    };
}

min_heap_by_deadline!(TimerEntry);
min_heap_by_deadline!(DeadlineEntry);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;
    use std::time::Duration;

    #[test]
    fn earliest_deadline_pops_first() {
        let now = Instant::now();
        let mut heap = BinaryHeap::new();
        for (raw, secs) in [(1, 30), (2, 10), (3, 20)] {
            heap.push(TimerEntry {
                deadline: now + Duration::from_secs(secs),
                task: TaskId::from_raw(raw),
                epoch: 0,
            });
        }

        let order: Vec<_> = std::iter::from_fn(|| heap.pop()).map(|e| e.task).collect();
        assert_eq!(order, [2, 3, 1].map(TaskId::from_raw));
    }
}
