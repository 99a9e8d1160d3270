use std::fmt;

/// A scheduler transition instruments can observe.
///
/// The set is fixed; each hook corresponds to one method of
/// [`Instrument`](super::Instrument).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Hook {
    /// The scheduler loop is about to start.
    BeforeRun,
    /// The scheduler loop finished.
    AfterRun,
    /// A task was created.
    TaskSpawned,
    /// A task was put on the run queue.
    TaskScheduled,
    /// A task is about to be polled.
    BeforeTaskStep,
    /// A task was polled.
    AfterTaskStep,
    /// A task finished, with its outcome.
    TaskExited,
    /// The scheduler is about to block in the I/O adapter.
    BeforeIoWait,
    /// The scheduler returned from the I/O adapter.
    AfterIoWait,
}

impl Hook {
    pub const COUNT: usize = 9;

    pub const ALL: [Hook; Hook::COUNT] = [
        Hook::BeforeRun,
        Hook::AfterRun,
        Hook::TaskSpawned,
        Hook::TaskScheduled,
        Hook::BeforeTaskStep,
        Hook::AfterTaskStep,
        Hook::TaskExited,
        Hook::BeforeIoWait,
        Hook::AfterIoWait,
    ];

    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    /// The name of the [`Instrument`](super::Instrument) method for this hook.
    pub const fn as_str(self) -> &'static str {
        match self {
            Hook::BeforeRun => "before_run",
            Hook::AfterRun => "after_run",
            Hook::TaskSpawned => "task_spawned",
            Hook::TaskScheduled => "task_scheduled",
            Hook::BeforeTaskStep => "before_task_step",
            Hook::AfterTaskStep => "after_task_step",
            Hook::TaskExited => "task_exited",
            Hook::BeforeIoWait => "before_io_wait",
            Hook::AfterIoWait => "after_io_wait",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of [`Hook`]s, stored as a bitmask.
///
/// Built in `const` context by `#[tessera::instrument]`:
///
/// ```
/// use tessera::instrument::{Hook, HookSet};
///
/// const HOOKS: HookSet = HookSet::EMPTY.with(Hook::TaskSpawned).with(Hook::TaskExited);
/// assert!(HOOKS.contains(Hook::TaskExited));
/// assert!(!HOOKS.contains(Hook::BeforeIoWait));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HookSet(u16);

impl HookSet {
    pub const EMPTY: HookSet = HookSet(0);

    pub const ALL: HookSet = HookSet((1 << Hook::COUNT) - 1);

    /// Returns this set with `hook` added.
    pub const fn with(self, hook: Hook) -> HookSet {
        HookSet(self.0 | (1 << hook.index()))
    }

    /// Returns this set with `hook` removed.
    pub const fn without(self, hook: Hook) -> HookSet {
        HookSet(self.0 & !(1 << hook.index()))
    }

    pub const fn contains(self, hook: Hook) -> bool {
        self.0 & (1 << hook.index()) != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates the hooks in declaration order.
    pub fn iter(self) -> impl Iterator<Item = Hook> {
        Hook::ALL.into_iter().filter(move |hook| self.contains(*hook))
    }
}

impl FromIterator<Hook> for HookSet {
    fn from_iter<I: IntoIterator<Item = Hook>>(iter: I) -> Self {
        iter.into_iter().fold(HookSet::EMPTY, HookSet::with)
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_contains_every_hook() {
        assert_eq!(HookSet::ALL.iter().count(), Hook::COUNT);
        assert_eq!(HookSet::ALL.iter().collect::<Vec<_>>(), Hook::ALL);
        assert!(HookSet::EMPTY.is_empty());
    }

    #[test]
    fn with_and_without() {
        let set = HookSet::EMPTY.with(Hook::AfterIoWait).with(Hook::BeforeRun);
        assert_eq!(set.iter().collect::<Vec<_>>(), [Hook::BeforeRun, Hook::AfterIoWait]);

        let set = set.without(Hook::BeforeRun);
        assert!(!set.contains(Hook::BeforeRun));
        assert_eq!(set, [Hook::AfterIoWait].into_iter().collect());
    }
}
