use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Source of time for a runtime.
///
/// The scheduler asks the clock for the current time when expiring timers
/// and deadlines, and converts the earliest pending deadline into an I/O
/// wait timeout with [`Clock::sleep_time`].
pub trait Clock {
    /// Called once when a run starts.
    fn start(&self) {}

    /// The current time.
    fn now(&self) -> Instant;

    /// How long the scheduler should block to reach `deadline`.
    fn sleep_time(&self, deadline: Instant) -> Duration {
        deadline.saturating_duration_since(self.now())
    }
}

/// The real monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Longest the scheduler blocks on a frozen [`MockClock`] with nothing to do.
const FROZEN_SLEEP: Duration = Duration::from_secs(24 * 60 * 60);

/// A clock that only moves when told to.
///
/// Time starts at the instant the clock was created and advances with
/// [`jump`](MockClock::jump). With autojump enabled, whenever every task is
/// blocked the clock jumps straight to the next deadline, so tests that
/// sleep for minutes finish instantly.
///
/// Cloning the clock yields another handle to the same time line, which is
/// how tests keep control of a clock they handed to the runtime.
///
/// # Examples
///
/// ```rust,ignore
/// let clock = MockClock::new();
/// let runtime = RuntimeBuilder::new().clock(clock.clone()).build()?;
///
/// runtime.block_on(async move {
///     let start = tessera::current_time()?;
///     clock.jump(Duration::from_secs(5));
///     assert_eq!(tessera::current_time()? - start, Duration::from_secs(5));
/// })?;
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    inner: Rc<MockInner>,
}

#[derive(Debug)]
struct MockInner {
    base: Instant,
    offset: Cell<Duration>,
    autojump: Cell<bool>,
}

impl MockClock {
    /// Creates a frozen clock.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(MockInner {
                base: Instant::now(),
                offset: Cell::new(Duration::ZERO),
                autojump: Cell::new(false),
            }),
        }
    }

    /// Enables autojump.
    pub fn autojump(self) -> Self {
        self.set_autojump(true);
        self
    }

    pub fn set_autojump(&self, autojump: bool) {
        self.inner.autojump.set(autojump);
    }

    pub fn is_autojump(&self) -> bool {
        self.inner.autojump.get()
    }

    /// Advances the clock by `by`.
    ///
    /// A jump past the last representable instant leaves the clock where it
    /// is.
    pub fn jump(&self, by: Duration) {
        let offset = self.inner.offset.get().saturating_add(by);
        if self.inner.base.checked_add(offset).is_some() {
            self.inner.offset.set(offset);
        } else {
            tracing::warn!(?by, "mock clock jump out of range ignored");
        }
    }

    /// Time elapsed on this clock since it was created.
    pub fn elapsed(&self) -> Duration {
        self.inner.offset.get()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.inner.base + self.inner.offset.get()
    }

    fn sleep_time(&self, deadline: Instant) -> Duration {
        let now = self.now();
        if deadline <= now {
            return Duration::ZERO;
        }

        if self.is_autojump() {
            self.jump(deadline - now);
            tracing::trace!(by = ?(deadline - now), "mock clock autojumped");
            return Duration::ZERO;
        }

        FROZEN_SLEEP
    }
}
