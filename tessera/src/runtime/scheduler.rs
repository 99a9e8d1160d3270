//! The scheduler core.
//!
//! A [`Runner`] holds all state of one run: the task table, the run queue,
//! the timer and deadline heaps, tasks waiting on descriptors or for the
//! runtime to go idle, and the instrument registry. It is created by
//! [`Runtime::run`](crate::Runtime::run) and dropped when the run ends.
//!
//! Every loop iteration:
//! 1. computes how long the I/O wait may block: zero when something is
//!    runnable, otherwise until the earliest timer or scope deadline (as
//!    converted by the clock), otherwise forever,
//! 2. blocks in the I/O adapter,
//! 3. reschedules tasks woken through their waker or by I/O readiness,
//! 4. cancels scopes whose deadline passed and wakes expired sleepers,
//! 5. steps every task that was runnable at that point, in FIFO order.
//!
//! The run ends once every task, the main task included, has exited.

use super::lowlevel::RunStatistics;
use super::task::waker::{WakeQueue, make_waker};
use super::task::{Suspend, Task, TaskId, TaskInfo};
use super::task::core::TaskFuture;
use super::timer::{DeadlineEntry, TimerEntry};
use super::context;
use crate::cancel::state::{Phase, ScopeState};
use crate::error::{Error, Result};
use crate::instrument::registry::Registry;
use crate::instrument::{Hook, Instrument, Outcome};
use crate::io::{Interest, IoEvent, IoWait, RawFd};
use crate::nursery::NurseryState;
use crate::time::Clock;

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BinaryHeap, VecDeque};
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

struct IoWaiter {
    fd: RawFd,
    interest: Interest,
    task: TaskId,
    epoch: u64,
}

/// State of one run of the scheduler.
pub(crate) struct Runner {
    clock: Rc<dyn Clock>,

    /// Taken back by the runtime when the run ends.
    io: RefCell<Option<Box<dyn IoWait>>>,

    wake_queue: Arc<WakeQueue>,
    instruments: Registry,

    /// Root of the cancel-status tree.
    root: Rc<ScopeState>,

    tasks: RefCell<BTreeMap<TaskId, Rc<Task>>>,
    runnable: RefCell<VecDeque<TaskId>>,
    timers: RefCell<BinaryHeap<TimerEntry>>,
    deadlines: RefCell<BinaryHeap<DeadlineEntry>>,
    io_waiters: RefCell<Vec<IoWaiter>>,
    idle_waiters: RefCell<Vec<(TaskId, u64)>>,

    main_task: Cell<Option<TaskId>>,
    main_outcome: RefCell<Option<Result<()>>>,
    finalization_defects: Cell<u64>,
}

impl Runner {
    pub(crate) fn new(
        clock: Rc<dyn Clock>,
        io: Box<dyn IoWait>,
        instruments: &[Rc<dyn Instrument>],
    ) -> Self {
        let wake_queue = Arc::new(WakeQueue::new(io.notifier()));
        let registry = Registry::new();
        for instrument in instruments {
            registry.add(instrument.clone());
        }

        Self {
            clock,
            io: RefCell::new(Some(io)),
            wake_queue,
            instruments: registry,
            root: ScopeState::root(),
            tasks: RefCell::new(BTreeMap::new()),
            runnable: RefCell::new(VecDeque::new()),
            timers: RefCell::new(BinaryHeap::new()),
            deadlines: RefCell::new(BinaryHeap::new()),
            io_waiters: RefCell::new(Vec::new()),
            idle_waiters: RefCell::new(Vec::new()),
            main_task: Cell::new(None),
            main_outcome: RefCell::new(None),
            finalization_defects: Cell::new(0),
        }
    }

    pub(crate) fn take_io(&self) -> Option<Box<dyn IoWait>> {
        self.io.borrow_mut().take()
    }

    pub(crate) fn now(&self) -> Instant {
        self.clock.now()
    }

    pub(crate) fn instruments(&self) -> &Registry {
        &self.instruments
    }

    /// Runs `main` as the main task until every task has exited.
    ///
    /// Returns the main task's outcome, or the I/O adapter's failure.
    pub(crate) fn run(&self, main: TaskFuture) -> Result<()> {
        self.clock.start();
        self.instruments.fire(Hook::BeforeRun, |i| i.before_run());

        let main = self.spawn(Some("<main>".into()), main, self.root.clone(), None);
        self.main_task.set(Some(main.id()));
        drop(main);

        let driven = self.drive();
        if driven.is_err() {
            self.teardown();
        }

        self.instruments.fire(Hook::AfterRun, |i| i.after_run());

        driven?;
        self.main_outcome.borrow_mut().take().unwrap_or(Err(Error::Unfinished))
    }

    fn drive(&self) -> Result<()> {
        let mut ready = Vec::new();

        while !self.tasks.borrow().is_empty() {
            self.drain_wakeups();

            let timeout = self.compute_timeout();
            let interests = self.io_interests();

            self.instruments.fire(Hook::BeforeIoWait, |i| i.before_io_wait(timeout));
            tracing::trace!(?timeout, fds = interests.len(), "waiting for io");

            ready.clear();
            let waited = match self.io.borrow_mut().as_mut() {
                Some(io) => io.wait(timeout, &interests, &mut ready),
                None => Ok(()),
            };

            self.instruments.fire(Hook::AfterIoWait, |i| i.after_io_wait(timeout));
            waited?;

            self.drain_wakeups();
            self.dispatch_io(&ready);

            let now = self.clock.now();
            self.expire_deadlines(now);
            self.expire_timers(now);

            if self.runnable.borrow().is_empty() {
                self.wake_idle();
            }

            let batch: Vec<TaskId> = self.runnable.borrow_mut().drain(..).collect();
            for id in batch {
                if let Some(task) = self.task(id) {
                    self.step(&task);
                }
            }
        }

        Ok(())
    }

    /// Drops every remaining task after the run was aborted.
    fn teardown(&self) {
        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.borrow_mut()).into_values().collect();
        tracing::debug!(tasks = tasks.len(), "run aborted; dropping remaining tasks");

        for task in tasks {
            let future = task.take_future();
            task.take_nursery();
            context::enter_task(task.clone(), || drop(future));
        }
    }

    fn task(&self, id: TaskId) -> Option<Rc<Task>> {
        self.tasks.borrow().get(&id).cloned()
    }

    /// Creates a task and makes it runnable.
    pub(crate) fn spawn(
        &self,
        name: Option<Rc<str>>,
        future: TaskFuture,
        status: Rc<ScopeState>,
        nursery: Option<Rc<NurseryState>>,
    ) -> Rc<Task> {
        let id = TaskId::next();
        let name = name.unwrap_or_else(|| id.to_string().into());
        let parent = nursery.as_ref().map(|n| n.owner());
        let info = TaskInfo::new(id, name, parent);
        let waker = make_waker(id, self.wake_queue.clone());

        status.add_task(id);
        let task = Rc::new(Task::new(info, future, waker, status, nursery));
        self.tasks.borrow_mut().insert(id, task.clone());

        tracing::debug!(task = %id, name = task.info().name(), parent = ?parent, "task spawned");
        self.instruments.fire(Hook::TaskSpawned, |i| i.task_spawned(task.info()));
        self.reschedule(id);

        task
    }

    /// Puts a task at the back of the run queue unless it is already there.
    ///
    /// Invalidates any timer, I/O or idle registration the task holds.
    pub(crate) fn reschedule(&self, id: TaskId) {
        let Some(task) = self.task(id) else {
            return;
        };

        if task.set_scheduled(true) {
            return;
        }

        task.bump_epoch();
        self.runnable.borrow_mut().push_back(id);
        self.instruments.fire(Hook::TaskScheduled, |i| i.task_scheduled(task.info()));
    }

    fn step(&self, task: &Rc<Task>) {
        task.set_scheduled(false);

        let Some(mut future) = task.take_future() else {
            return;
        };

        self.instruments.fire(Hook::BeforeTaskStep, |i| i.before_task_step(task.info()));
        tracing::trace!(task = %task.id(), "step");

        let mut cx = Context::from_waker(task.waker());
        let polled = context::enter_task(task.clone(), || future.as_mut().poll(&mut cx));

        match polled {
            Poll::Pending => {
                task.restore_future(future);
                self.instruments.fire(Hook::AfterTaskStep, |i| i.after_task_step(task.info()));

                for reason in task.take_suspends() {
                    self.suspend(task, reason);
                }
            }
            Poll::Ready(outcome) => {
                context::enter_task(task.clone(), || drop(future));
                self.instruments.fire(Hook::AfterTaskStep, |i| i.after_task_step(task.info()));
                self.exit(task, outcome);
            }
        }
    }

    fn suspend(&self, task: &Task, reason: Suspend) {
        let (id, epoch) = (task.id(), task.epoch());

        match reason {
            Suspend::Reschedule => self.reschedule(id),
            Suspend::SleepUntil(deadline) => {
                self.timers.borrow_mut().push(TimerEntry {
                    deadline,
                    task: id,
                    epoch,
                });
            }
            Suspend::WaitIo { fd, interest } => {
                self.io_waiters.borrow_mut().push(IoWaiter {
                    fd,
                    interest,
                    task: id,
                    epoch,
                });
            }
            Suspend::WaitIdle => self.idle_waiters.borrow_mut().push((id, epoch)),
        }
    }

    fn exit(&self, task: &Rc<Task>, outcome: Result<()>) {
        let id = task.id();

        let producers = task.take_producers();
        if !producers.is_empty() {
            context::enter_task(task.clone(), || {
                for producer in producers {
                    if let Err(defect) = producer.finalize() {
                        self.finalization_defects.set(self.finalization_defects.get() + 1);
                        tracing::error!(
                            task = %id,
                            error = %defect,
                            label = defect.as_label(),
                            "producer finalization failed"
                        );
                    }
                }
            });
        }

        self.tasks.borrow_mut().remove(&id);
        task.status().remove_task(id);
        let nursery = task.take_nursery();

        tracing::debug!(task = %id, outcome = Outcome::of(&outcome).as_label(), "task exited");
        self.instruments.fire(Hook::TaskExited, |i| {
            i.task_exited(task.info(), Outcome::of(&outcome))
        });

        match nursery {
            Some(nursery) => nursery.child_exited(self, id, outcome),
            None if self.main_task.get() == Some(id) => {
                *self.main_outcome.borrow_mut() = Some(outcome);
            }
            None => {}
        }
    }

    fn drain_wakeups(&self) {
        for id in self.wake_queue.drain() {
            self.reschedule(id);
        }
    }

    fn is_current(&self, id: TaskId, epoch: u64) -> bool {
        self.task(id).is_some_and(|task| task.epoch() == epoch)
    }

    fn compute_timeout(&self) -> Option<Duration> {
        self.idle_waiters
            .borrow_mut()
            .retain(|&(id, epoch)| self.is_current(id, epoch));

        if !self.runnable.borrow().is_empty()
            || !self.wake_queue.is_empty()
            || !self.idle_waiters.borrow().is_empty()
        {
            return Some(Duration::ZERO);
        }

        self.next_deadline()
            .map(|deadline| self.clock.sleep_time(deadline))
    }

    /// Earliest live timer or scope deadline, pruning stale heap tops.
    fn next_deadline(&self) -> Option<Instant> {
        let timer = {
            let mut timers = self.timers.borrow_mut();
            loop {
                match timers.peek() {
                    Some(entry) if !self.is_current(entry.task, entry.epoch) => {
                        timers.pop();
                    }
                    Some(entry) => break Some(entry.deadline),
                    None => break None,
                }
            }
        };

        let scope = {
            let mut deadlines = self.deadlines.borrow_mut();
            loop {
                match deadlines.peek() {
                    Some(entry) if !deadline_is_live(entry) => {
                        deadlines.pop();
                    }
                    Some(entry) => break Some(entry.deadline),
                    None => break None,
                }
            }
        };

        match (timer, scope) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn io_interests(&self) -> Vec<(RawFd, Interest)> {
        let mut waiters = self.io_waiters.borrow_mut();
        waiters.retain(|w| self.is_current(w.task, w.epoch));
        waiters.iter().map(|w| (w.fd, w.interest)).collect()
    }

    /// The task currently waiting for `interest` on `fd`, if any.
    pub(crate) fn io_waiter(&self, fd: RawFd, interest: Interest) -> Option<TaskId> {
        self.io_waiters
            .borrow()
            .iter()
            .find(|w| w.fd == fd && w.interest == interest && self.is_current(w.task, w.epoch))
            .map(|w| w.task)
    }

    fn dispatch_io(&self, ready: &[IoEvent]) {
        if ready.is_empty() {
            return;
        }

        let woken: Vec<TaskId> = self
            .io_waiters
            .borrow()
            .iter()
            .filter(|w| ready.iter().any(|e| e.fd == w.fd && e.matches(w.interest)))
            .map(|w| w.task)
            .collect();

        for id in woken {
            self.reschedule(id);
        }
    }

    fn expire_deadlines(&self, now: Instant) {
        loop {
            let entry = {
                let mut deadlines = self.deadlines.borrow_mut();
                match deadlines.peek() {
                    Some(entry) if entry.deadline <= now => deadlines.pop(),
                    _ => None,
                }
            };

            let Some(entry) = entry else {
                break;
            };

            if !deadline_is_live(&entry) {
                continue;
            }

            if let Some(scope) = entry.scope.upgrade() {
                tracing::debug!(scope = %scope.id(), "cancel scope deadline expired");
                scope.cancel(Some(self));
            }
        }
    }

    fn expire_timers(&self, now: Instant) {
        loop {
            let entry = {
                let mut timers = self.timers.borrow_mut();
                match timers.peek() {
                    Some(entry) if entry.deadline <= now => timers.pop(),
                    _ => None,
                }
            };

            let Some(entry) = entry else {
                break;
            };

            if self.is_current(entry.task, entry.epoch) {
                self.reschedule(entry.task);
            }
        }
    }

    fn wake_idle(&self) {
        let idle = std::mem::take(&mut *self.idle_waiters.borrow_mut());
        for (id, epoch) in idle {
            if self.is_current(id, epoch) {
                self.reschedule(id);
            }
        }
    }

    /// Starts tracking a scope's current deadline.
    pub(crate) fn register_deadline(&self, scope: &Rc<ScopeState>) {
        let Some(deadline) = scope.deadline() else {
            return;
        };

        self.deadlines.borrow_mut().push(DeadlineEntry {
            deadline,
            scope: Rc::downgrade(scope),
            version: scope.deadline_version(),
        });
    }

    pub(crate) fn statistics(&self) -> RunStatistics {
        let now = self.clock.now();
        let seconds_to_next_deadline = self
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now).as_secs_f64())
            .unwrap_or(f64::INFINITY);

        RunStatistics {
            tasks_living: self.tasks.borrow().len(),
            tasks_runnable: self.runnable.borrow().len(),
            seconds_to_next_deadline,
            instruments: self.instruments.len(),
            finalization_defects: self.finalization_defects.get(),
        }
    }
}

fn deadline_is_live(entry: &DeadlineEntry) -> bool {
    entry.scope.upgrade().is_some_and(|scope| {
        scope.deadline_version() == entry.version
            && scope.phase() == Phase::Entered
            && !scope.cancel_called()
    })
}
