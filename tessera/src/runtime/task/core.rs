use super::{Suspend, TaskId, TaskInfo};
use crate::cancel::state::ScopeState;
use crate::error::{Cancelled, Result};
use crate::nursery::NurseryState;
use crate::producer::Finalize;

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::Waker;

/// The continuation of a task.
pub(crate) type TaskFuture = Pin<Box<dyn Future<Output = Result<()>>>>;

/// A spawned task as seen by the scheduler.
///
/// A `Task` owns the pinned future it runs, the innermost node of its
/// cancel-status chain, and the bookkeeping the scheduler needs between
/// steps. Tasks live on the scheduler thread only; the one piece that may
/// leave it is the [`Waker`].
pub(crate) struct Task {
    info: TaskInfo,

    /// Taken out while the task is being polled.
    future: RefCell<Option<TaskFuture>>,

    waker: Waker,

    /// Innermost cancel-status node.
    status: RefCell<Rc<ScopeState>>,

    /// Nursery the task was spawned into; `None` for the main task and
    /// after exit.
    nursery: RefCell<Option<Rc<NurseryState>>>,

    /// Producers created while this task was running.
    producers: RefCell<Vec<Rc<dyn Finalize>>>,

    /// Suspension reasons recorded during the current step.
    suspends: RefCell<Vec<Suspend>>,

    /// Whether the task is in the run queue.
    scheduled: Cell<bool>,

    /// Bumped whenever the task is rescheduled; timer and I/O registrations
    /// made under an older epoch are stale.
    epoch: Cell<u64>,

    finalizing: Cell<bool>,
}

impl Task {
    pub(crate) fn new(
        info: TaskInfo,
        future: TaskFuture,
        waker: Waker,
        status: Rc<ScopeState>,
        nursery: Option<Rc<NurseryState>>,
    ) -> Self {
        Self {
            info,
            future: RefCell::new(Some(future)),
            waker,
            status: RefCell::new(status),
            nursery: RefCell::new(nursery),
            producers: RefCell::new(Vec::new()),
            suspends: RefCell::new(Vec::new()),
            scheduled: Cell::new(false),
            epoch: Cell::new(0),
            finalizing: Cell::new(false),
        }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.info.id()
    }

    pub(crate) fn info(&self) -> &TaskInfo {
        &self.info
    }

    pub(crate) fn waker(&self) -> &Waker {
        &self.waker
    }

    pub(crate) fn take_future(&self) -> Option<TaskFuture> {
        self.future.borrow_mut().take()
    }

    pub(crate) fn restore_future(&self, future: TaskFuture) {
        *self.future.borrow_mut() = Some(future);
    }

    pub(crate) fn status(&self) -> Rc<ScopeState> {
        self.status.borrow().clone()
    }

    /// Installs `status` as the innermost node and returns the previous one.
    pub(crate) fn replace_status(&self, status: Rc<ScopeState>) -> Rc<ScopeState> {
        self.status.replace(status)
    }

    /// The cancellation a checkpoint in this task must raise right now.
    pub(crate) fn cancelled(&self) -> Option<Cancelled> {
        self.status().effective_cancel()
    }

    pub(crate) fn take_nursery(&self) -> Option<Rc<NurseryState>> {
        self.nursery.borrow_mut().take()
    }

    pub(crate) fn suspend(&self, reason: Suspend) {
        self.suspends.borrow_mut().push(reason);
    }

    pub(crate) fn take_suspends(&self) -> Vec<Suspend> {
        std::mem::take(&mut *self.suspends.borrow_mut())
    }

    /// Sets the scheduled flag and returns its previous value.
    pub(crate) fn set_scheduled(&self, scheduled: bool) -> bool {
        self.scheduled.replace(scheduled)
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.get()
    }

    pub(crate) fn bump_epoch(&self) {
        self.epoch.set(self.epoch.get() + 1);
    }

    pub(crate) fn is_finalizing(&self) -> bool {
        self.finalizing.get()
    }

    /// Sets the finalizing flag and returns its previous value.
    pub(crate) fn set_finalizing(&self, finalizing: bool) -> bool {
        self.finalizing.replace(finalizing)
    }

    /// Records a producer created by this task.
    ///
    /// Records that no longer need closing are pruned on the way.
    pub(crate) fn track_producer(&self, producer: Rc<dyn Finalize>) {
        let mut producers = self.producers.borrow_mut();
        producers.retain(|p| p.needs_finalization());
        producers.push(producer);
    }

    pub(crate) fn take_producers(&self) -> Vec<Rc<dyn Finalize>> {
        std::mem::take(&mut *self.producers.borrow_mut())
    }
}
