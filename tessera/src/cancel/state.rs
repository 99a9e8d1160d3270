use super::ScopeId;
use crate::error::{Cancelled, Error, Result};
use crate::runtime::scheduler::Runner;
use crate::runtime::task::TaskId;

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};
use std::time::Instant;

/// Lifecycle of a scope: a scope is entered at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Idle,
    Entered,
    Exited,
}

/// A node of the cancel-status tree.
///
/// Every task points at its innermost node; following `parent` links walks
/// the enclosing scopes outward. Nodes also keep weak links to their children
/// so that cancelling a node can reach every task below it.
pub(crate) struct ScopeState {
    id: ScopeId,
    parent: RefCell<Option<Rc<ScopeState>>>,
    children: RefCell<Vec<Weak<ScopeState>>>,
    tasks: RefCell<BTreeSet<TaskId>>,
    phase: Cell<Phase>,
    cancel_called: Cell<bool>,
    cancelled_caught: Cell<bool>,
    shield: Cell<bool>,
    deadline: Cell<Option<Instant>>,
    deadline_version: Cell<u64>,
}

impl ScopeState {
    pub(crate) fn new(deadline: Option<Instant>, shield: bool) -> Rc<Self> {
        Rc::new(Self {
            id: ScopeId::next(),
            parent: RefCell::new(None),
            children: RefCell::new(Vec::new()),
            tasks: RefCell::new(BTreeSet::new()),
            phase: Cell::new(Phase::Idle),
            cancel_called: Cell::new(false),
            cancelled_caught: Cell::new(false),
            shield: Cell::new(shield),
            deadline: Cell::new(deadline),
            deadline_version: Cell::new(0),
        })
    }

    /// The node every run starts from; it has no parent and is never exited.
    pub(crate) fn root() -> Rc<Self> {
        let root = Self::new(None, false);
        root.phase.set(Phase::Entered);
        root
    }

    pub(crate) fn id(&self) -> ScopeId {
        self.id
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase.get()
    }

    pub(crate) fn cancel_called(&self) -> bool {
        self.cancel_called.get()
    }

    pub(crate) fn cancelled_caught(&self) -> bool {
        self.cancelled_caught.get()
    }

    pub(crate) fn set_cancelled_caught(&self) {
        self.cancelled_caught.set(true);
    }

    pub(crate) fn shield(&self) -> bool {
        self.shield.get()
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline.get()
    }

    pub(crate) fn deadline_version(&self) -> u64 {
        self.deadline_version.get()
    }

    pub(crate) fn parent(&self) -> Option<Rc<ScopeState>> {
        self.parent.borrow().clone()
    }

    /// Enters the scope on behalf of `task`, linking it under `parent`.
    pub(crate) fn enter(self: &Rc<Self>, parent: &Rc<ScopeState>, task: TaskId) -> Result<()> {
        if self.phase.get() != Phase::Idle {
            return Err(Error::ScopeReentered(self.id));
        }

        self.link(parent);
        self.tasks.borrow_mut().insert(task);
        self.phase.set(Phase::Entered);

        Ok(())
    }

    /// Un-registers `task` and detaches the scope from the tree.
    pub(crate) fn exit(&self, task: TaskId) {
        self.tasks.borrow_mut().remove(&task);
        self.unlink();
        self.phase.set(Phase::Exited);
    }

    pub(crate) fn add_task(&self, task: TaskId) {
        self.tasks.borrow_mut().insert(task);
    }

    pub(crate) fn remove_task(&self, task: TaskId) {
        self.tasks.borrow_mut().remove(&task);
    }

    fn link(self: &Rc<Self>, parent: &Rc<ScopeState>) {
        let mut siblings = parent.children.borrow_mut();
        siblings.retain(|child| child.strong_count() > 0);
        siblings.push(Rc::downgrade(self));

        *self.parent.borrow_mut() = Some(parent.clone());
    }

    fn unlink(&self) {
        let Some(parent) = self.parent.borrow_mut().take() else {
            return;
        };

        parent
            .children
            .borrow_mut()
            .retain(|child| child.upgrade().is_some_and(|c| c.id != self.id));
    }

    /// Returns the cancellation a checkpoint at this node must raise, if any.
    ///
    /// Walks outward from this node, stops after the first shielded node and
    /// tags the cancellation with the outermost cancelled node it saw.
    pub(crate) fn effective_cancel(self: &Rc<Self>) -> Option<Cancelled> {
        let mut found = None;
        let mut node = self.clone();

        loop {
            if node.cancel_called.get() {
                found = Some(Cancelled { scope: node.id });
            }

            if node.shield.get() {
                break;
            }

            match node.parent() {
                Some(parent) => node = parent,
                None => break,
            }
        }

        found
    }

    /// Marks the scope cancelled and reschedules every task it encloses.
    pub(crate) fn cancel(self: &Rc<Self>, runner: Option<&Runner>) {
        if self.cancel_called.replace(true) {
            return;
        }

        let woken = match (self.phase.get(), runner) {
            (Phase::Entered, Some(runner)) => self.wake_enclosed(runner),
            _ => 0,
        };

        tracing::debug!(scope = %self.id, tasks = woken, "cancel scope cancelled");
    }

    pub(crate) fn set_deadline(self: &Rc<Self>, deadline: Option<Instant>, runner: Option<&Runner>) {
        self.deadline.set(deadline);
        self.deadline_version.set(self.deadline_version.get() + 1);

        if let (Phase::Entered, Some(runner)) = (self.phase.get(), runner) {
            runner.register_deadline(self);
        }
    }

    pub(crate) fn set_shield(self: &Rc<Self>, shield: bool, runner: Option<&Runner>) {
        if self.shield.replace(shield) == shield || shield {
            return;
        }

        // Dropping the shield exposes the tasks inside to a pending outer cancel.
        if let (Phase::Entered, Some(runner)) = (self.phase.get(), runner)
            && self.effective_cancel().is_some()
        {
            self.wake_enclosed(runner);
        }
    }

    fn wake_enclosed(&self, runner: &Runner) -> usize {
        let mut tasks = BTreeSet::new();
        self.collect_tasks(&mut tasks);

        for &task in &tasks {
            runner.reschedule(task);
        }

        tasks.len()
    }

    fn collect_tasks(&self, out: &mut BTreeSet<TaskId>) {
        out.extend(self.tasks.borrow().iter().copied());

        let children: Vec<_> = self
            .children
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();

        for child in children {
            if !child.shield.get() {
                child.collect_tasks(out);
            }
        }
    }
}
