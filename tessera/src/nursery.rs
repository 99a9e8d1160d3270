//! Nurseries: structured groups of child tasks.
//!
//! [`open_nursery`] runs a body that may spawn children through the
//! [`Nursery`] handle it receives, then waits for every child before
//! returning. Children never outlive the nursery, and a failure anywhere in
//! the group cancels the rest of it:
//!
//! - the first failure (of a child or of the body) cancels the nursery's
//!   internal scope, so every sibling unwinds at its next checkpoint,
//! - once all children are done, one failure is returned as is, several are
//!   returned as [`Error::Group`] in the order they were recorded,
//! - cancellations the nursery itself caused are dropped, and a
//!   cancellation of an enclosing scope is re-raised after the join.
//!
//! # Examples
//!
//! ```rust,ignore
//! tessera::open_nursery(|nursery| async move {
//!     for id in 0..3 {
//!         nursery.spawn_named(&format!("worker-{id}"), async move {
//!             tessera::sleep(Duration::from_millis(10 * id)).await
//!         })?;
//!     }
//!     Ok(())
//! })
//! .await?;
//! // All three workers have finished here.
//! ```

use crate::cancel::CancelScope;
use crate::cancel::scope::{Entered, InScope};
use crate::cancel::state::ScopeState;
use crate::error::{Error, FailureGroup, Result};
use crate::runtime::context;
use crate::runtime::scheduler::Runner;
use crate::runtime::task::TaskId;

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// Shared state of one nursery.
///
/// Children hold a reference to it until they exit, so it outlives the
/// `open_nursery` future if that is dropped early.
pub(crate) struct NurseryState {
    owner: TaskId,

    /// Internal scope; status root of every child.
    scope: Rc<ScopeState>,

    /// The owner's status when the nursery was opened.
    outer: Rc<ScopeState>,

    /// Live children and their names.
    children: RefCell<BTreeMap<TaskId, Rc<str>>>,

    /// Real failures, in the order they were recorded.
    failures: RefCell<Vec<Error>>,

    /// Whether the owner is parked waiting for the children.
    joining: Cell<bool>,

    closed: Cell<bool>,
}

impl NurseryState {
    fn open() -> Result<(Rc<Self>, Entered)> {
        let (owner, outer) = context::with_task(|_, task| (task.id(), task.status()))?;
        let scope = ScopeState::new(None, false);
        let entered = Entered::enter(&scope)?;

        tracing::debug!(task = %owner, scope = %scope.id(), "nursery opened");

        let state = Rc::new(Self {
            owner,
            scope,
            outer,
            children: RefCell::new(BTreeMap::new()),
            failures: RefCell::new(Vec::new()),
            joining: Cell::new(false),
            closed: Cell::new(false),
        });

        Ok((state, entered))
    }

    pub(crate) fn owner(&self) -> TaskId {
        self.owner
    }

    /// Called by the scheduler when a child exits.
    pub(crate) fn child_exited(&self, runner: &Runner, child: TaskId, outcome: Result<()>) {
        self.children.borrow_mut().remove(&child);

        if let Err(error) = outcome {
            self.record(Some(runner), error);
        }

        if self.joining.get() && self.children.borrow().is_empty() {
            runner.reschedule(self.owner);
        }
    }

    /// Records how a child or the body ended.
    ///
    /// A real failure cancels the internal scope. Cancellations are not
    /// failures: the nursery's own are dropped, and an enclosing one is
    /// re-raised by [`finish`](Self::finish) while it is still pending.
    fn record(&self, runner: Option<&Runner>, error: Error) {
        if error.is_cancelled() {
            return;
        }

        tracing::debug!(
            task = %self.owner,
            scope = %self.scope.id(),
            error = %error,
            "nursery member failed; cancelling siblings"
        );
        self.failures.borrow_mut().push(error);
        self.scope.cancel(runner);
    }

    /// Turns the collected outcomes into the nursery's result.
    fn finish<T>(&self, value: Option<T>) -> Result<Option<T>> {
        let mut failures = std::mem::take(&mut *self.failures.borrow_mut());

        match failures.len() {
            0 => {}
            1 => return Err(failures.remove(0)),
            _ => return Err(FailureGroup::new(failures).into()),
        }

        if let Some(cancelled) = self.outer.effective_cancel() {
            return Err(cancelled.into());
        }

        Ok(value)
    }
}

/// Handle used to spawn children into a nursery.
///
/// Cloneable, and may be handed to children so they can spawn siblings. It
/// stops accepting tasks once the nursery has joined.
#[derive(Clone)]
pub struct Nursery {
    state: Rc<NurseryState>,
}

impl Nursery {
    /// Spawns a child task.
    ///
    /// # Errors
    ///
    /// - [`Error::NurseryClosed`] once the nursery has joined,
    /// - [`Error::NoRuntime`] outside a runtime.
    pub fn spawn<F>(&self, future: F) -> Result<TaskId>
    where
        F: Future<Output = Result<()>> + 'static,
    {
        self.spawn_task(None, future)
    }

    /// Spawns a child task with a name, reported to instruments and logs.
    pub fn spawn_named<F>(&self, name: &str, future: F) -> Result<TaskId>
    where
        F: Future<Output = Result<()>> + 'static,
    {
        self.spawn_task(Some(name.into()), future)
    }

    fn spawn_task<F>(&self, name: Option<Rc<str>>, future: F) -> Result<TaskId>
    where
        F: Future<Output = Result<()>> + 'static,
    {
        if self.state.closed.get() {
            return Err(Error::NurseryClosed);
        }

        let runner = context::runner().ok_or(Error::NoRuntime)?;
        let task = runner.spawn(
            name,
            Box::pin(future),
            self.state.scope.clone(),
            Some(self.state.clone()),
        );

        let id = task.info().id();
        let name: Rc<str> = task.info().name().into();
        self.state.children.borrow_mut().insert(id, name);

        Ok(id)
    }

    /// The internal scope every child runs in. Cancelling it cancels the
    /// whole nursery, body included.
    pub fn cancel_scope(&self) -> CancelScope {
        CancelScope::from_state(self.state.scope.clone())
    }

    /// The task that opened the nursery.
    pub fn owner(&self) -> TaskId {
        self.state.owner
    }

    /// Number of children still running.
    pub fn child_count(&self) -> usize {
        self.state.children.borrow().len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.get()
    }
}

impl fmt::Debug for Nursery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Nursery")
            .field("owner", &self.state.owner)
            .field("scope", &self.state.scope.id())
            .field("children", &self.child_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Opens a nursery, runs `body` with its handle, and waits for every child.
///
/// The body runs inside the nursery's internal scope. Returns `Ok(None)` if
/// the body itself was stopped by cancelling that scope.
///
/// # Errors
///
/// - the single failure of a child or of the body,
/// - [`Error::Group`] if several failed,
/// - [`Cancelled`](crate::Cancelled) if an enclosing scope was cancelled,
/// - [`Error::NoRuntime`] outside a runtime.
pub async fn open_nursery<F, Fut, T>(body: F) -> Result<Option<T>>
where
    F: FnOnce(Nursery) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let (state, entered) = NurseryState::open()?;
    let abandon = Abandon {
        state: state.clone(),
    };

    let nursery = Nursery {
        state: state.clone(),
    };
    let value = match InScope::new(state.scope.clone(), body(nursery)).await {
        Ok(value) => Some(value),
        Err(error) => {
            state.record(context::runner().as_deref(), error);
            None
        }
    };

    Join { state: &state }.await;

    state.closed.set(true);
    drop(entered);
    drop(abandon);

    tracing::debug!(task = %state.owner, scope = %state.scope.id(), "nursery closed");
    state.finish(value)
}

/// Parks the owner until the last child has exited.
///
/// Not a checkpoint: cancellation of the owner is delivered after the join.
struct Join<'a> {
    state: &'a NurseryState,
}

impl Future for Join<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.state.children.borrow().is_empty() {
            self.state.joining.set(false);
            return Poll::Ready(());
        }

        self.state.joining.set(true);
        Poll::Pending
    }
}

/// Cancels the children of a nursery whose `open_nursery` future was dropped
/// before it joined.
struct Abandon {
    state: Rc<NurseryState>,
}

impl Drop for Abandon {
    fn drop(&mut self) {
        if self.state.closed.replace(true) {
            return;
        }

        let orphans: Vec<Rc<str>> = self.state.children.borrow().values().cloned().collect();
        if !orphans.is_empty() {
            tracing::warn!(
                task = %self.state.owner,
                orphans = ?orphans,
                "nursery dropped before its children finished; cancelling them"
            );
        }

        self.state.scope.cancel(context::runner().as_deref());
    }
}
