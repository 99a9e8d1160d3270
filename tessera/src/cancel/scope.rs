use super::ScopeId;
use super::state::ScopeState;
use crate::error::{Error, Result};
use crate::runtime::context;
use crate::runtime::task::{Task, TaskId};

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Instant;

/// A region of a task that can be cancelled as a unit.
///
/// Create a scope, then run a body inside it with [`run`](Self::run). The
/// handle can be cloned and kept elsewhere to [`cancel`](Self::cancel) the
/// scope or move its deadline while the body runs.
///
/// # Examples
///
/// ```rust,ignore
/// let scope = CancelScope::new();
///
/// tessera::open_nursery(|nursery| {
///     let scope = scope.clone();
///     async move {
///         nursery.spawn(async move {
///             tessera::sleep(Duration::from_secs(1)).await?;
///             scope.cancel();
///             Ok(())
///         })?;
///         Ok(())
///     }
/// });
///
/// let finished = scope.run(tessera::sleep_forever()).await?;
/// assert!(finished.is_none());
/// assert!(scope.cancelled_caught());
/// ```
#[derive(Clone)]
pub struct CancelScope {
    state: Rc<ScopeState>,
}

impl CancelScope {
    /// Creates a scope with no deadline.
    pub fn new() -> Self {
        Self {
            state: ScopeState::new(None, false),
        }
    }

    /// Creates a scope that cancels itself once the clock reaches `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            state: ScopeState::new(Some(deadline), false),
        }
    }

    /// Makes the scope shielded.
    pub fn shielded(self) -> Self {
        self.set_shield(true);
        self
    }

    pub(crate) fn from_state(state: Rc<ScopeState>) -> Self {
        Self { state }
    }

    pub fn id(&self) -> ScopeId {
        self.state.id()
    }

    /// Cancels the scope.
    ///
    /// Every task inside it, or inside a nursery opened within it, is
    /// rescheduled and fails with [`Cancelled`](crate::Cancelled) at its next
    /// checkpoint. Cancelling a scope that has not been entered yet makes its
    /// body fail at its first checkpoint. Idempotent.
    pub fn cancel(&self) {
        let runner = context::runner();
        self.state.cancel(runner.as_deref());
    }

    /// Whether [`cancel`](Self::cancel) was called or the deadline expired.
    pub fn cancel_called(&self) -> bool {
        self.state.cancel_called()
    }

    /// Whether the body ended with this scope's own cancellation.
    pub fn cancelled_caught(&self) -> bool {
        self.state.cancelled_caught()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.state.deadline()
    }

    /// Moves the deadline; `None` removes it.
    ///
    /// A deadline already in the past cancels the scope the next time the
    /// scheduler looks at the clock.
    pub fn set_deadline(&self, deadline: Option<Instant>) {
        let runner = context::runner();
        self.state.set_deadline(deadline, runner.as_deref());
    }

    pub fn shield(&self) -> bool {
        self.state.shield()
    }

    /// A shielded scope hides cancellation of enclosing scopes from the tasks
    /// inside it. Its own cancellation still applies.
    pub fn set_shield(&self, shield: bool) {
        let runner = context::runner();
        self.state.set_shield(shield, runner.as_deref());
    }

    /// Runs `body` inside this scope.
    ///
    /// Returns `Ok(Some(value))` if the body completed, and `Ok(None)` if it
    /// failed with a cancellation this scope initiated. Any other error,
    /// including cancellation of an enclosing scope, is returned unchanged.
    ///
    /// # Errors
    ///
    /// - [`Error::ScopeReentered`] if the scope was already entered,
    /// - [`Error::NoRuntime`] outside a running task,
    /// - whatever `body` fails with.
    pub async fn run<F, T>(&self, body: F) -> Result<Option<T>>
    where
        F: Future<Output = Result<T>>,
    {
        let entered = Entered::enter(&self.state)?;
        let result = InScope::new(self.state.clone(), body).await;
        drop(entered);

        match result {
            Ok(value) => Ok(Some(value)),
            Err(Error::Cancelled(cancelled)) if cancelled.scope() == self.id() => {
                self.state.set_cancelled_caught();
                tracing::debug!(scope = %self.id(), "cancel scope caught its cancellation");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelScope")
            .field("id", &self.id())
            .field("deadline", &self.deadline())
            .field("shield", &self.shield())
            .field("cancel_called", &self.cancel_called())
            .finish()
    }
}

/// Registration of the current task inside a scope.
///
/// Dropping it exits the scope, also when the enclosing future is dropped
/// before the body finished.
pub(crate) struct Entered {
    state: Rc<ScopeState>,
    task: TaskId,
}

impl Entered {
    pub(crate) fn enter(state: &Rc<ScopeState>) -> Result<Self> {
        context::with_task(|runner, task| {
            state.enter(&task.status(), task.id())?;
            runner.register_deadline(state);

            Ok(Self {
                state: state.clone(),
                task: task.id(),
            })
        })?
    }
}

impl Drop for Entered {
    fn drop(&mut self) {
        self.state.exit(self.task);
    }
}

/// Polls a future with `status` as the current task's innermost scope.
///
/// The previous status is restored after every poll, so whatever polls this
/// future (a combinator, a producer) sees its own status again afterwards.
pub(crate) struct InScope<F> {
    status: Rc<ScopeState>,
    future: Pin<Box<F>>,
}

impl<F: Future> InScope<F> {
    pub(crate) fn new(status: Rc<ScopeState>, future: F) -> Self {
        Self {
            status,
            future: Box::pin(future),
        }
    }
}

impl<F: Future> Future for InScope<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;

        let Some(task) = context::task() else {
            return this.future.as_mut().poll(cx);
        };

        let _restore = RestoreStatus {
            previous: Some(task.replace_status(this.status.clone())),
            task: &task,
        };

        this.future.as_mut().poll(cx)
    }
}

struct RestoreStatus<'a> {
    task: &'a Task,
    previous: Option<Rc<ScopeState>>,
}

impl Drop for RestoreStatus<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.task.replace_status(previous);
        }
    }
}
