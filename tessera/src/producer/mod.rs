//! Generator-style producers.
//!
//! [`producer`] turns an async body into a [`Producer`] that hands out values
//! one at a time. The body emits values through a [`Yielder`] and is resumed
//! only when the consumer asks for the next one:
//!
//! ```rust,ignore
//! let mut ticks = tessera::producer(|y| async move {
//!     for n in 0.. {
//!         tessera::sleep(Duration::from_secs(1)).await?;
//!         y.emit(n).await?;
//!     }
//!     Ok(())
//! });
//!
//! while let Some(n) = ticks.next().await? {
//!     if n == 3 {
//!         break;
//!     }
//! }
//! ```
//!
//! A producer left suspended at an `emit` holds whatever cleanup its body
//! still has to run. Every producer created inside a task is tracked by that
//! task, and when the task exits each tracked producer that is not closed yet
//! is finalized: resumed once with `emit` failing with
//! [`Error::ProducerClosed`], so the body unwinds through its cleanup. The
//! body must not suspend again while doing so. See [`Producer::finalize`]
//! for the defects this can report.

mod finalize;

pub(crate) use finalize::Finalize;

use crate::cancel::ScopeId;
use crate::error::{Error, FinalizeError, Result};
use crate::runtime::context;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::{Future, poll_fn};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// Where a producer's body currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    /// Created, never resumed.
    Fresh,
    /// Being polled right now.
    Running,
    /// Stopped at an `emit`, waiting for the consumer.
    Suspended,
    /// Stopped at some other await inside the body.
    Awaiting,
    /// The body returned.
    Finished,
    /// Closed; the body was dropped.
    Closed,
}

type Body = Pin<Box<dyn Future<Output = Result<()>>>>;

/// State shared between the producer handle and its yielder.
struct Shared<T> {
    slot: RefCell<Option<T>>,
    state: Cell<ProducerState>,

    /// Set while the body is being resumed to close.
    closing: Cell<bool>,

    /// The body tried to emit after it was asked to close.
    emitted_while_closing: Cell<bool>,

    /// Innermost scope of the consumer at the latest resume.
    resumed_in: Cell<Option<ScopeId>>,

    /// Scope the latest `emit` happened in, if it differs from `resumed_in`.
    yielded_in: Cell<Option<ScopeId>>,
}

struct Core<T> {
    shared: Rc<Shared<T>>,
    body: RefCell<Option<Body>>,
}

impl<T> Core<T> {
    /// Drops the body without resuming it.
    fn close_without_resuming(&self) {
        let body = self.body.borrow_mut().take();
        self.shared.state.set(ProducerState::Closed);
        self.shared.slot.borrow_mut().take();
        drop(body);
    }

    /// Resumes the body while it is being closed asynchronously.
    fn poll_closing(&self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let mut body = self.body.borrow_mut();
        let Some(future) = body.as_mut() else {
            return Poll::Ready(Ok(()));
        };

        self.shared.state.set(ProducerState::Running);
        let polled = future.as_mut().poll(cx);
        self.shared.state.set(match polled {
            Poll::Ready(_) => ProducerState::Finished,
            Poll::Pending => ProducerState::Awaiting,
        });

        polled
    }
}

/// Creates a producer from an async body.
///
/// The body does not start until the first [`Producer::next`]. Called inside
/// a task, the producer is tracked by that task and finalized when the task
/// exits.
pub fn producer<T, F, Fut>(body: F) -> Producer<T>
where
    T: 'static,
    F: FnOnce(Yielder<T>) -> Fut,
    Fut: Future<Output = Result<()>> + 'static,
{
    let shared = Rc::new(Shared {
        slot: RefCell::new(None),
        state: Cell::new(ProducerState::Fresh),
        closing: Cell::new(false),
        emitted_while_closing: Cell::new(false),
        resumed_in: Cell::new(None),
        yielded_in: Cell::new(None),
    });

    let yielder = Yielder {
        shared: shared.clone(),
    };
    let core = Rc::new(Core {
        shared,
        body: RefCell::new(Some(Box::pin(body(yielder)))),
    });

    if let Some(task) = context::task() {
        task.track_producer(core.clone());
    }

    Producer { core }
}

/// Consumer side of a producer.
pub struct Producer<T> {
    core: Rc<Core<T>>,
}

impl<T: 'static> Producer<T> {
    /// Resumes the body until it emits a value, returns, or fails.
    ///
    /// Returns `Ok(Some(value))` for an emitted value and `Ok(None)` once the
    /// body returned or the producer was closed.
    pub fn next(&mut self) -> Next<'_, T> {
        Next { core: &self.core }
    }

    pub fn state(&self) -> ProducerState {
        self.core.shared.state.get()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ProducerState::Closed
    }

    /// Closes the producer, letting the body await during its cleanup.
    ///
    /// A body suspended at `emit` is resumed with `emit` failing with
    /// [`Error::ProducerClosed`]; any other body is dropped. Closing a closed
    /// producer does nothing.
    ///
    /// # Errors
    ///
    /// - [`FinalizeError::ScopeCrossingYield`] if the body is suspended
    ///   inside a cancel scope or nursery it opened; it is dropped unresumed,
    /// - [`FinalizeError::IgnoredClose`] if the body emitted again,
    /// - [`FinalizeError::Failed`] if the cleanup failed,
    /// - [`Cancelled`](crate::Cancelled) if the cleanup was cancelled.
    pub async fn aclose(&mut self) -> Result<()> {
        let core = &self.core;
        match core.shared.state.get() {
            ProducerState::Closed => return Ok(()),
            ProducerState::Suspended => {}
            _ => {
                core.close_without_resuming();
                return Ok(());
            }
        }

        if let Some(scope) = core.shared.yielded_in.get() {
            core.close_without_resuming();
            return Err(FinalizeError::ScopeCrossingYield { scope }.into());
        }

        core.shared.closing.set(true);
        core.shared.resumed_in.set(current_scope());
        let result = poll_fn(|cx| core.poll_closing(cx)).await;
        core.close_without_resuming();

        if core.shared.emitted_while_closing.get() {
            return Err(FinalizeError::IgnoredClose.into());
        }

        match result {
            Ok(()) | Err(Error::ProducerClosed) => Ok(()),
            Err(Error::Cancelled(cancelled)) => Err(cancelled.into()),
            Err(error) => Err(FinalizeError::Failed(Box::new(error)).into()),
        }
    }

    /// Closes the producer without awaiting.
    ///
    /// This is what runs for every tracked producer when its task exits. A
    /// body suspended at `emit` is resumed exactly once to run its cleanup;
    /// it must finish without suspending. A body stopped at any other await
    /// is dropped. Closing a closed producer does nothing.
    ///
    /// # Errors
    ///
    /// [`Error::Finalization`] with:
    /// - [`FinalizeError::ScopeCrossingYield`] if the body is suspended
    ///   inside a cancel scope or nursery it opened; it is dropped unresumed,
    /// - [`FinalizeError::SuspendedDuringFinalization`] if the cleanup tried
    ///   to suspend,
    /// - [`FinalizeError::IgnoredClose`] if the body emitted again,
    /// - [`FinalizeError::Failed`] if the cleanup failed.
    pub fn finalize(&self) -> Result<()> {
        Finalize::finalize(&*self.core).map_err(Error::from)
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("state", &self.core.shared.state.get())
            .finish()
    }
}

/// Future returned by [`Producer::next`].
pub struct Next<'a, T> {
    core: &'a Core<T>,
}

impl<T> Future for Next<'_, T> {
    type Output = Result<Option<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let core = self.core;
        let shared = &core.shared;

        if matches!(
            shared.state.get(),
            ProducerState::Finished | ProducerState::Closed
        ) {
            return Poll::Ready(Ok(None));
        }

        let mut body = core.body.borrow_mut();
        let Some(future) = body.as_mut() else {
            return Poll::Ready(Ok(None));
        };

        shared.resumed_in.set(current_scope());
        shared.state.set(ProducerState::Running);

        match future.as_mut().poll(cx) {
            Poll::Ready(result) => {
                *body = None;
                shared.state.set(ProducerState::Finished);
                Poll::Ready(result.map(|()| None))
            }
            Poll::Pending => match shared.slot.borrow_mut().take() {
                Some(value) => {
                    shared.state.set(ProducerState::Suspended);
                    Poll::Ready(Ok(Some(value)))
                }
                None => {
                    shared.state.set(ProducerState::Awaiting);
                    Poll::Pending
                }
            },
        }
    }
}

/// Producer side: emits values to the consumer.
pub struct Yielder<T> {
    shared: Rc<Shared<T>>,
}

impl<T> Yielder<T> {
    /// Hands `value` to the consumer and suspends until the next resume.
    ///
    /// # Errors
    ///
    /// [`Error::ProducerClosed`] when the producer is being closed. Propagate
    /// it with `?` after any cleanup; emitting again is a defect.
    pub fn emit(&self, value: T) -> Emit<'_, T> {
        Emit {
            shared: &self.shared,
            value: Some(value),
        }
    }

    /// Whether the producer is being closed.
    pub fn is_closing(&self) -> bool {
        self.shared.closing.get()
    }
}

/// Future returned by [`Yielder::emit`].
pub struct Emit<'a, T> {
    shared: &'a Shared<T>,
    value: Option<T>,
}

// The value is moved out, never pinned.
impl<T> Unpin for Emit<'_, T> {}

impl<T> Future for Emit<'_, T> {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let shared = self.shared;

        let Some(value) = self.value.take() else {
            return if shared.closing.get() {
                Poll::Ready(Err(Error::ProducerClosed))
            } else {
                Poll::Ready(Ok(()))
            };
        };

        if shared.closing.get() {
            shared.emitted_while_closing.set(true);
            return Poll::Ready(Err(Error::ProducerClosed));
        }

        let here = current_scope();
        shared
            .yielded_in
            .set(if here != shared.resumed_in.get() { here } else { None });
        *shared.slot.borrow_mut() = Some(value);

        Poll::Pending
    }
}

fn current_scope() -> Option<ScopeId> {
    context::task().map(|task| task.status().id())
}
