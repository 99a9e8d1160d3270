use super::{Core, ProducerState};
use crate::error::{Error, FinalizeError};
use crate::runtime::context;

use std::task::{Context, Poll, Waker};

/// A producer as seen by the task that tracks it.
pub(crate) trait Finalize {
    /// Whether closing the producer still has anything to do.
    fn needs_finalization(&self) -> bool;

    /// Synchronous two-phase close; a no-op on a closed producer.
    fn finalize(&self) -> Result<(), FinalizeError>;
}

impl<T> Finalize for Core<T> {
    fn needs_finalization(&self) -> bool {
        !matches!(
            self.shared.state.get(),
            ProducerState::Finished | ProducerState::Closed
        )
    }

    fn finalize(&self) -> Result<(), FinalizeError> {
        match self.shared.state.get() {
            ProducerState::Closed => Ok(()),
            ProducerState::Suspended => self.finalize_suspended(),
            ProducerState::Running => {
                // Being polled further up this stack; its next emit fails.
                self.shared.closing.set(true);
                Ok(())
            }
            ProducerState::Fresh | ProducerState::Awaiting | ProducerState::Finished => {
                self.close_without_resuming();
                Ok(())
            }
        }
    }
}

impl<T> Core<T> {
    fn finalize_suspended(&self) -> Result<(), FinalizeError> {
        if let Some(scope) = self.shared.yielded_in.get() {
            self.close_without_resuming();
            return Err(FinalizeError::ScopeCrossingYield { scope });
        }

        let Some(mut body) = self.body.borrow_mut().take() else {
            self.close_without_resuming();
            return Ok(());
        };

        self.shared.closing.set(true);
        self.shared.state.set(ProducerState::Closed);

        let polled = finalizing(|| {
            let mut cx = Context::from_waker(Waker::noop());
            let polled = body.as_mut().poll(&mut cx);
            drop(body);
            polled
        });

        if self.shared.emitted_while_closing.get() {
            return Err(FinalizeError::IgnoredClose);
        }

        match polled {
            Poll::Ready(Ok(()) | Err(Error::ProducerClosed | Error::Cancelled(_))) => Ok(()),
            Poll::Ready(Err(error)) => Err(FinalizeError::Failed(Box::new(error))),
            Poll::Pending => Err(FinalizeError::SuspendedDuringFinalization),
        }
    }
}

/// Runs `f` with the current task, if any, marked as finalizing, so that
/// checkpoints reached by `f` stay pending instead of suspending the task.
fn finalizing<R>(f: impl FnOnce() -> R) -> R {
    let Some(task) = context::task() else {
        return f();
    };

    let previous = task.set_finalizing(true);
    let out = f();
    task.set_finalizing(previous);

    out
}
