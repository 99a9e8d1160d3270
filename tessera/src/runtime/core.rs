use super::context;
use super::scheduler::Runner;
use crate::error::{Error, Result};
use crate::instrument::Instrument;
use crate::io::IoWait;
use crate::time::Clock;

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

/// The main runtime handle.
///
/// `Runtime` is responsible for:
/// - creating the scheduler state for each run,
/// - running the main future as the root task until it and every task it
///   transitively spawned have exited,
/// - lending its clock, I/O adapter and initial instruments to the run.
///
/// A runtime can run several futures one after the other, but not one inside
/// another.
pub struct Runtime {
    clock: Rc<dyn Clock>,

    /// Lent to the runner for the duration of a run.
    io: RefCell<Option<Box<dyn IoWait>>>,

    instruments: Vec<Rc<dyn Instrument>>,
}

impl Runtime {
    pub(crate) fn new(
        clock: Rc<dyn Clock>,
        io: Box<dyn IoWait>,
        instruments: Vec<Rc<dyn Instrument>>,
    ) -> Self {
        Self {
            clock,
            io: RefCell::new(Some(io)),
            instruments,
        }
    }

    /// Runs a fallible future as the main task, blocking the current thread.
    ///
    /// Returns once the main task and all of its descendants have exited.
    ///
    /// # Errors
    ///
    /// - the main task's own failure,
    /// - [`Error::NestedRun`] if a run is already in progress on this thread,
    /// - [`Error::Io`] if the I/O adapter fails.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let runtime = RuntimeBuilder::new().build()?;
    /// let answer = runtime.run(async {
    ///     tessera::sleep(Duration::from_millis(10)).await?;
    ///     Ok(42)
    /// })?;
    /// assert_eq!(answer, 42);
    /// ```
    pub fn run<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + 'static,
        T: 'static,
    {
        if context::is_active() {
            return Err(Error::NestedRun);
        }

        let io = self.io.borrow_mut().take().ok_or(Error::NestedRun)?;
        let runner = Rc::new(Runner::new(self.clock.clone(), io, &self.instruments));

        let slot = Rc::new(RefCell::new(None));
        let main = {
            let slot = slot.clone();
            async move {
                let value = future.await?;
                *slot.borrow_mut() = Some(value);
                Ok(())
            }
        };

        let outcome = context::enter_runner(runner.clone(), || runner.run(Box::pin(main)));
        *self.io.borrow_mut() = runner.take_io();

        outcome?;
        slot.borrow_mut().take().ok_or(Error::Unfinished)
    }

    /// Runs a future to completion, blocking the current thread.
    ///
    /// Like [`run`](Self::run) for futures that cannot fail themselves; the
    /// outer `Result` only reports runtime failures.
    pub fn block_on<F>(&self, future: F) -> Result<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        self.run(async move { Ok(future.await) })
    }
}
