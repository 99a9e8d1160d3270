use super::core::Runtime;
use crate::error::Result;
use crate::instrument::Instrument;
use crate::io::{self, IoWait};
use crate::time::{Clock, MockClock, SystemClock};

use std::rc::Rc;

/// Builder for configuring and creating a runtime.
///
/// `RuntimeBuilder` allows customizing runtime parameters before
/// constructing the runtime:
/// - the clock ([`SystemClock`] by default),
/// - the I/O adapter (`poll(2)` on unix by default),
/// - instruments installed before the first task runs.
///
/// # Examples
///
/// ```rust,ignore
/// let runtime = RuntimeBuilder::new()
///     .autojump_clock()
///     .instrument(Rc::new(LogInstrument::new()))
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    clock: Rc<dyn Clock>,
    io: Option<Box<dyn IoWait>>,
    instruments: Vec<Rc<dyn Instrument>>,
}

impl RuntimeBuilder {
    /// Creates a new `RuntimeBuilder` with default configuration.
    pub fn new() -> Self {
        Self {
            clock: Rc::new(SystemClock),
            io: None,
            instruments: Vec::new(),
        }
    }

    /// Sets the clock used for timers and deadlines.
    ///
    /// Pass a clone of a [`MockClock`] to keep control of time from the test.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Rc::new(clock);
        self
    }

    /// Uses a frozen [`MockClock`].
    pub fn mock_clock(self) -> Self {
        self.clock(MockClock::new())
    }

    /// Uses an autojumping [`MockClock`].
    pub fn autojump_clock(self) -> Self {
        self.clock(MockClock::new().autojump())
    }

    /// Sets the I/O adapter.
    pub fn io(mut self, io: impl IoWait + 'static) -> Self {
        self.io = Some(Box::new(io));
        self
    }

    /// Installs an instrument before the run starts, so it sees `BeforeRun`.
    pub fn instrument<I: Instrument + 'static>(mut self, instrument: Rc<I>) -> Self {
        self.instruments.push(instrument);
        self
    }

    /// Builds the runtime with the configured options.
    ///
    /// # Errors
    ///
    /// Fails if the default I/O adapter cannot be created.
    pub fn build(self) -> Result<Runtime> {
        let io = match self.io {
            Some(io) => io,
            None => io::default_io()?,
        };

        Ok(Runtime::new(self.clock, io, self.instruments))
    }
}

impl Default for RuntimeBuilder {
    /// Creates a default `RuntimeBuilder`.
    fn default() -> Self {
        Self::new()
    }
}
