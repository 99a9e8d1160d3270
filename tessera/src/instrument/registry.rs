use super::{Hook, Instrument};
use crate::error::{Error, Result};

use std::any::Any;
use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

type Handle = Rc<dyn Instrument>;

/// Installed instruments plus, per hook, the ones that implement it.
///
/// The per-hook lists are rebuilt on every install and removal, so firing
/// never has to look at an instrument that does not care about the hook.
#[derive(Default)]
pub(crate) struct Registry {
    installed: RefCell<Vec<Handle>>,
    dispatch: RefCell<[Vec<Handle>; Hook::COUNT]>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, instrument: Handle) {
        let mut installed = self.installed.borrow_mut();
        if installed.iter().any(|i| Rc::ptr_eq(i, &instrument)) {
            return;
        }

        tracing::debug!(instrument = instrument.name(), hooks = ?instrument.hooks(), "instrument installed");
        installed.push(instrument);
        self.rebuild(&installed);
    }

    pub(crate) fn remove(&self, instrument: &Handle) -> Result<()> {
        let mut installed = self.installed.borrow_mut();
        let position = installed
            .iter()
            .position(|i| Rc::ptr_eq(i, instrument))
            .ok_or(Error::UnknownInstrument)?;

        installed.remove(position);
        self.rebuild(&installed);

        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.installed.borrow().len()
    }

    fn rebuild(&self, installed: &[Handle]) {
        let mut dispatch = self.dispatch.borrow_mut();
        for hook in Hook::ALL {
            dispatch[hook.index()] = installed
                .iter()
                .filter(|i| i.hooks().contains(hook))
                .cloned()
                .collect();
        }
    }

    /// Calls `call` on every instrument implementing `hook`.
    ///
    /// An instrument that panics is logged and uninstalled once delivery to
    /// the others is done.
    pub(crate) fn fire(&self, hook: Hook, call: impl Fn(&dyn Instrument)) {
        let targets = {
            let dispatch = self.dispatch.borrow();
            let targets = &dispatch[hook.index()];
            if targets.is_empty() {
                return;
            }
            targets.clone()
        };

        let mut broken = Vec::new();
        for instrument in targets {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| call(instrument.as_ref()))) {
                tracing::error!(
                    instrument = instrument.name(),
                    hook = %hook,
                    panic = panic_message(&*panic),
                    "instrument panicked; uninstalling it"
                );
                broken.push(instrument);
            }
        }

        for instrument in broken {
            let _ = self.remove(&instrument);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}
