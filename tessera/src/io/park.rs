use super::{Interest, IoEvent, IoWait, Notify, RawFd};

use parking_lot::{Condvar, Mutex};
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Portable backend that parks the scheduler thread on a condition variable.
///
/// It cannot watch descriptors: waiting on any fails with
/// [`io::ErrorKind::Unsupported`].
pub struct ParkWait {
    signal: Arc<ParkSignal>,
}

#[derive(Default)]
struct ParkSignal {
    notified: Mutex<bool>,
    condvar: Condvar,
}

impl Notify for ParkSignal {
    fn notify(&self) {
        *self.notified.lock() = true;
        self.condvar.notify_one();
    }
}

impl ParkWait {
    pub fn new() -> Self {
        Self {
            signal: Arc::new(ParkSignal::default()),
        }
    }
}

impl Default for ParkWait {
    fn default() -> Self {
        Self::new()
    }
}

impl IoWait for ParkWait {
    fn wait(
        &mut self,
        timeout: Option<Duration>,
        interests: &[(RawFd, Interest)],
        _ready: &mut Vec<IoEvent>,
    ) -> io::Result<()> {
        if !interests.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "ParkWait cannot wait on file descriptors",
            ));
        }

        let mut notified = self.signal.notified.lock();
        if !*notified {
            match timeout {
                Some(timeout) if timeout.is_zero() => {}
                Some(timeout) => {
                    self.signal.condvar.wait_for(&mut notified, timeout);
                }
                None => self.signal.condvar.wait(&mut notified),
            }
        }
        *notified = false;

        Ok(())
    }

    fn notifier(&self) -> Arc<dyn Notify> {
        self.signal.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn notify_from_another_thread_ends_the_wait() {
        let mut park = ParkWait::new();
        let notifier = park.notifier();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            notifier.notify();
        });

        let start = Instant::now();
        park.wait(None, &[], &mut Vec::new()).unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));

        handle.join().unwrap();
    }

    #[test]
    fn descriptors_are_rejected() {
        let mut park = ParkWait::new();
        let err = park
            .wait(Some(Duration::ZERO), &[(0, Interest::Readable)], &mut Vec::new())
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}
