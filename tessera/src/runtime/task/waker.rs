use super::TaskId;
use crate::io::Notify;

use parking_lot::Mutex;
use std::sync::Arc;
use std::task::{Wake, Waker};

/// Queue of tasks woken through their [`Waker`].
///
/// Wakers may fire from any thread, so this is the only scheduler state
/// behind a lock. The scheduler drains it once per loop iteration.
pub(crate) struct WakeQueue {
    queue: Mutex<Vec<TaskId>>,
    notifier: Arc<dyn Notify>,
}

impl WakeQueue {
    pub(crate) fn new(notifier: Arc<dyn Notify>) -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
            notifier,
        }
    }

    /// Pushes a task id and interrupts the I/O wait.
    ///
    /// The notifier only fires on the empty to non-empty transition; the
    /// scheduler drains the whole queue after every wait.
    pub(crate) fn push(&self, id: TaskId) {
        let was_empty = {
            let mut queue = self.queue.lock();
            let was_empty = queue.is_empty();
            queue.push(id);
            was_empty
        };

        if was_empty {
            self.notifier.notify();
        }
    }

    pub(crate) fn drain(&self) -> Vec<TaskId> {
        std::mem::take(&mut *self.queue.lock())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

struct TaskWaker {
    id: TaskId,
    queue: Arc<WakeQueue>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.queue.push(self.id);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.queue.push(self.id);
    }
}

/// Creates the [`Waker`] handed to a task's future on every poll.
pub(crate) fn make_waker(id: TaskId, queue: Arc<WakeQueue>) -> Waker {
    Waker::from(Arc::new(TaskWaker { id, queue }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingNotify(AtomicUsize);

    impl Notify for CountingNotify {
        fn notify(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn notifies_once_per_batch() {
        let notify = Arc::new(CountingNotify::default());
        let queue = Arc::new(WakeQueue::new(notify.clone()));
        let waker = make_waker(TaskId::from_raw(3), queue.clone());

        waker.wake_by_ref();
        waker.clone().wake();
        assert_eq!(notify.0.load(Ordering::SeqCst), 1);

        assert_eq!(queue.drain(), vec![TaskId::from_raw(3), TaskId::from_raw(3)]);
        assert!(queue.is_empty());

        std::thread::spawn(move || waker.wake()).join().unwrap();
        assert_eq!(notify.0.load(Ordering::SeqCst), 2);
    }
}
