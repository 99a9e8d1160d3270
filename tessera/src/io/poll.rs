//! `poll(2)`-based backend.
//!
//! The wait set is rebuilt on every call from the interests the scheduler
//! passes in, so nothing has to be registered or deregistered. A non-blocking
//! self-pipe is always polled first; writing a byte to it is how other threads
//! interrupt the wait.

use super::{Interest, IoEvent, IoWait, Notify, RawFd};

use libc::{F_GETFL, F_SETFD, F_SETFL, FD_CLOEXEC, O_NONBLOCK, POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT};
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Unix backend built on `poll(2)`.
pub struct PollWait {
    /// Read end of the self-pipe.
    wake_read: RawFd,

    /// Write end, owned by the notifier so wakers never outlive it.
    notify: Arc<PipeNotify>,

    /// Reusable `pollfd` buffer.
    fds: Vec<libc::pollfd>,
}

struct PipeNotify {
    wake_write: RawFd,

    /// Set while a wake byte is in flight, so a burst of wakes writes once.
    pending: AtomicBool,
}

impl Notify for PipeNotify {
    fn notify(&self) {
        if !self.pending.swap(true, Ordering::AcqRel) {
            let _ = sys_write(self.wake_write, &[1]);
        }
    }
}

impl Drop for PipeNotify {
    fn drop(&mut self) {
        sys_close(self.wake_write);
    }
}

impl PollWait {
    /// Creates the backend and its self-pipe.
    pub fn new() -> io::Result<Self> {
        let (wake_read, wake_write) = sys_pipe()?;

        Ok(Self {
            wake_read,
            notify: Arc::new(PipeNotify {
                wake_write,
                pending: AtomicBool::new(false),
            }),
            fds: Vec::new(),
        })
    }

    fn drain_wake_pipe(&self) {
        self.notify.pending.store(false, Ordering::Release);

        let mut buffer = [0u8; 64];
        while sys_read(self.wake_read, &mut buffer) > 0 {}
    }
}

impl IoWait for PollWait {
    fn wait(
        &mut self,
        timeout: Option<Duration>,
        interests: &[(RawFd, Interest)],
        ready: &mut Vec<IoEvent>,
    ) -> io::Result<()> {
        let mut merged: BTreeMap<RawFd, libc::c_short> = BTreeMap::new();
        for &(fd, interest) in interests {
            let flag = match interest {
                Interest::Readable => POLLIN,
                Interest::Writable => POLLOUT,
            };
            *merged.entry(fd).or_default() |= flag;
        }

        self.fds.clear();
        self.fds.push(libc::pollfd {
            fd: self.wake_read,
            events: POLLIN,
            revents: 0,
        });
        self.fds.extend(merged.into_iter().map(|(fd, events)| libc::pollfd {
            fd,
            events,
            revents: 0,
        }));

        let rc = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                timeout_ms(timeout),
            )
        };

        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        if self.fds[0].revents != 0 {
            self.drain_wake_pipe();
        }

        for pfd in &self.fds[1..] {
            if pfd.revents == 0 {
                continue;
            }

            let failed = pfd.revents & (POLLERR | POLLHUP | POLLNVAL) != 0;
            ready.push(IoEvent {
                fd: pfd.fd,
                readable: failed || pfd.revents & POLLIN != 0,
                writable: failed || pfd.revents & POLLOUT != 0,
            });
        }

        Ok(())
    }

    fn notifier(&self) -> Arc<dyn Notify> {
        self.notify.clone()
    }
}

impl Drop for PollWait {
    fn drop(&mut self) {
        sys_close(self.wake_read);
    }
}

/// Rounds up so a pending deadline is never woken for early.
fn timeout_ms(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(timeout) => {
            let mut ms = timeout.as_millis();
            if Duration::from_millis(ms as u64) < timeout {
                ms += 1;
            }
            ms.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}

fn sys_pipe() -> io::Result<(RawFd, RawFd)> {
    let mut fds = [0 as RawFd; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        return Err(io::Error::last_os_error());
    }

    for fd in fds {
        if let Err(e) = sys_set_nonblocking_cloexec(fd) {
            sys_close(fds[0]);
            sys_close(fds[1]);
            return Err(e);
        }
    }

    Ok((fds[0], fds[1]))
}

fn sys_set_nonblocking_cloexec(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    if unsafe { libc::fcntl(fd, F_SETFL, flags | O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }

    if unsafe { libc::fcntl(fd, F_SETFD, FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

fn sys_read(fd: RawFd, buffer: &mut [u8]) -> isize {
    unsafe { libc::read(fd, buffer.as_mut_ptr() as *mut _, buffer.len()) }
}

fn sys_write(fd: RawFd, buffer: &[u8]) -> isize {
    unsafe { libc::write(fd, buffer.as_ptr() as *const _, buffer.len()) }
}

fn sys_close(fd: RawFd) {
    unsafe { libc::close(fd) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_rounds_up_to_whole_milliseconds() {
        assert_eq!(timeout_ms(None), -1);
        assert_eq!(timeout_ms(Some(Duration::ZERO)), 0);
        assert_eq!(timeout_ms(Some(Duration::from_micros(1))), 1);
        assert_eq!(timeout_ms(Some(Duration::from_millis(20))), 20);
    }

    #[test]
    fn notify_interrupts_an_unbounded_wait() {
        let mut poll = PollWait::new().unwrap();
        poll.notifier().notify();
        poll.notifier().notify();

        let mut ready = Vec::new();
        poll.wait(None, &[], &mut ready).unwrap();
        assert!(ready.is_empty());

        // The pipe was drained: a zero timeout now returns immediately.
        poll.wait(Some(Duration::ZERO), &[], &mut ready).unwrap();
        assert!(ready.is_empty());
    }

    #[test]
    fn reports_readable_pipe() {
        let (read, write) = sys_pipe().unwrap();
        let mut poll = PollWait::new().unwrap();
        let interests = [(read, Interest::Readable), (write, Interest::Writable)];

        let mut ready = Vec::new();
        poll.wait(Some(Duration::ZERO), &interests, &mut ready).unwrap();
        assert_eq!(
            ready,
            vec![IoEvent { fd: write, readable: false, writable: true }]
        );

        assert_eq!(sys_write(write, b"x"), 1);
        ready.clear();
        poll.wait(Some(Duration::ZERO), &interests, &mut ready).unwrap();
        assert!(ready.iter().any(|e| e.fd == read && e.readable));

        sys_close(read);
        sys_close(write);
    }
}
