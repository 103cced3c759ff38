//! `epoll` backend for the [`crate::poller::Poller`].
//!
//! Grounded in `mio`'s `sys::unix::selector::epoll` (`epoll_create1` +
//! `EPOLL_CTL_{ADD,MOD,DEL}` + `epoll_wait`), adapted for level-triggered
//! readiness: no `EPOLLET` is ever set, so the kernel keeps reporting a
//! descriptor as ready until the application drains it.

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use super::syscall;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Interest {
    pub(crate) readable: bool,
    pub(crate) writable: bool,
}

impl Interest {
    pub(crate) const NONE: Interest = Interest {
        readable: false,
        writable: false,
    };
    pub(crate) const READABLE: Interest = Interest {
        readable: true,
        writable: false,
    };
    pub(crate) const WRITABLE: Interest = Interest {
        readable: false,
        writable: true,
    };

    pub(crate) fn is_none(&self) -> bool {
        !self.readable && !self.writable
    }

    fn to_epoll_bits(self) -> u32 {
        let mut bits = 0;
        if self.readable {
            bits |= (libc::EPOLLIN | libc::EPOLLPRI) as u32;
        }
        if self.writable {
            bits |= libc::EPOLLOUT as u32;
        }
        bits
    }
}

/// A decoded readiness report: the raw epoll event bits plus the query
/// helpers `Channel::handle_event` dispatches on.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Readiness(u32);

impl Readiness {
    pub(crate) fn is_readable(self) -> bool {
        self.0 & ((libc::EPOLLIN | libc::EPOLLPRI | libc::EPOLLRDHUP) as u32) != 0
    }

    pub(crate) fn is_writable(self) -> bool {
        self.0 & (libc::EPOLLOUT as u32) != 0
    }

    pub(crate) fn is_error(self) -> bool {
        self.0 & (libc::EPOLLERR as u32) != 0
    }

    /// Hang-up without a pending readable byte: the peer closed after we
    /// stopped reading. Treated as a close, not an error.
    pub(crate) fn is_hup_only(self) -> bool {
        let hup = self.0 & (libc::EPOLLHUP as u32) != 0;
        hup && self.0 & (libc::EPOLLIN as u32) == 0
    }

    pub(crate) fn is_invalid(self) -> bool {
        // epoll has no direct equivalent of poll(2)'s POLLNVAL; an fd that
        // epoll itself considers invalid fails at registration time
        // instead of surfacing as a readiness bit.
        false
    }
}

pub(crate) struct Selector {
    epfd: RawFd,
}

impl Selector {
    pub(crate) fn new() -> io::Result<Selector> {
        let epfd = syscall!(epoll_create1(libc::EPOLL_CLOEXEC))?;
        Ok(Selector { epfd })
    }

    pub(crate) fn register(&self, fd: RawFd, key: u64, interest: Interest) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: interest.to_epoll_bits(),
            u64: key,
        };
        syscall!(epoll_ctl(self.epfd, libc::EPOLL_CTL_ADD, fd, &mut event)).map(|_| ())
    }

    pub(crate) fn reregister(&self, fd: RawFd, key: u64, interest: Interest) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: interest.to_epoll_bits(),
            u64: key,
        };
        syscall!(epoll_ctl(self.epfd, libc::EPOLL_CTL_MOD, fd, &mut event)).map(|_| ())
    }

    pub(crate) fn deregister(&self, fd: RawFd) -> io::Result<()> {
        syscall!(epoll_ctl(
            self.epfd,
            libc::EPOLL_CTL_DEL,
            fd,
            std::ptr::null_mut()
        ))
        .map(|_| ())
    }

    /// Blocks for up to `timeout` (or indefinitely if `None`), returning
    /// `(key, Readiness)` pairs for every descriptor that became ready.
    pub(crate) fn select(
        &self,
        buf: &mut Vec<libc::epoll_event>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        let timeout_ms = match timeout {
            None => -1,
            Some(d) => d
                .checked_add(Duration::from_nanos(999_999))
                .unwrap_or(d)
                .as_millis()
                .min(i32::MAX as u128) as i32,
        };

        buf.clear();
        let n = syscall!(epoll_wait(
            self.epfd,
            buf.as_mut_ptr(),
            buf.capacity() as i32,
            timeout_ms,
        ))?;
        // SAFETY: epoll_wait guarantees the first `n` slots were written.
        unsafe { buf.set_len(n as usize) };
        Ok(())
    }

    pub(crate) fn event_key(event: &libc::epoll_event) -> u64 {
        event.u64
    }

    pub(crate) fn event_readiness(event: &libc::epoll_event) -> Readiness {
        Readiness(event.events)
    }
}

impl Drop for Selector {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epfd);
        }
    }
}
