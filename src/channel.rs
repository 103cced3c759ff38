//! Event-dispatching wrapper around one file descriptor.
//!
//! A `Channel` does not own its fd (a socket, an eventfd, or a timerfd),
//! only the interest mask and the callbacks invoked when the
//! [`crate::poller::Poller`] reports that fd ready. Callers (`Acceptor`,
//! `TcpConnection`, `EventLoop`'s own wakeup channel, `TimerQueue`) own
//! both the descriptor and its `Channel`.
//!
//! `Channel` deliberately holds no back pointer to its owning `EventLoop`.
//! Toggling interest (`enable_reading`,
//! etc.) only updates the local mask; the caller is responsible for
//! following up with `Poller::update_channel` or `EventLoop::update_channel`.
//! Avoiding the intrusive back pointer keeps ownership acyclic, which
//! matters once channels live inside `Rc`-shared connection state.

use std::os::unix::io::RawFd;
use std::time::Instant;

use crate::sys::{Interest, Readiness};

pub(crate) type ReadCallback = Box<dyn FnMut(Instant)>;
pub(crate) type EventCallback = Box<dyn FnMut()>;

pub(crate) struct Channel {
    fd: RawFd,
    interest: Interest,
    index: isize,
    event_handling: bool,
    read_callback: Option<ReadCallback>,
    write_callback: Option<EventCallback>,
    error_callback: Option<EventCallback>,
    close_callback: Option<EventCallback>,
}

impl Channel {
    pub(crate) fn new(fd: RawFd) -> Channel {
        Channel {
            fd,
            interest: Interest::NONE,
            index: -1,
            event_handling: false,
            read_callback: None,
            write_callback: None,
            error_callback: None,
            close_callback: None,
        }
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }

    pub(crate) fn interest(&self) -> Interest {
        self.interest
    }

    pub(crate) fn is_none_event(&self) -> bool {
        self.interest.is_none()
    }

    pub(crate) fn index(&self) -> isize {
        self.index
    }

    pub(crate) fn set_index(&mut self, idx: isize) {
        self.index = idx;
    }

    pub(crate) fn set_read_callback(&mut self, cb: ReadCallback) {
        self.read_callback = Some(cb);
    }

    pub(crate) fn set_write_callback(&mut self, cb: EventCallback) {
        self.write_callback = Some(cb);
    }

    pub(crate) fn set_error_callback(&mut self, cb: EventCallback) {
        self.error_callback = Some(cb);
    }

    pub(crate) fn set_close_callback(&mut self, cb: EventCallback) {
        self.close_callback = Some(cb);
    }

    pub(crate) fn enable_reading(&mut self) {
        self.interest.readable = true;
    }

    pub(crate) fn disable_reading(&mut self) {
        self.interest.readable = false;
    }

    pub(crate) fn enable_writing(&mut self) {
        self.interest.writable = true;
    }

    pub(crate) fn disable_writing(&mut self) {
        self.interest.writable = false;
    }

    pub(crate) fn is_writing(&self) -> bool {
        self.interest.writable
    }

    pub(crate) fn disable_all(&mut self) {
        self.interest = Interest::NONE;
    }

    /// Dispatches one readiness report to the registered callbacks, in the
    /// fixed order: hang-up-without-readable closes the channel, then
    /// error, then read, then write. A channel must not be dropped from
    /// inside any of these callbacks; `event_handling` exists purely as a
    /// debug-assertion tripwire for that invariant.
    pub(crate) fn handle_event(&mut self, readiness: Readiness, now: Instant) {
        self.event_handling = true;

        if readiness.is_invalid() {
            #[cfg(feature = "log")]
            log::warn!("Channel::handle_event() fd = {} invalid", self.fd);
        }

        if readiness.is_hup_only() {
            if let Some(cb) = self.close_callback.as_mut() {
                cb();
            }
        }

        if readiness.is_error() || readiness.is_invalid() {
            if let Some(cb) = self.error_callback.as_mut() {
                cb();
            }
        }

        if readiness.is_readable() {
            if let Some(cb) = self.read_callback.as_mut() {
                cb(now);
            }
        }

        if readiness.is_writable() {
            if let Some(cb) = self.write_callback.as_mut() {
                cb();
            }
        }

        self.event_handling = false;
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        debug_assert!(
            !self.event_handling,
            "Channel dropped while handling an event"
        );
    }
}
