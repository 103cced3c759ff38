//! Kernel timer descriptor backing the [`crate::timer_queue::TimerQueue`].

use std::io;
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

use super::syscall;

/// Minimum arming distance from "now": avoids a `timerfd_settime` call with
/// a zero or negative relative deadline, which would otherwise fire
/// immediately and spin the loop.
const MIN_ARM_DISTANCE: Duration = Duration::from_micros(100);

pub(crate) struct TimerFd {
    fd: RawFd,
}

impl TimerFd {
    pub(crate) fn new() -> io::Result<TimerFd> {
        let fd = syscall!(timerfd_create(
            libc::CLOCK_MONOTONIC,
            libc::TFD_NONBLOCK | libc::TFD_CLOEXEC
        ))?;
        Ok(TimerFd { fd })
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }

    /// Arms the descriptor to fire at `deadline`, measured against `now`
    /// and clamped to [`MIN_ARM_DISTANCE`].
    pub(crate) fn arm_at(&self, deadline: Instant, now: Instant) -> io::Result<()> {
        let relative = deadline.saturating_duration_since(now).max(MIN_ARM_DISTANCE);
        let new_value = libc::itimerspec {
            it_interval: libc::timespec {
                tv_sec: 0,
                tv_nsec: 0,
            },
            it_value: libc::timespec {
                tv_sec: relative.as_secs() as libc::time_t,
                tv_nsec: relative.subsec_nanos() as libc::c_long,
            },
        };
        let mut old_value: libc::itimerspec = unsafe { std::mem::zeroed() };
        syscall!(timerfd_settime(self.fd, 0, &new_value, &mut old_value)).map(|_| ())
    }

    /// Disarms the descriptor (no pending deadlines).
    pub(crate) fn disarm(&self) -> io::Result<()> {
        let new_value: libc::itimerspec = unsafe { std::mem::zeroed() };
        let mut old_value: libc::itimerspec = unsafe { std::mem::zeroed() };
        syscall!(timerfd_settime(self.fd, 0, &new_value, &mut old_value)).map(|_| ())
    }

    /// Reads and discards the fire-count, clearing the descriptor's
    /// readiness. Returns `Ok(0)` (rather than an error) if nothing was
    /// pending, matching the "ignore EAGAIN" discipline used throughout.
    pub(crate) fn drain(&self) -> io::Result<u64> {
        let mut count: u64 = 0;
        match syscall!(read(
            self.fd,
            &mut count as *mut u64 as *mut libc::c_void,
            8
        )) {
            Ok(_) => Ok(count),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }
}

impl Drop for TimerFd {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
