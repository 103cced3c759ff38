//! A single scheduled callback, and the handle used to cancel it.

use std::time::{Duration, Instant};

pub(crate) type TimerCallback = Box<dyn FnMut() + Send>;

/// One entry in a [`crate::timer_queue::TimerQueue`]: an expiration
/// timestamp, an optional repeat interval, and the callback to run.
/// `restart` advances the expiration by one interval for repeating timers.
pub(crate) struct Timer {
    callback: TimerCallback,
    expiration: Instant,
    interval: Option<Duration>,
}

impl Timer {
    pub(crate) fn new(callback: TimerCallback, expiration: Instant, interval: Option<Duration>) -> Timer {
        Timer {
            callback,
            expiration,
            interval,
        }
    }

    pub(crate) fn expiration(&self) -> Instant {
        self.expiration
    }

    pub(crate) fn repeats(&self) -> bool {
        self.interval.is_some()
    }

    pub(crate) fn run(&mut self) {
        (self.callback)();
    }

    /// Advances `expiration` by one interval. Only meaningful when
    /// `repeats()` is true; a one-shot timer is dropped after firing
    /// instead of being restarted.
    pub(crate) fn restart(&mut self, now: Instant) {
        if let Some(interval) = self.interval {
            self.expiration = now + interval;
        }
    }
}

/// Opaque handle returned by `EventLoop::run_at`/`run_after`/`run_every`,
/// usable to cancel the timer before it fires.
///
/// Carries a sequence number rather than a raw pointer: the queue stores
/// timers in a `BTreeSet` keyed by `(expiration, sequence)`, so the
/// sequence alone is enough to find and remove the right entry even when
/// two timers share a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId {
    pub(crate) sequence: u64,
}
