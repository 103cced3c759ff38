//! Kernel-timer-backed ordered set of pending timers.
//!
//! A `timerfd` drives a `Channel`, and a `BTreeSet` holds every pending
//! timer ordered by deadline, keyed by `(Instant, sequence)` so two timers
//! due at the same instant still compare distinctly (a bare `Instant` key
//! would silently collide).
//!
//! Insertion and cancellation are only safe on the owning loop's thread;
//! [`crate::event_loop::EventLoop`] is what exposes a thread-safe entry
//! point (`run_at`/`run_after`/`run_every`/`cancel`) by marshaling onto the
//! loop thread before calling into this module.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;

use crate::channel::Channel;
use crate::confine::ThreadGuard;
use crate::sys::TimerFd;
use crate::timer::{Timer, TimerId};

pub(crate) struct TimerQueue {
    guard: ThreadGuard,
    timerfd: TimerFd,
    active: BTreeSet<(Instant, u64)>,
    timers: HashMap<u64, Timer>,
    cancelled: HashSet<u64>,
}

impl TimerQueue {
    pub(crate) fn new() -> std::io::Result<(TimerQueue, Channel)> {
        let timerfd = TimerFd::new()?;
        let channel = Channel::new(timerfd.fd());
        let queue = TimerQueue {
            guard: ThreadGuard::new(),
            timerfd,
            active: BTreeSet::new(),
            timers: HashMap::new(),
            cancelled: HashSet::new(),
        };
        Ok((queue, channel))
    }

    pub(crate) fn fd(&self) -> std::os::unix::io::RawFd {
        self.timerfd.fd()
    }

    /// Inserts `timer` under the caller-assigned `sequence`, assumed
    /// already confined to the owning loop thread. The sequence is
    /// assigned by the caller (an atomic counter on `EventLoop`) rather
    /// than generated here, so a `TimerId` can be handed back immediately
    /// even when the actual insertion is still queued to run on the loop
    /// thread. Returns `true` if this timer is now the earliest pending
    /// deadline, in which case the caller must re-arm the `timerfd`.
    pub(crate) fn insert(&mut self, sequence: u64, timer: Timer) -> bool {
        self.guard.assert_current();
        let earliest_changed = self
            .active
            .iter()
            .next()
            .map(|(when, _)| timer.expiration() < *when)
            .unwrap_or(true);
        self.active.insert((timer.expiration(), sequence));
        self.timers.insert(sequence, timer);
        earliest_changed
    }

    pub(crate) fn cancel(&mut self, id: TimerId) {
        self.guard.assert_current();
        if let Some(timer) = self.timers.remove(&id.sequence) {
            self.active.remove(&(timer.expiration(), id.sequence));
        } else {
            // Already drained from `active` (expired this tick, or never
            // inserted) but might still be mid-dispatch in `handle_read`;
            // recording the cancellation stops it from being rearmed.
            self.cancelled.insert(id.sequence);
        }
    }

    /// Drains the `timerfd`'s fire count and runs every timer whose
    /// deadline has passed, then re-arms for the new earliest deadline.
    /// Returns the next deadline to arm the `timerfd` to, if any.
    pub(crate) fn handle_read(&mut self, now: Instant) -> Option<Instant> {
        self.guard.assert_current();
        let _ = self.timerfd.drain();

        let expired = self.pop_expired(now);
        for sequence in &expired {
            if let Some(mut timer) = self.timers.remove(sequence) {
                if !self.cancelled.remove(sequence) {
                    timer.run();
                }
                if timer.repeats() && !self.cancelled.contains(sequence) {
                    timer.restart(now);
                    self.active.insert((timer.expiration(), *sequence));
                    self.timers.insert(*sequence, timer);
                }
            }
        }

        self.active.iter().next().map(|(when, _)| *when)
    }

    fn pop_expired(&mut self, now: Instant) -> Vec<u64> {
        let still_pending = self.active.split_off(&(now, u64::MAX));
        let expired = std::mem::replace(&mut self.active, still_pending);
        expired.into_iter().map(|(_, seq)| seq).collect()
    }

    pub(crate) fn rearm(&self, deadline: Instant, now: Instant) -> std::io::Result<()> {
        self.timerfd.arm_at(deadline, now)
    }

    pub(crate) fn disarm(&self) -> std::io::Result<()> {
        self.timerfd.disarm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn earliest_changed_only_on_new_minimum() {
        let (mut q, _ch) = TimerQueue::new().unwrap();
        let now = Instant::now();
        let first_earliest = q.insert(0, Timer::new(Box::new(|| {}), now + Duration::from_secs(5), None));
        assert!(first_earliest);
        let second_earliest =
            q.insert(1, Timer::new(Box::new(|| {}), now + Duration::from_secs(10), None));
        assert!(!second_earliest);
        let third_earliest =
            q.insert(2, Timer::new(Box::new(|| {}), now + Duration::from_secs(1), None));
        assert!(third_earliest);
    }

    #[test]
    fn duplicate_deadlines_both_fire() {
        let (mut q, _ch) = TimerQueue::new().unwrap();
        let now = Instant::now();
        let deadline = now + Duration::from_millis(10);
        let count = std::rc::Rc::new(std::cell::Cell::new(0));
        let c1 = count.clone();
        let c2 = count.clone();
        q.insert(0, Timer::new(Box::new(move || c1.set(c1.get() + 1)), deadline, None));
        q.insert(1, Timer::new(Box::new(move || c2.set(c2.get() + 1)), deadline, None));
        q.handle_read(deadline + Duration::from_millis(1));
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn cancelled_timer_does_not_run() {
        let (mut q, _ch) = TimerQueue::new().unwrap();
        let now = Instant::now();
        let ran = std::rc::Rc::new(std::cell::Cell::new(false));
        let ran2 = ran.clone();
        q.insert(
            0,
            Timer::new(Box::new(move || ran2.set(true)), now + Duration::from_millis(5), None),
        );
        q.cancel(TimerId { sequence: 0 });
        q.handle_read(now + Duration::from_millis(10));
        assert!(!ran.get());
    }

    #[test]
    fn repeating_timer_reinserts_after_firing() {
        let (mut q, _ch) = TimerQueue::new().unwrap();
        let now = Instant::now();
        let count = std::rc::Rc::new(std::cell::Cell::new(0));
        let c1 = count.clone();
        q.insert(
            0,
            Timer::new(
                Box::new(move || c1.set(c1.get() + 1)),
                now + Duration::from_millis(5),
                Some(Duration::from_millis(5)),
            ),
        );
        let next = q.handle_read(now + Duration::from_millis(6));
        assert_eq!(count.get(), 1);
        assert!(next.is_some());
    }
}
