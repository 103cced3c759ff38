//! Level-triggered readiness demultiplexer over `epoll`.
//!
//! Registered descriptors live in a slab (a free list threaded through a
//! dense `Vec`) rather than a plain growable array: allocating and freeing
//! a slot are both O(1), with no need for the swap-to-back removal trick a
//! `poll(2)`-style flat array would otherwise require.

use std::io;
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

use crate::channel::Channel;
use crate::confine::ThreadGuard;
use crate::sys::Selector;

struct Slot {
    fd: RawFd,
    /// Whether this fd currently has a live `epoll_ctl` registration.
    /// Interest can go to none (`disableAll`) without freeing the slot;
    /// epoll has no poll(2)-style "ignore this entry" flag, so going
    /// inert means an explicit `EPOLL_CTL_DEL`, re-added with `ADD` (not
    /// `MOD`) if interest returns.
    registered: bool,
}

pub(crate) struct Poller {
    selector: Selector,
    guard: ThreadGuard,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    events_buf: Vec<libc::epoll_event>,
}

const EVENTS_CAPACITY: usize = 1024;

impl Poller {
    pub(crate) fn new() -> io::Result<Poller> {
        Ok(Poller {
            selector: Selector::new()?,
            guard: ThreadGuard::new(),
            slots: Vec::new(),
            free: Vec::new(),
            events_buf: Vec::with_capacity(EVENTS_CAPACITY),
        })
    }

    /// Blocks for up to `timeout_ms` milliseconds, appending every channel
    /// that became ready to `active` via `visit`. Returns the timestamp at
    /// which the wait returned, for use as each ready channel's event time.
    pub(crate) fn poll(
        &mut self,
        timeout_ms: i32,
        mut visit: impl FnMut(usize, crate::sys::Readiness),
    ) -> io::Result<Instant> {
        self.guard.assert_current();
        let timeout = if timeout_ms < 0 {
            None
        } else {
            Some(Duration::from_millis(timeout_ms as u64))
        };
        self.selector.select(&mut self.events_buf, timeout)?;
        let now = Instant::now();
        for event in &self.events_buf {
            let key = Selector::event_key(event) as usize;
            let readiness = Selector::event_readiness(event);
            visit(key, readiness);
        }
        Ok(now)
    }

    /// Registers a new channel or applies a changed interest mask for one
    /// already registered. Assigns `channel.index()` on first call.
    pub(crate) fn update_channel(&mut self, channel: &mut Channel) -> io::Result<()> {
        self.guard.assert_current();
        if channel.index() < 0 {
            let idx = self.alloc_slot(channel.fd());
            if !channel.interest().is_none() {
                self.selector
                    .register(channel.fd(), idx as u64, channel.interest())?;
                self.slots[idx].as_mut().unwrap().registered = true;
            }
            channel.set_index(idx as isize);
        } else {
            let idx = channel.index() as usize;
            let slot = self.slots[idx].as_mut().expect("stale channel index");
            debug_assert_eq!(slot.fd, channel.fd());
            if channel.interest().is_none() {
                if slot.registered {
                    self.selector.deregister(channel.fd())?;
                    slot.registered = false;
                }
            } else if slot.registered {
                self.selector
                    .reregister(channel.fd(), idx as u64, channel.interest())?;
            } else {
                self.selector
                    .register(channel.fd(), idx as u64, channel.interest())?;
                slot.registered = true;
            }
        }
        Ok(())
    }

    /// Frees a channel's slot. The channel must be fully inert (no
    /// interest, and thus no live epoll registration) before removal.
    pub(crate) fn remove_channel(&mut self, channel: &mut Channel) -> io::Result<()> {
        self.guard.assert_current();
        assert!(channel.is_none_event(), "removing a channel with live interest");
        let idx = channel.index();
        if idx < 0 {
            return Ok(());
        }
        let idx = idx as usize;
        if let Some(slot) = self.slots[idx].take() {
            debug_assert!(!slot.registered);
        }
        self.free.push(idx);
        channel.set_index(-1);
        Ok(())
    }

    fn alloc_slot(&mut self, fd: RawFd) -> usize {
        let slot = Slot {
            fd,
            registered: false,
        };
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(slot);
            idx
        } else {
            self.slots.push(Some(slot));
            self.slots.len() - 1
        }
    }
}
