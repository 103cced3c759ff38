//! The reactor: one event loop bound to exactly one OS thread.
//!
//! Each loop owns a [`Poller`], a
//! [`TimerQueue`], and a self-pipe-style wakeup [`Waker`]; its task queue
//! is the only thing behind a lock anywhere in this module. Every other
//! piece of loop-owned state — the active-channel scratch list, the
//! registry mapping `Poller` keys back to `Channel` pointers, the
//! `looping`/`quit`/`calling_pending_functors` flags — is touched only
//! from the owning thread, enforced at runtime by [`ThreadGuard`] rather
//! than by the type system. `EventLoop` is handed out as `Arc<EventLoop>`
//! so other threads can hold a reference to schedule work on it; the
//! `unsafe impl Send + Sync` below is the (manually upheld) promise that
//! callers never reach past `run_in_loop`/`queue_in_loop` to touch the
//! confined fields directly.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant};

use crate::channel::Channel;
use crate::confine::ThreadGuard;
use crate::error::fatal;
use crate::poller::Poller;
use crate::sys::Waker;
use crate::timer::{Timer, TimerId};
use crate::timer_queue::TimerQueue;

/// Maximum time a loop blocks in the poller with nothing else to do.
/// Bounds how quickly a loop notices a `quit()` called from within a
/// signal handler or similarly exotic context; ordinary quits and timers
/// wake it immediately.
const POLL_TIMEOUT_MS: i32 = 10_000;

type Functor = Box<dyn FnOnce() + Send>;

pub struct EventLoop {
    guard: ThreadGuard,
    looping: Cell<bool>,
    quit: AtomicBool,
    calling_pending_functors: Cell<bool>,
    poll_return_time: Cell<Instant>,
    poller: RefCell<Poller>,
    registry: RefCell<HashMap<usize, *mut Channel>>,
    timer_queue: RefCell<TimerQueue>,
    timer_channel: RefCell<Channel>,
    timer_sequence: AtomicU64,
    waker: Waker,
    wakeup_channel: RefCell<Channel>,
    pending: Mutex<Vec<Functor>>,
}

// SAFETY: every field except `pending` (already `Sync` via `Mutex`) and the
// atomics is touched only by the thread that owns this loop, and every
// method that touches them asserts that with `ThreadGuard`. The raw
// pointers in `registry` point at `Channel`s owned by callers who
// deregister them (via `remove_channel`) before the `Channel` is dropped,
// so the pointers are never dangling while present in the map.
unsafe impl Send for EventLoop {}
unsafe impl Sync for EventLoop {}

/// Process-wide one-time `SIGPIPE` suppression. Without it, writing to a
/// socket whose peer has closed its read side kills the process instead of
/// surfacing as an `EPIPE` write error that `TcpConnection::handle_write`
/// can log and route through the normal close path.
static IGNORE_SIGPIPE: Once = Once::new();

fn ignore_sigpipe() {
    IGNORE_SIGPIPE.call_once(|| unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    });
}

impl EventLoop {
    pub fn new() -> io::Result<Arc<EventLoop>> {
        ignore_sigpipe();
        let poller = Poller::new()?;
        let (timer_queue, timer_channel) = TimerQueue::new()?;
        let waker = Waker::new()?;
        let wakeup_channel = Channel::new(waker.fd());

        let loop_ = Arc::new(EventLoop {
            guard: ThreadGuard::new(),
            looping: Cell::new(false),
            quit: AtomicBool::new(false),
            calling_pending_functors: Cell::new(false),
            poll_return_time: Cell::new(Instant::now()),
            poller: RefCell::new(poller),
            registry: RefCell::new(HashMap::new()),
            timer_queue: RefCell::new(timer_queue),
            timer_channel: RefCell::new(timer_channel),
            timer_sequence: AtomicU64::new(0),
            waker,
            wakeup_channel: RefCell::new(wakeup_channel),
            pending: Mutex::new(Vec::new()),
        });

        {
            let weak = Arc::downgrade(&loop_);
            loop_
                .wakeup_channel
                .borrow_mut()
                .set_read_callback(Box::new(move |_now| {
                    if let Some(loop_) = weak.upgrade() {
                        let _ = loop_.waker.drain();
                    }
                }));
            loop_.wakeup_channel.borrow_mut().enable_reading();
            let mut channel = loop_.wakeup_channel.borrow_mut();
            loop_.update_channel(&mut channel);
        }
        {
            let weak = Arc::downgrade(&loop_);
            loop_
                .timer_channel
                .borrow_mut()
                .set_read_callback(Box::new(move |now| {
                    if let Some(loop_) = weak.upgrade() {
                        loop_.handle_timer_read(now);
                    }
                }));
            loop_.timer_channel.borrow_mut().enable_reading();
            let mut channel = loop_.timer_channel.borrow_mut();
            loop_.update_channel(&mut channel);
        }

        Ok(loop_)
    }

    pub fn is_in_loop_thread(&self) -> bool {
        self.guard.is_current()
    }

    pub(crate) fn assert_in_loop_thread(&self) {
        self.guard.assert_current();
    }

    pub fn poll_return_time(&self) -> Instant {
        self.poll_return_time.get()
    }

    /// Runs the loop until `quit()` is called. Must run on the thread that
    /// constructed this `EventLoop`.
    pub fn run(&self) {
        self.guard.assert_current();
        assert!(!self.looping.get(), "EventLoop::run() called reentrantly");
        self.looping.set(true);
        self.quit.store(false, Ordering::Relaxed);

        let mut active = Vec::new();
        while !self.quit.load(Ordering::Relaxed) {
            active.clear();
            let now = {
                let mut poller = self.poller.borrow_mut();
                poller
                    .poll(POLL_TIMEOUT_MS, |key, readiness| active.push((key, readiness)))
                    .unwrap_or_else(|e| fatal("Poller::poll", &e))
            };
            self.poll_return_time.set(now);

            for (key, readiness) in active.drain(..) {
                let ptr = self.registry.borrow().get(&key).copied();
                if let Some(ptr) = ptr {
                    // SAFETY: channel outlives its registry entry; entries
                    // are removed in `remove_channel` before the owning
                    // `Channel` can be dropped.
                    unsafe { (*ptr).handle_event(readiness, now) };
                }
            }

            self.do_pending_functors();
        }

        self.looping.set(false);
    }

    pub fn quit(&self) {
        self.quit.store(true, Ordering::Relaxed);
        if !self.is_in_loop_thread() {
            let _ = self.waker.wake();
        }
    }

    /// Runs `f` inline if already on the loop thread, otherwise queues it.
    pub fn run_in_loop(&self, f: impl FnOnce() + Send + 'static) {
        if self.is_in_loop_thread() {
            f();
        } else {
            self.queue_in_loop(f);
        }
    }

    /// Always queues `f` to run at the end of the current (or next)
    /// iteration. Wakes the loop unless the caller is already on the loop
    /// thread and outside of `do_pending_functors` (in which case the
    /// functor will run this iteration without needing a wakeup).
    pub fn queue_in_loop(&self, f: impl FnOnce() + Send + 'static) {
        {
            let mut pending = self.pending.lock().unwrap();
            pending.push(Box::new(f));
        }
        if !self.is_in_loop_thread() || self.calling_pending_functors.get() {
            let _ = self.waker.wake();
        }
    }

    fn do_pending_functors(&self) {
        self.calling_pending_functors.set(true);
        let functors = {
            let mut pending = self.pending.lock().unwrap();
            std::mem::take(&mut *pending)
        };
        for f in functors {
            f();
        }
        self.calling_pending_functors.set(false);
    }

    pub(crate) fn update_channel(&self, channel: &mut Channel) {
        self.guard.assert_current();
        self.poller
            .borrow_mut()
            .update_channel(channel)
            .unwrap_or_else(|e| fatal("Poller::update_channel", &e));
        self.registry
            .borrow_mut()
            .insert(channel.index() as usize, channel as *mut Channel);
    }

    pub(crate) fn remove_channel(&self, channel: &mut Channel) {
        self.guard.assert_current();
        let idx = channel.index();
        self.poller
            .borrow_mut()
            .remove_channel(channel)
            .unwrap_or_else(|e| fatal("Poller::remove_channel", &e));
        if idx >= 0 {
            self.registry.borrow_mut().remove(&(idx as usize));
        }
    }

    fn handle_timer_read(&self, now: Instant) {
        self.guard.assert_current();
        let next_deadline = self.timer_queue.borrow_mut().handle_read(now);
        let queue = self.timer_queue.borrow();
        match next_deadline {
            Some(deadline) => {
                let _ = queue.rearm(deadline, Instant::now());
            }
            None => {
                let _ = queue.disarm();
            }
        }
    }

    fn schedule_timer(
        self: &Arc<Self>,
        deadline: Instant,
        interval: Option<Duration>,
        cb: impl FnMut() + Send + 'static,
    ) -> TimerId {
        let sequence = self.timer_sequence.fetch_add(1, Ordering::Relaxed);
        let timer = Timer::new(Box::new(cb), deadline, interval);
        let this = Arc::clone(self);
        self.run_in_loop(move || this.insert_timer_in_loop(sequence, timer));
        TimerId { sequence }
    }

    fn insert_timer_in_loop(&self, sequence: u64, timer: Timer) {
        self.guard.assert_current();
        let deadline = timer.expiration();
        let earliest_changed = self.timer_queue.borrow_mut().insert(sequence, timer);
        if earliest_changed {
            let _ = self.timer_queue.borrow().rearm(deadline, Instant::now());
        }
    }

    /// Runs `cb` once at `deadline`.
    pub fn run_at(self: &Arc<Self>, deadline: Instant, cb: impl FnMut() + Send + 'static) -> TimerId {
        self.schedule_timer(deadline, None, cb)
    }

    /// Runs `cb` once, `delay` from now.
    pub fn run_after(self: &Arc<Self>, delay: Duration, cb: impl FnMut() + Send + 'static) -> TimerId {
        self.schedule_timer(Instant::now() + delay, None, cb)
    }

    /// Runs `cb` every `interval`, starting `interval` from now.
    pub fn run_every(self: &Arc<Self>, interval: Duration, cb: impl FnMut() + Send + 'static) -> TimerId {
        self.schedule_timer(Instant::now() + interval, Some(interval), cb)
    }

    /// Cancels a pending timer. A no-op if it already fired (and was not
    /// repeating) or was already cancelled.
    pub fn cancel_timer(self: &Arc<Self>, id: TimerId) {
        let this = Arc::clone(self);
        self.run_in_loop(move || {
            this.guard.assert_current();
            this.timer_queue.borrow_mut().cancel(id);
        });
    }

    pub(crate) fn timerfd(&self) -> RawFd {
        self.timer_queue.borrow().fd()
    }
}
