//! Spawns one OS thread per [`EventLoop`] and hands the loop back to the
//! spawning thread, plus a round-robin pool of such threads for [`crate::tcp_server::TcpServer`].
//!
//! The freshly constructed loop is published from the spawned thread back
//! to the caller under a `std::sync::{Mutex, Condvar}` handshake, since
//! the loop must be constructed on the thread that will run it.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::event_loop::EventLoop;

/// Owns one spawned thread running exactly one [`EventLoop`] for its
/// lifetime. Dropping it quits the loop and joins the thread.
pub struct LoopThread {
    shared: Arc<(Mutex<Option<Arc<EventLoop>>>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl LoopThread {
    pub fn new() -> LoopThread {
        let shared = Arc::new((Mutex::new(None::<Arc<EventLoop>>), Condvar::new()));
        let shared_thread = Arc::clone(&shared);

        let handle = thread::Builder::new()
            .name("reactorio-io".to_string())
            .spawn(move || {
                // The loop must be constructed on this thread: it records
                // its owning thread id at construction time.
                let loop_ = EventLoop::new().expect("EventLoop::new in spawned io thread");
                {
                    let (lock, cond) = &*shared_thread;
                    let mut slot = lock.lock().unwrap();
                    *slot = Some(Arc::clone(&loop_));
                    cond.notify_one();
                }
                loop_.run();
            })
            .expect("failed to spawn io thread");

        LoopThread {
            shared,
            handle: Some(handle),
        }
    }

    /// Blocks until the spawned thread's `EventLoop` exists, then returns a
    /// handle to it.
    pub fn start_loop(&self) -> Arc<EventLoop> {
        let (lock, cond) = &*self.shared;
        let mut slot = lock.lock().unwrap();
        while slot.is_none() {
            slot = cond.wait(slot).unwrap();
        }
        Arc::clone(slot.as_ref().unwrap())
    }
}

impl Default for LoopThread {
    fn default() -> LoopThread {
        LoopThread::new()
    }
}

impl Drop for LoopThread {
    fn drop(&mut self) {
        // `start_loop` may never have been called; the loop still exists
        // once the spawned thread has gotten far enough to publish it.
        let loop_ = {
            let (lock, _cond) = &*self.shared;
            lock.lock().unwrap().clone()
        };
        if let Some(loop_) = loop_ {
            loop_.quit();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// A fixed-size, round-robin pool of [`LoopThread`]s, owned by a
/// [`crate::tcp_server::TcpServer`]. Thread count defaults to 0, meaning
/// every connection is handled on the base loop.
pub struct LoopThreadPool {
    base_loop: Arc<EventLoop>,
    num_threads: usize,
    started: bool,
    next: usize,
    threads: Vec<LoopThread>,
    loops: Vec<Arc<EventLoop>>,
}

impl LoopThreadPool {
    pub(crate) fn new(base_loop: Arc<EventLoop>) -> LoopThreadPool {
        LoopThreadPool {
            base_loop,
            num_threads: 0,
            started: false,
            next: 0,
            threads: Vec::new(),
            loops: Vec::new(),
        }
    }

    pub fn set_thread_num(&mut self, num_threads: usize) {
        self.num_threads = num_threads;
    }

    pub(crate) fn start(&mut self) {
        assert!(!self.started, "LoopThreadPool::start called twice");
        self.base_loop.assert_in_loop_thread();
        self.started = true;

        for _ in 0..self.num_threads {
            let thread = LoopThread::new();
            let loop_ = thread.start_loop();
            self.loops.push(loop_);
            self.threads.push(thread);
        }
    }

    /// Picks the next loop to assign a new connection to, round-robin.
    /// Falls back to the base loop when no threads were configured.
    pub(crate) fn next_loop(&mut self) -> Arc<EventLoop> {
        self.base_loop.assert_in_loop_thread();
        if self.loops.is_empty() {
            return Arc::clone(&self.base_loop);
        }
        let loop_ = Arc::clone(&self.loops[self.next]);
        self.next += 1;
        if self.next >= self.loops.len() {
            self.next = 0;
        }
        loop_
    }
}
