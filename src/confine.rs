//! Thread-confinement primitive.
//!
//! The reactor core's central design bet is that `EventLoop`, `Channel`,
//! `Timer` and `TcpConnection` state needs no locking because each object
//! is mutated exclusively by the thread that owns its `EventLoop`.
//! `ThreadGuard` is the runtime check backing that bet: every mutating
//! entry point asserts ownership before touching loop-confined state
//! before it is touched.
//!
//! A guarded object is still handed out as `Arc<T>` so that a handle can
//! be captured by a task and moved to another thread's task queue; it is
//! simply never *used* concurrently with its owning thread, which is what
//! the `unsafe impl Send + Sync` at each confined type's definition site
//! asserts. `ThreadGuard` only supplies the runtime assertion; the unsafe
//! marker impls are the actual (manually upheld) safety contract.

use std::cell::Cell;
use std::thread::{self, ThreadId};

#[derive(Debug)]
pub(crate) struct ThreadGuard {
    owner: ThreadId,
}

impl ThreadGuard {
    pub(crate) fn new() -> ThreadGuard {
        ThreadGuard {
            owner: thread::current().id(),
        }
    }

    #[inline]
    pub(crate) fn is_current(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Panics if the calling thread is not the confined object's owner.
    ///
    /// A failure here means the program attempted to mutate loop-confined
    /// state from the wrong thread. That is a programmer error, not a
    /// recoverable condition.
    #[inline]
    #[track_caller]
    pub(crate) fn assert_current(&self) {
        assert!(
            self.is_current(),
            "reactorio: operation confined to owning loop thread {:?}, called from {:?}",
            self.owner,
            thread::current().id()
        );
    }
}

/// Like [`ThreadGuard`], but binds to its owner lazily on first use instead
/// of at construction.
///
/// `TcpConnection` is built by `TcpServer::new_connection` on whichever
/// thread the `Acceptor` lives on, then handed to its actual io thread via
/// `EventLoop::run_in_loop` for `connect_established`. An eager
/// `ThreadGuard` would bind to the constructing thread and immediately
/// reject every subsequent call from the real owning thread. Binding at
/// first use means the first confined call — always `connect_established`,
/// always already running on the target io thread — fixes the owner.
#[derive(Debug)]
pub(crate) struct LazyThreadGuard {
    owner: Cell<Option<ThreadId>>,
}

impl LazyThreadGuard {
    pub(crate) fn new() -> LazyThreadGuard {
        LazyThreadGuard {
            owner: Cell::new(None),
        }
    }

    #[track_caller]
    pub(crate) fn assert_current(&self) {
        let current = thread::current().id();
        match self.owner.get() {
            Some(owner) => assert!(
                owner == current,
                "reactorio: operation confined to owning loop thread {:?}, called from {:?}",
                owner,
                current
            ),
            None => self.owner.set(Some(current)),
        }
    }
}

/// Wraps a closure that is not itself `Send` — typically one capturing an
/// `Rc<dyn Fn>` user callback — but that is only ever constructed and run on
/// the same loop thread, so no send actually occurs.
///
/// `EventLoop::queue_in_loop` requires `Send` unconditionally, even for
/// tasks enqueued by the loop thread for itself (e.g. a `TcpConnection`
/// deferring its write-complete callback from inside `handle_write`). This
/// is the same kind of manually upheld promise as the `unsafe impl Send` on
/// `EventLoop`/`TcpConnection` themselves: the assertion lives here instead
/// of at every call site.
pub(crate) fn assert_send<F>(f: F) -> impl FnOnce() + Send + 'static
where
    F: FnOnce() + 'static,
{
    struct AssertSend<F>(F);
    unsafe impl<F> Send for AssertSend<F> {}
    let wrapped = AssertSend(f);
    move || (wrapped.0)()
}
