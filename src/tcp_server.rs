//! The user-facing front-end: owns an `Acceptor`, creates `TcpConnection`s,
//! and hands each to a loop from its `LoopThreadPool`.
//!
//! The inner state is kept in a
//! separately-`Arc`'d, `unsafe impl Send + Sync` struct (`TcpServerInner`)
//! for the same reason `EventLoop`/`TcpConnection` are: the internal close
//! callback fires on an I/O loop's thread and must marshal back to the base
//! loop, which requires capturing a handle inside a `Send`-bounded closure.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::rc::Rc;
use std::sync::{Arc, Weak};

use crate::acceptor::Acceptor;
use crate::address::Address;
use crate::callbacks::{ConnectionCallback, HighWaterMarkCallback, MessageCallback, WriteCompleteCallback};
use crate::event_loop::EventLoop;
use crate::loop_thread::LoopThreadPool;
use crate::socket::Socket;
use crate::tcp_connection::{TcpConnection, TcpConnectionPtr};

struct TcpServerInner {
    base_loop: Arc<EventLoop>,
    name: String,
    acceptor: Arc<Acceptor>,
    thread_pool: RefCell<LoopThreadPool>,
    connection_callback: RefCell<Option<ConnectionCallback>>,
    message_callback: RefCell<Option<MessageCallback>>,
    write_complete_callback: RefCell<Option<WriteCompleteCallback>>,
    high_water_mark_callback: RefCell<Option<(HighWaterMarkCallback, usize)>>,
    started: Cell<bool>,
    next_conn_id: Cell<usize>,
    connections: RefCell<HashMap<String, TcpConnectionPtr>>,
}

// SAFETY: every field is touched only from `base_loop`'s thread (the
// `Acceptor`'s new-connection callback and every `*_in_loop` helper below
// assert that). `Arc<TcpServerInner>` is captured by the close callback
// that crosses from an I/O loop's thread back to the base loop.
unsafe impl Send for TcpServerInner {}
unsafe impl Sync for TcpServerInner {}

/// Owns one listening socket and every connection accepted on it.
///
/// Supports two modes, chosen by [`TcpServer::set_thread_num`]: with zero
/// I/O threads, the `Acceptor` and every `TcpConnection` run on the base
/// loop; with `n > 0`, the `Acceptor` stays on the base loop and new
/// connections are assigned round-robin to `n` separate I/O loops.
pub struct TcpServer {
    inner: Arc<TcpServerInner>,
}

impl TcpServer {
    pub fn new(base_loop: Arc<EventLoop>, listen_addr: Address) -> io::Result<TcpServer> {
        let name = listen_addr.to_string();
        let acceptor = Acceptor::new(Arc::clone(&base_loop), listen_addr)?;
        let thread_pool = LoopThreadPool::new(Arc::clone(&base_loop));

        let inner = Arc::new(TcpServerInner {
            base_loop,
            name,
            acceptor: Arc::clone(&acceptor),
            thread_pool: RefCell::new(thread_pool),
            connection_callback: RefCell::new(None),
            message_callback: RefCell::new(None),
            write_complete_callback: RefCell::new(None),
            high_water_mark_callback: RefCell::new(None),
            started: Cell::new(false),
            next_conn_id: Cell::new(1),
            connections: RefCell::new(HashMap::new()),
        });

        let weak: Weak<TcpServerInner> = Arc::downgrade(&inner);
        acceptor.set_new_connection_callback(Box::new(move |socket, peer_addr| {
            if let Some(inner) = weak.upgrade() {
                TcpServerInner::new_connection(&inner, socket, peer_addr);
            }
        }));

        Ok(TcpServer { inner })
    }

    /// Configures the I/O thread pool. 0 (the default) means every
    /// connection runs on the base loop; must be called before [`TcpServer::start`].
    pub fn set_thread_num(&self, num_threads: usize) {
        self.inner.thread_pool.borrow_mut().set_thread_num(num_threads);
    }

    /// The address actually bound by the listening socket; useful when
    /// constructing the server with port 0 and letting the kernel pick one.
    pub fn local_addr(&self) -> io::Result<Address> {
        self.inner.acceptor.local_addr()
    }

    pub fn set_connection_callback(&self, cb: ConnectionCallback) {
        *self.inner.connection_callback.borrow_mut() = Some(cb);
    }

    pub fn set_message_callback(&self, cb: MessageCallback) {
        *self.inner.message_callback.borrow_mut() = Some(cb);
    }

    pub fn set_write_complete_callback(&self, cb: WriteCompleteCallback) {
        *self.inner.write_complete_callback.borrow_mut() = Some(cb);
    }

    pub fn set_high_water_mark_callback(&self, cb: HighWaterMarkCallback, mark: usize) {
        *self.inner.high_water_mark_callback.borrow_mut() = Some((cb, mark));
    }

    /// Starts the I/O pool (first call only) and schedules `Acceptor::listen`
    /// on the base loop. Idempotent and thread-safe: both effects are
    /// marshalled onto the base loop, so calling this repeatedly or from
    /// another thread is harmless.
    pub fn start(&self) {
        let inner = Arc::clone(&self.inner);
        self.inner.base_loop.run_in_loop(move || TcpServerInner::start_in_loop(&inner));
    }
}

impl TcpServerInner {
    fn start_in_loop(this: &Arc<TcpServerInner>) {
        this.base_loop.assert_in_loop_thread();
        if !this.started.get() {
            this.started.set(true);
            this.thread_pool.borrow_mut().start();
        }
        if !this.acceptor.listening() {
            Acceptor::listen(&this.acceptor);
        }
    }

    /// Invoked by the `Acceptor`'s new-connection callback, always on the
    /// base loop.
    fn new_connection(this: &Arc<TcpServerInner>, socket: Socket, peer_addr: Address) {
        this.base_loop.assert_in_loop_thread();

        let conn_id = this.next_conn_id.get();
        this.next_conn_id.set(conn_id + 1);
        let conn_name = format!("{}#{}", this.name, conn_id);

        #[cfg(feature = "log")]
        log::info!("TcpServer::new_connection [{}] - new connection [{conn_name}] from {peer_addr}", this.name);

        let local_addr = match socket.local_addr() {
            Ok(addr) => addr,
            Err(_e) => {
                #[cfg(feature = "log")]
                log::error!("TcpServer::new_connection - getsockname failed: {_e}");
                peer_addr
            }
        };

        let io_loop = this.thread_pool.borrow_mut().next_loop();
        let conn = TcpConnection::new(Arc::clone(&io_loop), conn_name.clone(), socket, local_addr, peer_addr);

        if let Some(cb) = this.connection_callback.borrow().clone() {
            conn.set_connection_callback(cb);
        }
        if let Some(cb) = this.message_callback.borrow().clone() {
            conn.set_message_callback(cb);
        }
        if let Some(cb) = this.write_complete_callback.borrow().clone() {
            conn.set_write_complete_callback(cb);
        }
        if let Some((cb, mark)) = this.high_water_mark_callback.borrow().clone() {
            conn.set_high_water_mark_callback(cb, mark);
        }

        let weak: Weak<TcpServerInner> = Arc::downgrade(this);
        conn.set_close_callback(Rc::new(move |c: &TcpConnectionPtr| {
            if let Some(inner) = weak.upgrade() {
                TcpServerInner::remove_connection(&inner, c);
            }
        }));

        this.connections.borrow_mut().insert(conn_name, Arc::clone(&conn));

        io_loop.run_in_loop(move || TcpConnection::connect_established(&conn));
    }

    /// Invoked by `TcpConnection::handle_close`, on the connection's own I/O
    /// loop thread; marshals to the base loop since the registry is only
    /// safe to mutate there.
    fn remove_connection(this: &Arc<TcpServerInner>, conn: &TcpConnectionPtr) {
        let this2 = Arc::clone(this);
        let conn2 = Arc::clone(conn);
        this.base_loop
            .run_in_loop(move || TcpServerInner::remove_connection_in_loop(&this2, &conn2));
    }

    fn remove_connection_in_loop(this: &Arc<TcpServerInner>, conn: &TcpConnectionPtr) {
        this.base_loop.assert_in_loop_thread();
        #[cfg(feature = "log")]
        log::info!("TcpServer::remove_connection_in_loop [{}] - connection {}", this.name, conn.name());
        this.connections.borrow_mut().remove(conn.name());

        let io_loop = Arc::clone(conn.loop_());
        let conn = Arc::clone(conn);
        // Queued, not run inline: `handle_close` is still on this
        // connection's own call stack by way of the close callback, so
        // destroying its Channel here would pull the rug out from under it.
        io_loop.queue_in_loop(move || TcpConnection::connect_destroyed(&conn));
    }
}
