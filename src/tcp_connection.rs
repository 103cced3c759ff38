//! A single non-blocking TCP connection's state machine.
//!
//! A connection is handed out as
//! [`TcpConnectionPtr`] (`Arc<TcpConnection>`) rather than `Rc` for the same
//! reason [`crate::acceptor::Acceptor`] is: `TcpServer::new_connection`
//! constructs it on the base loop and then schedules `connect_established`
//! onto the chosen io loop via `EventLoop::run_in_loop`, whose closures must
//! be `Send`.

use std::cell::{Cell, RefCell};
use std::io;
use std::sync::{Arc, Weak};
use std::time::Instant;

use crate::address::Address;
use crate::buffer::Buffer;
use crate::callbacks::{
    CloseCallback, ConnectionCallback, HighWaterMarkCallback, MessageCallback, WriteCompleteCallback,
};
use crate::channel::Channel;
use crate::confine::{assert_send, LazyThreadGuard};
use crate::event_loop::EventLoop;
use crate::socket::Socket;
use crate::sys;

/// Shared handle to a connection. Cloning this is how a callback keeps the
/// connection alive past the synchronous call that invoked it.
pub type TcpConnectionPtr = Arc<TcpConnection>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

/// One accepted (or, in a future client-side extension, dialed) TCP
/// connection. Every mutating entry point asserts it is running on the
/// owning loop's thread; the handful of calls a user may legitimately make
/// from another thread (`send`, `shutdown`) detect that and reschedule
/// themselves onto the right thread instead of touching state directly.
pub struct TcpConnection {
    loop_: Arc<EventLoop>,
    guard: LazyThreadGuard,
    name: String,
    state: Cell<ConnState>,
    socket: Socket,
    channel: RefCell<Channel>,
    local_addr: Address,
    peer_addr: Address,
    input_buffer: RefCell<Buffer>,
    output_buffer: RefCell<Buffer>,
    high_water_mark: Cell<usize>,
    connection_callback: RefCell<Option<ConnectionCallback>>,
    message_callback: RefCell<Option<MessageCallback>>,
    write_complete_callback: RefCell<Option<WriteCompleteCallback>>,
    high_water_mark_callback: RefCell<Option<HighWaterMarkCallback>>,
    close_callback: RefCell<Option<CloseCallback>>,
}

// SAFETY: all mutation happens on `loop_`'s owning thread, asserted at every
// entry point via `guard`. The `Arc<TcpConnection>` handle is shared with
// `TcpServer`'s connection registry and with task closures that cross
// threads to get there; none of them touch the confined fields off-thread.
unsafe impl Send for TcpConnection {}
unsafe impl Sync for TcpConnection {}

/// Default output-buffer size, in bytes, at which the high-water-mark
/// callback fires. 64 MiB, matching the original's default.
const DEFAULT_HIGH_WATER_MARK: usize = 64 * 1024 * 1024;

impl TcpConnection {
    pub(crate) fn new(
        loop_: Arc<EventLoop>,
        name: String,
        socket: Socket,
        local_addr: Address,
        peer_addr: Address,
    ) -> TcpConnectionPtr {
        let channel = Channel::new(socket.fd());

        let conn = Arc::new(TcpConnection {
            loop_,
            guard: LazyThreadGuard::new(),
            name,
            state: Cell::new(ConnState::Connecting),
            socket,
            channel: RefCell::new(channel),
            local_addr,
            peer_addr,
            input_buffer: RefCell::new(Buffer::new()),
            output_buffer: RefCell::new(Buffer::new()),
            high_water_mark: Cell::new(DEFAULT_HIGH_WATER_MARK),
            connection_callback: RefCell::new(None),
            message_callback: RefCell::new(None),
            write_complete_callback: RefCell::new(None),
            high_water_mark_callback: RefCell::new(None),
            close_callback: RefCell::new(None),
        });

        let mut channel = conn.channel.borrow_mut();
        let weak: Weak<TcpConnection> = Arc::downgrade(&conn);

        let w = weak.clone();
        channel.set_read_callback(Box::new(move |now| {
            if let Some(conn) = w.upgrade() {
                TcpConnection::handle_read(&conn, now);
            }
        }));
        let w = weak.clone();
        channel.set_write_callback(Box::new(move || {
            if let Some(conn) = w.upgrade() {
                TcpConnection::handle_write(&conn);
            }
        }));
        let w = weak.clone();
        channel.set_close_callback(Box::new(move || {
            if let Some(conn) = w.upgrade() {
                TcpConnection::handle_close(&conn);
            }
        }));
        let w = weak;
        channel.set_error_callback(Box::new(move || {
            if let Some(conn) = w.upgrade() {
                TcpConnection::handle_error(&conn);
            }
        }));
        drop(channel);

        conn
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_addr(&self) -> Address {
        self.local_addr
    }

    pub fn peer_addr(&self) -> Address {
        self.peer_addr
    }

    pub fn connected(&self) -> bool {
        self.state.get() == ConnState::Connected
    }

    pub(crate) fn loop_(&self) -> &Arc<EventLoop> {
        &self.loop_
    }

    pub fn set_tcp_nodelay(&self, on: bool) -> io::Result<()> {
        self.socket.set_nodelay(on)
    }

    pub fn set_connection_callback(&self, cb: ConnectionCallback) {
        *self.connection_callback.borrow_mut() = Some(cb);
    }

    pub fn set_message_callback(&self, cb: MessageCallback) {
        *self.message_callback.borrow_mut() = Some(cb);
    }

    pub fn set_write_complete_callback(&self, cb: WriteCompleteCallback) {
        *self.write_complete_callback.borrow_mut() = Some(cb);
    }

    pub fn set_high_water_mark_callback(&self, cb: HighWaterMarkCallback, mark: usize) {
        *self.high_water_mark_callback.borrow_mut() = Some(cb);
        self.high_water_mark.set(mark);
    }

    pub(crate) fn set_close_callback(&self, cb: CloseCallback) {
        *self.close_callback.borrow_mut() = Some(cb);
    }

    /// Queues `data` for sending. Thread-safe: called from another thread,
    /// it copies `data` and reschedules itself onto the owning loop.
    pub fn send(this: &TcpConnectionPtr, data: &[u8]) {
        if data.is_empty() || this.state.get() != ConnState::Connected {
            return;
        }
        if this.loop_.is_in_loop_thread() {
            TcpConnection::send_in_loop(this, data);
        } else {
            let conn = Arc::clone(this);
            let owned = data.to_vec();
            this.loop_
                .run_in_loop(move || TcpConnection::send_in_loop(&conn, &owned));
        }
    }

    fn send_in_loop(this: &TcpConnectionPtr, data: &[u8]) {
        this.guard.assert_current();
        if this.state.get() == ConnState::Disconnected {
            #[cfg(feature = "log")]
            log::warn!("TcpConnection::send_in_loop [{}] - disconnected, giving up", this.name);
            return;
        }

        let mut wrote = 0usize;
        let mut fault = false;

        let fast_path = !this.channel.borrow().is_writing() && this.output_buffer.borrow().readable_bytes() == 0;
        if fast_path {
            match sys::write(this.socket.fd(), data) {
                Ok(n) => {
                    wrote = n;
                    if wrote == data.len() {
                        if let Some(cb) = this.write_complete_callback.borrow().clone() {
                            let conn = Arc::clone(this);
                            this.loop_.queue_in_loop(assert_send(move || cb(&conn)));
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(_e) => {
                    #[cfg(feature = "log")]
                    log::error!("TcpConnection::send_in_loop [{}] - {_e}", this.name);
                    fault = true;
                }
            }
        }

        if !fault && wrote < data.len() {
            let remaining = data.len() - wrote;
            let old_len = this.output_buffer.borrow().readable_bytes();
            let mark = this.high_water_mark.get();
            if old_len + remaining >= mark && old_len < mark {
                if let Some(cb) = this.high_water_mark_callback.borrow().clone() {
                    let conn = Arc::clone(this);
                    let new_len = old_len + remaining;
                    this.loop_.queue_in_loop(assert_send(move || cb(&conn, new_len)));
                }
            }
            this.output_buffer.borrow_mut().append(&data[wrote..]);
            if !this.channel.borrow().is_writing() {
                this.channel.borrow_mut().enable_writing();
                let mut channel = this.channel.borrow_mut();
                this.loop_.update_channel(&mut channel);
            }
        }
    }

    /// Half-closes the local write side. Thread-safe like [`TcpConnection::send`].
    pub fn shutdown(this: &TcpConnectionPtr) {
        if this.state.get() == ConnState::Connected {
            this.state.set(ConnState::Disconnecting);
            let conn = Arc::clone(this);
            this.loop_.run_in_loop(move || TcpConnection::shutdown_in_loop(&conn));
        }
    }

    fn shutdown_in_loop(this: &TcpConnectionPtr) {
        this.guard.assert_current();
        if !this.channel.borrow().is_writing() {
            let _ = this.socket.shutdown_write();
        }
    }

    /// Moves the connection from Connecting to Connected, enables read
    /// readiness, and fires the user's connection callback. Must run on
    /// the owning loop thread; this is also the call that binds
    /// `guard`'s owner for every later confined call.
    pub(crate) fn connect_established(this: &TcpConnectionPtr) {
        this.guard.assert_current();
        debug_assert_eq!(this.state.get(), ConnState::Connecting);
        this.state.set(ConnState::Connected);
        this.channel.borrow_mut().enable_reading();
        let mut channel = this.channel.borrow_mut();
        this.loop_.update_channel(&mut channel);
        drop(channel);

        if let Some(cb) = this.connection_callback.borrow().clone() {
            cb(this);
        }
    }

    /// Tears the connection down: disables the channel, deregisters it from
    /// the poller, and fires the connection callback one last time. May be
    /// reached directly (without `handle_close`) when `TcpServer` is torn
    /// down while the connection is still open.
    pub(crate) fn connect_destroyed(this: &TcpConnectionPtr) {
        this.guard.assert_current();
        if this.state.get() == ConnState::Connected || this.state.get() == ConnState::Disconnecting {
            this.state.set(ConnState::Disconnected);
            this.channel.borrow_mut().disable_all();
            if let Some(cb) = this.connection_callback.borrow().clone() {
                cb(this);
            }
        }
        let mut channel = this.channel.borrow_mut();
        this.loop_.remove_channel(&mut channel);
    }

    fn handle_read(this: &TcpConnectionPtr, now: Instant) {
        this.guard.assert_current();
        let result = this.input_buffer.borrow_mut().read_from(this.socket.fd());
        match result {
            Ok(0) => TcpConnection::handle_close(this),
            Ok(_n) => {
                if let Some(cb) = this.message_callback.borrow().clone() {
                    let mut buf = this.input_buffer.borrow_mut();
                    cb(this, &mut buf, now);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(_e) => {
                #[cfg(feature = "log")]
                log::error!("TcpConnection::handle_read [{}] - {_e}", this.name);
                TcpConnection::handle_error(this);
            }
        }
    }

    fn handle_write(this: &TcpConnectionPtr) {
        this.guard.assert_current();
        if !this.channel.borrow().is_writing() {
            #[cfg(feature = "log")]
            log::trace!("TcpConnection::handle_write [{}] - connection is down, no more writing", this.name);
            return;
        }

        let fd = this.socket.fd();
        let written = {
            let out = this.output_buffer.borrow();
            sys::write(fd, out.peek())
        };

        match written {
            Ok(n) => {
                this.output_buffer.borrow_mut().retrieve(n);
                if this.output_buffer.borrow().readable_bytes() == 0 {
                    this.channel.borrow_mut().disable_writing();
                    let mut channel = this.channel.borrow_mut();
                    this.loop_.update_channel(&mut channel);
                    drop(channel);

                    if let Some(cb) = this.write_complete_callback.borrow().clone() {
                        let conn = Arc::clone(this);
                        this.loop_.queue_in_loop(assert_send(move || cb(&conn)));
                    }
                    if this.state.get() == ConnState::Disconnecting {
                        TcpConnection::shutdown_in_loop(this);
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(_e) => {
                #[cfg(feature = "log")]
                log::error!("TcpConnection::handle_write [{}] - {_e}", this.name);
            }
        }
    }

    fn handle_close(this: &TcpConnectionPtr) {
        this.guard.assert_current();
        debug_assert!(matches!(
            this.state.get(),
            ConnState::Connected | ConnState::Disconnecting
        ));
        this.channel.borrow_mut().disable_all();
        let mut channel = this.channel.borrow_mut();
        this.loop_.update_channel(&mut channel);
        drop(channel);

        // Must run last: the close callback is `TcpServer::remove_connection`,
        // which drops the registry's last strong reference to `this`.
        if let Some(cb) = this.close_callback.borrow().clone() {
            cb(this);
        }
    }

    fn handle_error(this: &TcpConnectionPtr) {
        let err = sys::socket_error(this.socket.fd());
        #[cfg(feature = "log")]
        log::error!("TcpConnection::handle_error [{}] - SO_ERROR = {err}", this.name);
        #[cfg(not(feature = "log"))]
        let _ = err;
    }
}
