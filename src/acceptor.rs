//! Listening socket that hands accepted connections to a callback.

use std::cell::{Cell, RefCell};
use std::io;
use std::sync::{Arc, Weak};

use crate::address::Address;
use crate::channel::Channel;
use crate::error::fatal;
use crate::event_loop::EventLoop;
use crate::socket::Socket;

pub(crate) type NewConnectionCallback = Box<dyn FnMut(Socket, Address) + Send>;

/// Errnos `accept` can return that mean "try again later", not "the
/// listening socket is broken": transient per-connection conditions
/// (the peer reset before we got to it, a signal interrupted the call,
/// or the process is out of descriptors) rather than a setup failure.
/// Anything else from `accept` is treated as fatal.
fn is_accept_transient(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::EAGAIN)
            | Some(libc::ECONNABORTED)
            | Some(libc::EINTR)
            | Some(libc::EPROTO)
            | Some(libc::EPERM)
            | Some(libc::EMFILE)
    )
}

/// A single non-blocking listening socket bound to one loop, reading
/// exactly one pending connection per readiness notification
/// (accept-once, not accept-until-EAGAIN, for the same level-triggered
/// fairness reason `Buffer::read_from` reads once).
///
/// Held as `Arc<Acceptor>` rather than `Rc<RefCell<Acceptor>>` because
/// `TcpServer::start` schedules `Acceptor::listen` via
/// `EventLoop::run_in_loop`, whose closures must be `Send`; an `Rc` can
/// never satisfy that bound no matter what is stored inside it.
pub(crate) struct Acceptor {
    loop_: Arc<EventLoop>,
    socket: Socket,
    channel: RefCell<Channel>,
    new_connection_callback: RefCell<Option<NewConnectionCallback>>,
    listening: Cell<bool>,
}

// SAFETY: every field is touched only from `loop_`'s owning thread; each
// method that does so asserts that with `assert_in_loop_thread`. The
// `Arc<Acceptor>` handle itself may be moved to another thread so it can be
// captured by `run_in_loop` closures.
unsafe impl Send for Acceptor {}
unsafe impl Sync for Acceptor {}

impl Acceptor {
    pub(crate) fn new(loop_: Arc<EventLoop>, listen_addr: Address) -> io::Result<Arc<Acceptor>> {
        let socket = Socket::new_nonblocking_v4()?;
        socket.set_reuseaddr(true)?;
        socket.bind(listen_addr)?;
        let channel = Channel::new(socket.fd());

        let acceptor = Arc::new(Acceptor {
            loop_,
            socket,
            channel: RefCell::new(channel),
            new_connection_callback: RefCell::new(None),
            listening: Cell::new(false),
        });

        let weak: Weak<Acceptor> = Arc::downgrade(&acceptor);
        acceptor
            .channel
            .borrow_mut()
            .set_read_callback(Box::new(move |_now| {
                if let Some(acceptor) = weak.upgrade() {
                    Acceptor::handle_read(&acceptor);
                }
            }));

        Ok(acceptor)
    }

    pub(crate) fn set_new_connection_callback(&self, cb: NewConnectionCallback) {
        *self.new_connection_callback.borrow_mut() = Some(cb);
    }

    pub(crate) fn listening(&self) -> bool {
        self.listening.get()
    }

    /// The address actually bound, which may differ from the address
    /// passed to [`Acceptor::new`] when that address used port 0.
    pub(crate) fn local_addr(&self) -> io::Result<Address> {
        self.socket.local_addr()
    }

    /// Starts listening and begins watching for incoming connections. Must
    /// run on the owning loop's thread; a `listen(2)` failure here is
    /// treated as setup-fatal, matching `sockets::listenOrDie`.
    pub(crate) fn listen(this: &Arc<Acceptor>) {
        this.loop_.assert_in_loop_thread();
        this.listening.set(true);
        this.socket
            .listen()
            .unwrap_or_else(|e| fatal("Acceptor::listen", &e));
        this.channel.borrow_mut().enable_reading();
        let mut channel = this.channel.borrow_mut();
        this.loop_.update_channel(&mut channel);
    }

    fn handle_read(this: &Arc<Acceptor>) {
        this.loop_.assert_in_loop_thread();
        match this.socket.accept() {
            Ok((conn_socket, peer_addr)) => {
                if let Some(cb) = this.new_connection_callback.borrow_mut().as_mut() {
                    cb(conn_socket, peer_addr);
                }
                // else: `conn_socket` is dropped here, closing the fd,
                // matching `sockets::close(connfd)` when no callback is set.
            }
            Err(e) if is_accept_transient(&e) => {
                #[cfg(feature = "log")]
                log::warn!("Acceptor::handle_read accept failed: {e}");
            }
            Err(e) => fatal("Acceptor::handle_read accept", &e),
        }
    }
}
