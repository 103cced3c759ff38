//! Shared callback type aliases.
//!
//! Every user-facing callback is shared, not owned, by each `TcpConnection`
//! it is set on: the same closure should be assignable to many connections
//! at once. `Rc<dyn Fn(..)>` rather than `Rc<dyn FnMut(..)>` expresses that
//! sharing — a callback that needs to mutate captured state reaches for a
//! `Cell`/`RefCell` internally, the ordinary way to do that in Rust, which
//! keeps the callback itself cheaply `Clone`-and-`Rc`-shareable.

use std::rc::Rc;
use std::time::Instant;

use crate::buffer::Buffer;
use crate::tcp_connection::TcpConnectionPtr;

/// Invoked both when a connection is established and when it is about to
/// be destroyed; callers distinguish the two with `TcpConnection::connected`.
pub type ConnectionCallback = Rc<dyn Fn(&TcpConnectionPtr)>;

/// Invoked whenever `handleRead` delivers at least one byte. The buffer
/// passed in is the connection's own input buffer; the callback is
/// expected to consume what it wants via `retrieve`/`retrieve_all`.
pub type MessageCallback = Rc<dyn Fn(&TcpConnectionPtr, &mut Buffer, Instant)>;

/// Invoked once the output buffer has been fully drained by `handleWrite`.
pub type WriteCompleteCallback = Rc<dyn Fn(&TcpConnectionPtr)>;

/// Invoked on the rising-edge crossing of the high-water-mark threshold.
pub type HighWaterMarkCallback = Rc<dyn Fn(&TcpConnectionPtr, usize)>;

/// Internal-only: how a `TcpConnection` tells its owner (a `TcpServer`) that
/// it has reached `handleClose` and should be removed from the registry.
pub(crate) type CloseCallback = Rc<dyn Fn(&TcpConnectionPtr)>;
