//! A single-threaded-per-loop, multi-reactor TCP server library: one
//! [`EventLoop`] per OS thread, a level-triggered [`Poller`](poller::Poller)
//! wrapping `epoll`, a [`TimerQueue`](timer_queue::TimerQueue) driven by a
//! `timerfd`, and a [`TcpServer`] that accepts on a "base" loop and hands
//! each [`TcpConnection`] to one loop from a round-robin
//! [`LoopThreadPool`](loop_thread::LoopThreadPool).
//!
//! ```no_run
//! use std::sync::Arc;
//! use reactorio::{Address, EventLoop, TcpServer};
//!
//! let loop_ = EventLoop::new().unwrap();
//! let server = TcpServer::new(Arc::clone(&loop_), Address::new(9981)).unwrap();
//! server.set_connection_callback(std::rc::Rc::new(|conn| {
//!     println!("{} connected = {}", conn.name(), conn.connected());
//! }));
//! server.set_message_callback(std::rc::Rc::new(|conn, buf, _receive_time| {
//!     let echoed = buf.retrieve_all_as_vec();
//!     reactorio::TcpConnection::send(conn, &echoed);
//! }));
//! server.set_thread_num(4);
//! server.start();
//! loop_.run();
//! ```
//!
//! Linux-only: the demultiplexer, timer, and wake-up mechanisms are all
//! `epoll`/`timerfd`/`eventfd`, so there is no portable fallback backend.

#![cfg(unix)]

mod acceptor;
mod address;
mod buffer;
mod callbacks;
mod channel;
mod confine;
mod error;
mod event_loop;
mod loop_thread;
mod poller;
mod socket;
mod sys;
mod tcp_connection;
mod tcp_server;
mod timer;
mod timer_queue;

pub use address::Address;
pub use buffer::Buffer;
pub use callbacks::{ConnectionCallback, HighWaterMarkCallback, MessageCallback, WriteCompleteCallback};
pub use error::{Error, Result};
pub use event_loop::EventLoop;
pub use loop_thread::LoopThread;
pub use tcp_connection::{TcpConnection, TcpConnectionPtr};
pub use tcp_server::TcpServer;
pub use timer::TimerId;
