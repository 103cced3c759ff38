//! Platform glue.
//!
//! The design is Linux-first: the demultiplexer is `epoll`, the timer
//! queue is driven by a `timerfd`, and cross-thread wakeups use
//! `eventfd`. Those are the only kernel facilities consumed from the
//! host OS, so there is exactly one `sys` backend rather than the
//! multi-platform `sys::{unix, windows, ...}` split a general-purpose
//! I/O crate would carry.

#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub(crate) use unix::*;
