mod selector;
mod tcp;
mod timerfd;
mod waker;

pub(crate) use selector::{Interest, Readiness, Selector};
pub(crate) use tcp::{
    accept, bind, close, getsockname, listen, new_nonblocking_v4, set_nodelay, set_reuseaddr,
    shutdown_write, socket_error, write,
};
pub(crate) use timerfd::TimerFd;
pub(crate) use waker::Waker;

/// Issues a libc call, retrying on `EINTR`, and maps `-1` to `io::Error`.
///
/// Every raw syscall in `sys::unix` goes through this so that "retry on
/// EINTR, propagate everything else" is enforced in one place instead of
/// being re-derived at each call site.
macro_rules! syscall {
    ($fn:ident ( $($arg:expr),* $(,)? )) => {{
        loop {
            #[allow(unused_unsafe)]
            let res = unsafe { libc::$fn($($arg),*) };
            if res == -1 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                break Err(err);
            } else {
                break Ok(res);
            }
        }
    }};
}

pub(crate) use syscall;
