//! Error taxonomy for the reactor core.
//!
//! The core deliberately does not introduce its own error enum for the
//! common path: kernel-surfaced failures (`read`, `write`, `accept`, ...)
//! are propagated as [`std::io::Error`], exactly as the host OS reports
//! them. A small [`Error`] wraps the handful of cases that are not a bare
//! syscall failure (setup-fatal conditions, and assertion-style invariant
//! violations that a caller may want to match on in tests).

use std::fmt;
use std::io;

/// Result type returned by fallible reactor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can escape the public API.
///
/// Most failures are simply `Error::Io`; the other variants exist for the
/// handful of conditions that are not naturally an `io::Error` (e.g.
/// calling a loop-confined method from the wrong thread).
#[derive(Debug)]
pub enum Error {
    /// A syscall failed; `errno` is preserved via the wrapped `io::Error`.
    Io(io::Error),
    /// A method that must run on its owning loop's thread was called from
    /// another thread. Reaching this indicates a programming error in the
    /// caller, not a recoverable runtime condition.
    WrongThread,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "{e}"),
            Error::WrongThread => {
                write!(f, "operation attempted from a thread that does not own this loop")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::WrongThread => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(e) => e,
            Error::WrongThread => io::Error::new(io::ErrorKind::Other, e.to_string()),
        }
    }
}

/// Aborts the process after logging `msg`.
///
/// Used exclusively for the "setup-fatal" and "internal invariant
/// violation" error classes: conditions the design treats as unrecoverable
/// (creating the epoll/timerfd/eventfd descriptors, `bind`/`listen`
/// failures, or a broken internal invariant).
#[cold]
pub(crate) fn fatal(msg: &str, err: &io::Error) -> ! {
    #[cfg(feature = "log")]
    log::error!("fatal: {msg}: {err}");
    #[cfg(not(feature = "log"))]
    let _ = (msg, err);
    std::process::abort();
}
