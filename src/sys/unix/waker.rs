//! Cross-thread wakeup descriptor.
//!
//! Grounded in `mio`'s `sys::unix::waker::eventfd` backend: `eventfd` is a
//! 64-bit kernel counter; a single 8-byte write unblocks anyone polling it
//! for readability, and a single 8-byte read clears the counter back to
//! zero. Used purely as a scheduling signal: no payload ever travels over
//! the fd itself.

use std::io;
use std::os::unix::io::RawFd;

use super::syscall;

pub(crate) struct Waker {
    fd: RawFd,
}

impl Waker {
    pub(crate) fn new() -> io::Result<Waker> {
        let fd = syscall!(eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC))?;
        Ok(Waker { fd })
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }

    /// Safe to call concurrently from any number of threads.
    pub(crate) fn wake(&self) -> io::Result<()> {
        let buf: [u8; 8] = 1u64.to_ne_bytes();
        match syscall!(write(self.fd, buf.as_ptr() as *const libc::c_void, 8)) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                // The counter would overflow; drain it and retry once.
                self.drain()?;
                self.wake()
            }
            Err(e) => Err(e),
        }
    }

    /// Clears the counter. Called from the owning loop's read callback.
    pub(crate) fn drain(&self) -> io::Result<()> {
        let mut buf = [0u8; 8];
        match syscall!(read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, 8)) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for Waker {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
