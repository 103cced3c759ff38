//! RAII handle over a TCP socket descriptor.

use std::io;
use std::net::SocketAddrV4;
use std::os::unix::io::RawFd;

use crate::address::Address;
use crate::sys;

/// Owns exactly one socket fd, closing it on drop.
///
/// A thin non-copyable wrapper that does not itself decide policy (who
/// reads, who writes) and only exposes the handful of setup operations a
/// listening or connected socket needs.
#[derive(Debug)]
pub(crate) struct Socket {
    fd: RawFd,
}

impl Socket {
    pub(crate) fn new_nonblocking_v4() -> io::Result<Socket> {
        Ok(Socket {
            fd: sys::new_nonblocking_v4()?,
        })
    }

    /// Takes ownership of an fd obtained elsewhere (e.g. `accept`).
    pub(crate) fn from_raw_fd(fd: RawFd) -> Socket {
        Socket { fd }
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }

    pub(crate) fn set_reuseaddr(&self, on: bool) -> io::Result<()> {
        sys::set_reuseaddr(self.fd, on)
    }

    pub(crate) fn set_nodelay(&self, on: bool) -> io::Result<()> {
        sys::set_nodelay(self.fd, on)
    }

    pub(crate) fn bind(&self, addr: Address) -> io::Result<()> {
        sys::bind(self.fd, SocketAddrV4::new(addr.ip(), addr.port()))
    }

    pub(crate) fn listen(&self) -> io::Result<()> {
        sys::listen(self.fd)
    }

    /// Accepts one pending connection, returning the new socket and the
    /// peer's address. Returns `Err(WouldBlock)` when nothing is pending.
    pub(crate) fn accept(&self) -> io::Result<(Socket, Address)> {
        let (fd, peer) = sys::accept(self.fd)?;
        Ok((Socket::from_raw_fd(fd), Address::from_socket_addr_v4(peer)))
    }

    pub(crate) fn local_addr(&self) -> io::Result<Address> {
        sys::getsockname(self.fd).map(Address::from_socket_addr_v4)
    }

    pub(crate) fn shutdown_write(&self) -> io::Result<()> {
        sys::shutdown_write(self.fd)
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        let _ = sys::close(self.fd);
    }
}
