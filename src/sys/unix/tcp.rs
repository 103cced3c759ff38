//! Raw TCP socket syscalls.
//!
//! Non-blocking create/bind/listen/accept/shutdown-write/getsockname, in
//! the idiomatic Rust shape also used by `mio`'s `net::tcp::socket`
//! (`SocketAddrV4` in, `RawFd`/`io::Result` out, no hidden
//! abort-on-error: setup-fatal conditions are left for the caller to
//! route through [`crate::error::fatal`]).

use std::io;
use std::mem;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::unix::io::RawFd;

use super::syscall;

/// `sin_addr.s_addr` holds the address bytes in network order; since the
/// struct field is just memory, reading it back as native-endian bytes
/// reproduces the original octets without an extra byte swap.
fn ipv4_from_sin_addr(sin_addr: libc::in_addr) -> Ipv4Addr {
    Ipv4Addr::from(sin_addr.s_addr.to_ne_bytes())
}

fn sockaddr_in(addr: SocketAddrV4) -> (libc::sockaddr_in, libc::socklen_t) {
    let sin = libc::sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: addr.port().to_be(),
        sin_addr: libc::in_addr {
            s_addr: u32::from_ne_bytes(addr.ip().octets()),
        },
        sin_zero: [0; 8],
    };
    (sin, mem::size_of::<libc::sockaddr_in>() as libc::socklen_t)
}

fn set_nonblocking_cloexec(fd: RawFd) -> io::Result<()> {
    let flags = syscall!(fcntl(fd, libc::F_GETFL, 0))?;
    syscall!(fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK))?;
    let fdflags = syscall!(fcntl(fd, libc::F_GETFD, 0))?;
    syscall!(fcntl(fd, libc::F_SETFD, fdflags | libc::O_CLOEXEC))?;
    Ok(())
}

/// Creates a non-blocking, close-on-exec IPv4 TCP socket.
pub(crate) fn new_nonblocking_v4() -> io::Result<RawFd> {
    let fd = syscall!(socket(libc::AF_INET, libc::SOCK_STREAM, libc::IPPROTO_TCP))?;
    if let Err(e) = set_nonblocking_cloexec(fd) {
        unsafe {
            libc::close(fd);
        }
        return Err(e);
    }
    Ok(fd)
}

pub(crate) fn set_reuseaddr(fd: RawFd, on: bool) -> io::Result<()> {
    let val: libc::c_int = if on { 1 } else { 0 };
    syscall!(setsockopt(
        fd,
        libc::SOL_SOCKET,
        libc::SO_REUSEADDR,
        &val as *const libc::c_int as *const libc::c_void,
        mem::size_of::<libc::c_int>() as libc::socklen_t,
    ))
    .map(|_| ())
}

pub(crate) fn set_nodelay(fd: RawFd, on: bool) -> io::Result<()> {
    let val: libc::c_int = if on { 1 } else { 0 };
    syscall!(setsockopt(
        fd,
        libc::IPPROTO_TCP,
        libc::TCP_NODELAY,
        &val as *const libc::c_int as *const libc::c_void,
        mem::size_of::<libc::c_int>() as libc::socklen_t,
    ))
    .map(|_| ())
}

pub(crate) fn bind(fd: RawFd, addr: SocketAddrV4) -> io::Result<()> {
    let (sin, len) = sockaddr_in(addr);
    syscall!(bind(fd, &sin as *const _ as *const libc::sockaddr, len)).map(|_| ())
}

/// Listens with a backlog of `SOMAXCONN`, matching `sockets::listenOrDie`.
pub(crate) fn listen(fd: RawFd) -> io::Result<()> {
    syscall!(listen(fd, libc::SOMAXCONN)).map(|_| ())
}

/// Accepts one pending connection, returning its fd and peer address.
///
/// Unlike the blocking retry the [`syscall!`] macro performs for `EINTR`,
/// the caller here is expected to treat `WouldBlock` as "no pending
/// connection right now" rather than an error: the `Channel` is
/// level-triggered and will be asked to accept again on the next
/// readiness notification.
pub(crate) fn accept(fd: RawFd) -> io::Result<(RawFd, SocketAddrV4)> {
    let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    let connfd = syscall!(accept(
        fd,
        &mut sin as *mut _ as *mut libc::sockaddr,
        &mut len
    ))?;
    if let Err(e) = set_nonblocking_cloexec(connfd) {
        unsafe {
            libc::close(connfd);
        }
        return Err(e);
    }
    let peer = SocketAddrV4::new(ipv4_from_sin_addr(sin.sin_addr), u16::from_be(sin.sin_port));
    Ok((connfd, peer))
}

pub(crate) fn getsockname(fd: RawFd) -> io::Result<SocketAddrV4> {
    let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    syscall!(getsockname(
        fd,
        &mut sin as *mut _ as *mut libc::sockaddr,
        &mut len
    ))?;
    Ok(SocketAddrV4::new(
        ipv4_from_sin_addr(sin.sin_addr),
        u16::from_be(sin.sin_port),
    ))
}

pub(crate) fn shutdown_write(fd: RawFd) -> io::Result<()> {
    syscall!(shutdown(fd, libc::SHUT_WR)).map(|_| ())
}

pub(crate) fn close(fd: RawFd) -> io::Result<()> {
    syscall!(close(fd)).map(|_| ())
}

/// A single, non-retrying `write(2)`. Callers (`TcpConnection::send_in_loop`,
/// `handle_write`) are responsible for buffering whatever this does not
/// accept; looping here would defeat the fairness argument that motivates
/// one syscall per readiness notification.
pub(crate) fn write(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    let n = syscall!(write(fd, buf.as_ptr() as *const libc::c_void, buf.len()))?;
    Ok(n as usize)
}

/// Reads back the pending `SO_ERROR` on a socket, the way `getsockopt`
/// surfaces an async connect/write failure that epoll reported via
/// `EPOLLERR`.
pub(crate) fn socket_error(fd: RawFd) -> io::Error {
    let mut err: libc::c_int = 0;
    let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
    let res = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            &mut err as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };
    if res == -1 {
        return io::Error::last_os_error();
    }
    io::Error::from_raw_os_error(err)
}
