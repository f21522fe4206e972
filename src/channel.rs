//! Socket plumbing shared by every probe.
//!
//! Every descriptor here is owned (`socket2::Socket`, `OwnedFd`) so it is
//! closed exactly once when the probe call that opened it returns, whichever
//! way it returns.

use std::io;
use std::mem::MaybeUninit;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::trace;

use crate::error::{ProbeError, Result};

/// Opens an IPv4 socket and applies `timeout` to both directions.
///
/// On any setsockopt failure the new socket is dropped (and closed) before
/// the error is returned.
pub fn open_socket(kind: Type, protocol: Protocol, timeout: Duration) -> Result<Socket> {
    let socket = Socket::new(Domain::IPV4, kind, Some(protocol))
        .map_err(|e| ProbeError::system(e, open_context(kind)))?;

    socket
        .set_read_timeout(Some(timeout))
        .map_err(|e| ProbeError::system(e, "setsockopt SO_RCVTIMEO failed"))?;
    socket
        .set_write_timeout(Some(timeout))
        .map_err(|e| ProbeError::system(e, "setsockopt SO_SNDTIMEO failed"))?;

    trace!(fd = socket.as_raw_fd(), ?timeout, "socket opened");
    Ok(socket)
}

fn open_context(kind: Type) -> &'static str {
    if kind == Type::RAW {
        "socket failed. need CAP_NET_RAW?"
    } else {
        "socket failed"
    }
}

/// Local address the kernel picks when sending to `destination`.
///
/// Connecting a UDP socket only selects a route; nothing goes on the wire.
pub fn route_source(destination: Ipv4Addr) -> Result<Ipv4Addr> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| ProbeError::system(e, open_context(Type::DGRAM)))?;
    socket
        .connect(&SockAddr::from(SocketAddrV4::new(destination, 9)))
        .map_err(|e| ProbeError::system(e, "route lookup failed"))?;
    let local = socket
        .local_addr()
        .map_err(|e| ProbeError::system(e, "getsockname failed"))?;

    local
        .as_socket_ipv4()
        .map(|addr| *addr.ip())
        .ok_or_else(|| ProbeError::InvalidArgument(format!("no IPv4 route to {destination}")))
}

/// Send/receive primitives a probe needs from a raw socket.
pub trait DatagramChannel {
    fn send_to(&self, bytes: &[u8], destination: SocketAddrV4) -> io::Result<usize>;

    /// Blocks up to the socket receive timeout.
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, Option<SocketAddrV4>)>;

    /// Returns `ErrorKind::WouldBlock` when nothing is queued.
    fn recv_nonblocking(&self, buf: &mut [u8]) -> io::Result<usize>;
}

/// A raw IPv4 socket for one probe call.
#[derive(Debug)]
pub struct RawChannel {
    socket: Socket,
}

impl RawChannel {
    pub fn open(protocol: Protocol, timeout: Duration) -> Result<Self> {
        Ok(RawChannel {
            socket: open_socket(Type::RAW, protocol, timeout)?,
        })
    }
}

impl AsRawFd for RawChannel {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

impl DatagramChannel for RawChannel {
    fn send_to(&self, bytes: &[u8], destination: SocketAddrV4) -> io::Result<usize> {
        self.socket.send_to(bytes, &SockAddr::from(destination))
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, Option<SocketAddrV4>)> {
        let (n, addr) = self.socket.recv_from(as_uninit(buf))?;
        Ok((n, addr.as_socket_ipv4()))
    }

    fn recv_nonblocking(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv_with_flags(as_uninit(buf), libc::MSG_DONTWAIT)
    }
}

fn as_uninit(buf: &mut [u8]) -> &mut [MaybeUninit<u8>] {
    // SAFETY: MaybeUninit<u8> has the same layout as u8, and the socket only
    // ever writes initialised bytes into the slice.
    unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) }
}

/// Bounded wait for a descriptor to become readable.
pub trait Readiness {
    /// Number of ready descriptors; 0 means the timeout elapsed.
    fn wait(&mut self, timeout: Duration) -> io::Result<usize>;
}

/// Single-member epoll set.
#[derive(Debug)]
pub struct Epoll {
    fd: OwnedFd,
}

impl Epoll {
    pub fn new() -> Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(ProbeError::system(io::Error::last_os_error(), "epoll_create failed"));
        }
        // SAFETY: epoll_create1 returned a fresh descriptor nobody else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Epoll { fd })
    }

    /// Creates the set and registers `target` for readability.
    pub fn watch(target: RawFd) -> Result<Self> {
        let epoll = Self::new()?;
        let mut event = libc::epoll_event {
            events: libc::EPOLLIN as u32,
            u64: target as u64,
        };
        let ret = unsafe {
            libc::epoll_ctl(epoll.fd.as_raw_fd(), libc::EPOLL_CTL_ADD, target, &mut event)
        };
        if ret != 0 {
            return Err(ProbeError::system(io::Error::last_os_error(), "epoll_ctl failed"));
        }
        Ok(epoll)
    }
}

impl Readiness for Epoll {
    fn wait(&mut self, timeout: Duration) -> io::Result<usize> {
        let mut events = [libc::epoll_event { events: 0, u64: 0 }; 1];
        let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        let ready = unsafe {
            libc::epoll_wait(
                self.fd.as_raw_fd(),
                events.as_mut_ptr(),
                events.len() as libc::c_int,
                timeout_ms,
            )
        };
        if ready < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(ready as usize)
    }
}
