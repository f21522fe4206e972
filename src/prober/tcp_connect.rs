use std::io;
use std::net::SocketAddrV4;
use std::time::Duration;

use socket2::{Protocol, SockAddr, Socket, Type};
use tracing::debug;

use crate::channel::open_socket;
use crate::error::{ProbeError, Result};

/// True when a full handshake with `destination` completes.
///
/// The socket is closed with a zero linger, so the kernel answers with RST
/// instead of a FIN exchange and leaves no TIME_WAIT behind.
pub fn probe_tcp(destination: SocketAddrV4, timeout: Duration) -> Result<bool> {
    Ok(connect_with_abort_linger(destination, timeout)?.is_some())
}

/// Connects and arms the abort linger. `Ok(None)` means the connection was
/// refused. The returned socket resets the connection when dropped.
pub fn connect_with_abort_linger(destination: SocketAddrV4, timeout: Duration) -> Result<Option<Socket>> {
    let socket = open_socket(Type::STREAM, Protocol::TCP, timeout)?;

    if let Err(e) = socket.connect(&SockAddr::from(destination)) {
        if e.kind() == io::ErrorKind::ConnectionRefused {
            debug!(dst = %destination, "connection refused");
            return Ok(None);
        }
        return Err(ProbeError::system(e, "connect failed"));
    }

    socket
        .set_linger(Some(Duration::ZERO))
        .map_err(|e| ProbeError::system(e, "setsockopt SO_LINGER failed"))?;
    debug!(dst = %destination, "connected");
    Ok(Some(socket))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, TcpListener};

    fn listener() -> (TcpListener, SocketAddrV4) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
    }

    #[test]
    fn listening_port_is_connectable() {
        let (_listener, addr) = listener();
        assert!(probe_tcp(addr, Duration::from_secs(2)).unwrap());
    }

    #[test]
    fn connected_socket_carries_abort_linger() {
        let (_listener, addr) = listener();
        let socket = connect_with_abort_linger(addr, Duration::from_secs(2))
            .unwrap()
            .expect("listener accepts");
        assert_eq!(socket.linger().unwrap(), Some(Duration::ZERO));
    }

    #[test]
    fn refused_port_is_a_clean_negative() {
        let (listener, addr) = listener();
        drop(listener);
        assert!(!probe_tcp(addr, Duration::from_secs(2)).unwrap());
    }
}
