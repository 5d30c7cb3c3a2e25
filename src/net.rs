//! Connection setup: one listener accept, or one outbound connect.
//!
//! Either path yields the single peer socket the relay loop runs over.
//! Nothing here retries; a failed bind, accept, or connect is fatal.

use std::io;
use std::net::{TcpListener, TcpStream};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use crate::error::RelayError;

/// Listen on `port` and accept exactly one inbound connection.
///
/// The listening socket is dropped as soon as the connection is accepted;
/// no further connections are served.
pub fn listen_accept(port: u16) -> Result<TcpStream, RelayError> {
    let listener = bind_reuseaddr(port).map_err(|source| RelayError::Listen { port, source })?;
    tracing::debug!(port, "listening for one inbound connection");

    let (stream, peer) = listener
        .accept()
        .map_err(|source| RelayError::Accept { port, source })?;
    tracing::debug!(%peer, "accepted connection");
    Ok(stream)
}

/// Establish one outbound connection to `address:port`.
pub fn connect(address: &str, port: u16) -> Result<TcpStream, RelayError> {
    let stream = TcpStream::connect((address, port)).map_err(|source| RelayError::Connect {
        address: address.to_string(),
        port,
        source,
    })?;
    tracing::debug!(address, port, "connected");
    Ok(stream)
}

/// Build a listening socket with `SO_REUSEADDR` set before bind, so a
/// restart does not trip over the previous session's TIME_WAIT socket.
///
/// `TcpListener::bind` offers no hook between socket creation and bind, so
/// the socket is created through libc and handed to the standard library
/// once it is listening. Binds the IPv4 wildcard address with a backlog of
/// 1: exactly one peer is ever served.
fn bind_reuseaddr(port: u16) -> io::Result<TcpListener> {
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    let socket = unsafe { OwnedFd::from_raw_fd(fd) };

    let reuse: libc::c_int = 1;
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            std::ptr::addr_of!(reuse).cast(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    let addr = libc::sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: port.to_be(),
        sin_addr: libc::in_addr {
            s_addr: libc::INADDR_ANY.to_be(),
        },
        sin_zero: [0; 8],
    };
    let rc = unsafe {
        libc::bind(
            socket.as_raw_fd(),
            std::ptr::addr_of!(addr).cast(),
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    if unsafe { libc::listen(socket.as_raw_fd(), 1) } != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(TcpListener::from(socket))
}
