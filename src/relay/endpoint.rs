//! Endpoint descriptors, non-blocking mode control, and the bounded
//! read/write primitives the loop is built from.

use std::fmt;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

/// Maximum bytes moved by a single read.
pub const MAX_CHUNK: usize = 4096;

/// Identity of one of the three descriptors the relay works over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointId {
    /// Local input side, read only.
    TerminalIn,
    /// Local output side, write only.
    TerminalOut,
    /// The TCP peer, read/write.
    PeerSocket,
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EndpointId::TerminalIn => "stdin",
            EndpointId::TerminalOut => "stdout",
            EndpointId::PeerSocket => "socket",
        };
        f.write_str(name)
    }
}

/// Non-owning descriptor triple the loop runs over.
///
/// The caller keeps the owning handles (the `TcpStream`, the stdio locks)
/// alive for as long as the relay runs.
#[derive(Debug, Clone, Copy)]
pub struct Endpoints {
    terminal_in: RawFd,
    terminal_out: RawFd,
    socket: RawFd,
}

impl Endpoints {
    /// Relay between the process stdio and `socket`.
    pub fn stdio(socket: &impl AsRawFd) -> Self {
        Self {
            terminal_in: libc::STDIN_FILENO,
            terminal_out: libc::STDOUT_FILENO,
            socket: socket.as_raw_fd(),
        }
    }

    /// Relay over explicit descriptors.
    pub fn from_raw(terminal_in: RawFd, terminal_out: RawFd, socket: RawFd) -> Self {
        Self {
            terminal_in,
            terminal_out,
            socket,
        }
    }

    /// Descriptor behind an endpoint id.
    pub fn fd(&self, id: EndpointId) -> RawFd {
        match id {
            EndpointId::TerminalIn => self.terminal_in,
            EndpointId::TerminalOut => self.terminal_out,
            EndpointId::PeerSocket => self.socket,
        }
    }
}

/// Outcome of one bounded non-blocking read.
#[derive(Debug)]
pub enum ReadOutcome {
    /// Up to [`MAX_CHUNK`] bytes, in arrival order.
    Data(Vec<u8>),
    /// Zero-byte read: the stream is closed.
    Eos,
    /// Nothing available right now.
    WouldBlock,
}

/// Switch `fd` to non-blocking mode. Idempotent; re-applying is harmless.
pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if flags & libc::O_NONBLOCK != 0 {
        return Ok(());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// One bounded read from `fd`.
///
/// `EWOULDBLOCK` and `EINTR` are expected conditions, not errors; the
/// caller simply skips the endpoint this iteration.
pub fn read_chunk(fd: RawFd) -> io::Result<ReadOutcome> {
    let mut buf = [0u8; MAX_CHUNK];
    let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), MAX_CHUNK) };
    if n < 0 {
        let err = io::Error::last_os_error();
        return match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(ReadOutcome::WouldBlock),
            _ => Err(err),
        };
    }
    if n == 0 {
        return Ok(ReadOutcome::Eos);
    }
    Ok(ReadOutcome::Data(buf[..n as usize].to_vec()))
}

/// One non-blocking write attempt. `None` means the descriptor had no
/// space; the caller retries on the next writable report.
pub fn write_some(fd: RawFd, bytes: &[u8]) -> io::Result<Option<usize>> {
    let n = unsafe { libc::write(fd, bytes.as_ptr().cast(), bytes.len()) };
    if n < 0 {
        let err = io::Error::last_os_error();
        return match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(None),
            _ => Err(err),
        };
    }
    Ok(Some(n as usize))
}
