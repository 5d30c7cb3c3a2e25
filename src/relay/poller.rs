//! Readiness multiplexing over the watched endpoints.
//!
//! The loop logic never touches `select()` directly; it hands the poller
//! its watch sets and gets back which endpoints are readable, writable, or
//! in an exceptional state.

use std::io;
use std::os::unix::io::RawFd;

use super::endpoint::{EndpointId, Endpoints};

/// Small ordered set of endpoints sharing one readiness interest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSet {
    ids: Vec<EndpointId>,
}

impl WatchSet {
    pub fn new(ids: &[EndpointId]) -> Self {
        let mut set = Self::default();
        for id in ids {
            set.insert(*id);
        }
        set
    }

    pub fn insert(&mut self, id: EndpointId) {
        if !self.ids.contains(&id) {
            self.ids.push(id);
        }
    }

    pub fn remove(&mut self, id: EndpointId) {
        self.ids.retain(|other| *other != id);
    }

    pub fn contains(&self, id: EndpointId) -> bool {
        self.ids.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = EndpointId> + '_ {
        self.ids.iter().copied()
    }
}

/// What one readiness wait reported.
#[derive(Debug, Default)]
pub struct Readiness {
    pub readable: Vec<EndpointId>,
    pub writable: Vec<EndpointId>,
    pub exceptional: Vec<EndpointId>,
}

/// Blocking readiness wait over the watched descriptor sets.
///
/// Uses `select()` rather than `poll()`; it behaves reliably on macOS for
/// terminal descriptors. The wait has no timeout. This is the single
/// suspension point of the whole process: everything else is non-blocking.
#[derive(Debug, Default)]
pub struct Poller;

impl Poller {
    /// Block until at least one watched endpoint is ready, or an
    /// exceptional condition is reported on one of them.
    pub fn wait(
        &self,
        endpoints: &Endpoints,
        read: &WatchSet,
        write: &WatchSet,
    ) -> io::Result<Readiness> {
        loop {
            let mut read_fds: libc::fd_set = unsafe { std::mem::zeroed() };
            let mut write_fds: libc::fd_set = unsafe { std::mem::zeroed() };
            let mut except_fds: libc::fd_set = unsafe { std::mem::zeroed() };
            unsafe {
                libc::FD_ZERO(&mut read_fds);
                libc::FD_ZERO(&mut write_fds);
                libc::FD_ZERO(&mut except_fds);
            }

            let mut max_fd: RawFd = -1;
            for id in read.iter() {
                let fd = endpoints.fd(id);
                unsafe {
                    libc::FD_SET(fd, &mut read_fds);
                    libc::FD_SET(fd, &mut except_fds);
                }
                max_fd = max_fd.max(fd);
            }
            for id in write.iter() {
                let fd = endpoints.fd(id);
                unsafe {
                    libc::FD_SET(fd, &mut write_fds);
                    libc::FD_SET(fd, &mut except_fds);
                }
                max_fd = max_fd.max(fd);
            }

            let ret = unsafe {
                libc::select(
                    max_fd + 1,
                    &mut read_fds,
                    &mut write_fds,
                    &mut except_fds,
                    std::ptr::null_mut(),
                )
            };
            if ret < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    // EINTR: select may have clobbered the fd sets; rebuild.
                    continue;
                }
                return Err(err);
            }

            let mut ready = Readiness::default();
            for id in read.iter() {
                if unsafe { libc::FD_ISSET(endpoints.fd(id), &read_fds) } {
                    ready.readable.push(id);
                }
            }
            for id in write.iter() {
                if unsafe { libc::FD_ISSET(endpoints.fd(id), &write_fds) } {
                    ready.writable.push(id);
                }
            }
            for id in read.iter().chain(write.iter()) {
                if unsafe { libc::FD_ISSET(endpoints.fd(id), &except_fds) }
                    && !ready.exceptional.contains(&id)
                {
                    ready.exceptional.push(id);
                }
            }
            return Ok(ready);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};
    use std::os::unix::io::AsRawFd;

    fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn watch_set_keeps_one_entry_per_endpoint() {
        let mut set = WatchSet::new(&[EndpointId::PeerSocket, EndpointId::TerminalIn]);
        set.insert(EndpointId::PeerSocket);
        assert!(set.contains(EndpointId::PeerSocket));
        assert_eq!(set.iter().count(), 2);

        set.remove(EndpointId::PeerSocket);
        assert!(!set.contains(EndpointId::PeerSocket));
        assert!(!set.is_empty());

        set.remove(EndpointId::TerminalIn);
        assert!(set.is_empty());
    }

    #[test]
    fn reports_a_socket_with_pending_bytes_as_readable() {
        let (terminal, _terminal_peer) = tcp_pair();
        let (socket, mut socket_peer) = tcp_pair();
        socket_peer.write_all(b"ping").unwrap();

        let endpoints = Endpoints::from_raw(
            terminal.as_raw_fd(),
            terminal.as_raw_fd(),
            socket.as_raw_fd(),
        );
        let read = WatchSet::new(&[EndpointId::PeerSocket, EndpointId::TerminalIn]);
        let write = WatchSet::default();

        let ready = Poller.wait(&endpoints, &read, &write).unwrap();
        assert!(ready.readable.contains(&EndpointId::PeerSocket));
        assert!(!ready.readable.contains(&EndpointId::TerminalIn));
        assert!(ready.writable.is_empty());
    }

    #[test]
    fn reports_both_sides_when_both_have_pending_bytes() {
        let (terminal, mut terminal_peer) = tcp_pair();
        let (socket, mut socket_peer) = tcp_pair();
        terminal_peer.write_all(b"a").unwrap();
        socket_peer.write_all(b"b").unwrap();

        let endpoints = Endpoints::from_raw(
            terminal.as_raw_fd(),
            terminal.as_raw_fd(),
            socket.as_raw_fd(),
        );
        let read = WatchSet::new(&[EndpointId::PeerSocket, EndpointId::TerminalIn]);

        // Both writes land eventually; wait until both show up at once.
        loop {
            let ready = Poller.wait(&endpoints, &read, &WatchSet::default()).unwrap();
            if ready.readable.contains(&EndpointId::TerminalIn)
                && ready.readable.contains(&EndpointId::PeerSocket)
            {
                break;
            }
        }
    }

    #[test]
    fn reports_an_idle_socket_as_writable() {
        let (terminal, _terminal_peer) = tcp_pair();
        let (socket, _socket_peer) = tcp_pair();

        let endpoints = Endpoints::from_raw(
            terminal.as_raw_fd(),
            terminal.as_raw_fd(),
            socket.as_raw_fd(),
        );
        let write = WatchSet::new(&[EndpointId::PeerSocket]);

        let ready = Poller
            .wait(&endpoints, &WatchSet::default(), &write)
            .unwrap();
        assert_eq!(ready.writable, vec![EndpointId::PeerSocket]);
    }
}
