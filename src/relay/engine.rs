//! The multiplexed relay loop.
//!
//! One blocking suspension point (the readiness wait), non-blocking
//! everything else. The first readiness report locks the relay direction
//! for the rest of the session: terminal input first means every queued
//! chunk goes to the socket, socket input first means every chunk goes to
//! the terminal. Traffic arriving against the locked direction is still
//! read and queued, but never delivered. When both sides are readable in
//! the very first report, terminal input wins the tie; that is the defined
//! rule, not an accident of report ordering.

use std::io;

use crate::error::RelayError;

use super::endpoint::{read_chunk, set_nonblocking, write_some, EndpointId, Endpoints, ReadOutcome};
use super::poller::{Poller, WatchSet};
use super::queue::RelayQueue;

/// How a relay session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A watched endpoint reached end-of-stream. Graceful.
    StreamClosed,
}

/// The relay state machine.
///
/// Owns the queue and the watch sets; holds only non-owning descriptor
/// references to the endpoints themselves.
pub struct Relay {
    endpoints: Endpoints,
    poller: Poller,
    queue: RelayQueue,
    read_watch: WatchSet,
    write_watch: WatchSet,
    direction: Option<EndpointId>,
    last_failure: Option<io::Error>,
}

impl Relay {
    /// Build a relay over an established connection and terminal pair.
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            endpoints,
            poller: Poller,
            queue: RelayQueue::new(),
            read_watch: WatchSet::new(&[EndpointId::PeerSocket, EndpointId::TerminalIn]),
            write_watch: WatchSet::default(),
            direction: None,
            last_failure: None,
        }
    }

    /// Drive the relay until a side closes or no read source remains.
    ///
    /// Returns `Ok(Outcome::StreamClosed)` on a zero-byte read from any
    /// watched endpoint. Returns an error when the read sources were
    /// exhausted by endpoint failures, or when the poller or the mode
    /// setter failed outright.
    pub fn run(&mut self) -> Result<Outcome, RelayError> {
        while !self.read_watch.is_empty() {
            // Re-asserted every pass; an external process can flip the
            // terminal modes back between iterations.
            for id in [EndpointId::TerminalIn, EndpointId::TerminalOut] {
                set_nonblocking(self.endpoints.fd(id))
                    .map_err(|source| RelayError::Nonblocking { endpoint: id, source })?;
            }

            let ready = self
                .poller
                .wait(&self.endpoints, &self.read_watch, &self.write_watch)
                .map_err(|source| RelayError::Poll { source })?;

            if self.direction.is_none() {
                self.lock_direction(ready.readable.contains(&EndpointId::TerminalIn));
            }

            for &id in &ready.readable {
                // Skip anything dropped earlier in this same pass.
                if !self.read_watch.contains(id) {
                    continue;
                }
                match read_chunk(self.endpoints.fd(id)) {
                    Ok(ReadOutcome::Data(data)) => self.queue.push(id, data),
                    Ok(ReadOutcome::Eos) => {
                        tracing::debug!(endpoint = %id, undelivered = self.queue.len(), "end of stream");
                        return Ok(Outcome::StreamClosed);
                    }
                    Ok(ReadOutcome::WouldBlock) => {}
                    Err(err) => self.fail_endpoint(id, err),
                }
            }

            for &id in &ready.writable {
                if !self.write_watch.contains(id) {
                    continue;
                }
                self.flush_one(id);
            }

            for &id in &ready.exceptional {
                self.fail_endpoint(
                    id,
                    io::Error::new(io::ErrorKind::Other, "exceptional descriptor condition"),
                );
            }
        }

        let source = self
            .last_failure
            .take()
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "no readiness sources remain"));
        Err(RelayError::ConnectionLost { source })
    }

    /// One-time direction selection; never revisited, even if the chosen
    /// write target later fails.
    fn lock_direction(&mut self, terminal_first: bool) {
        let target = if terminal_first {
            EndpointId::PeerSocket
        } else {
            EndpointId::TerminalOut
        };
        self.direction = Some(target);
        self.write_watch.insert(target);
        tracing::debug!(%target, "relay direction locked");
    }

    /// Deliver at most one queued chunk to `id`.
    ///
    /// Only chunks read from the locked direction's origin are eligible;
    /// anything read against the flow stays queued forever. A short write
    /// keeps the chunk at the queue head with its offset advanced, so no
    /// byte is dropped or reordered.
    fn flush_one(&mut self, id: EndpointId) {
        let Some(mut chunk) = self.queue.try_pop_from(origin_for(id)) else {
            return;
        };
        match write_some(self.endpoints.fd(id), chunk.remaining()) {
            Ok(Some(n)) => {
                chunk.advance(n);
                if !chunk.is_drained() {
                    tracing::trace!(
                        endpoint = %id,
                        pending = chunk.remaining().len(),
                        "short write, continuing"
                    );
                    self.queue.requeue_front(chunk);
                }
            }
            Ok(None) => self.queue.requeue_front(chunk),
            Err(err) => self.fail_endpoint(id, err),
        }
    }

    /// Remove a failed endpoint from both watch sets and remember why.
    fn fail_endpoint(&mut self, id: EndpointId, err: io::Error) {
        tracing::warn!(endpoint = %id, error = %err, "endpoint failed");
        self.read_watch.remove(id);
        self.write_watch.remove(id);
        self.last_failure = Some(err);
    }
}

/// The read side feeding a write target: terminal input feeds the socket,
/// the socket feeds terminal output.
fn origin_for(target: EndpointId) -> EndpointId {
    match target {
        EndpointId::PeerSocket => EndpointId::TerminalIn,
        EndpointId::TerminalOut | EndpointId::TerminalIn => EndpointId::PeerSocket,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::os::unix::io::AsRawFd;
    use std::thread;
    use std::time::Duration;

    fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    struct Harness {
        terminal_in: TcpStream,
        terminal_out: TcpStream,
        socket: TcpStream,
    }

    /// Stand-in descriptors for a session: two local streams play the
    /// terminal halves, a third plays the peer socket. Returns the harness
    /// (whose fds the relay uses) plus the far side of each stream.
    fn session() -> (Harness, TcpStream, TcpStream, TcpStream) {
        let (terminal_in, terminal_in_peer) = tcp_pair();
        let (terminal_out, terminal_out_peer) = tcp_pair();
        let (socket, socket_peer) = tcp_pair();
        set_nonblocking(socket.as_raw_fd()).unwrap();
        let harness = Harness {
            terminal_in,
            terminal_out,
            socket,
        };
        (harness, terminal_in_peer, terminal_out_peer, socket_peer)
    }

    fn spawn_relay(harness: Harness) -> thread::JoinHandle<Result<Outcome, RelayError>> {
        thread::spawn(move || {
            let endpoints = Endpoints::from_raw(
                harness.terminal_in.as_raw_fd(),
                harness.terminal_out.as_raw_fd(),
                harness.socket.as_raw_fd(),
            );
            let mut relay = Relay::new(endpoints);
            relay.run()
        })
    }

    #[test]
    fn socket_first_locks_inbound_and_peer_close_ends_the_session() {
        let (harness, _terminal_in_peer, mut terminal_out_peer, mut socket_peer) = session();

        socket_peer.write_all(b"hello").unwrap();
        let relay = spawn_relay(harness);

        let mut buf = [0u8; 5];
        terminal_out_peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        drop(socket_peer);
        assert_eq!(relay.join().unwrap().unwrap(), Outcome::StreamClosed);
    }

    #[test]
    fn terminal_first_locks_outbound_and_preserves_order() {
        let (harness, mut terminal_in_peer, _terminal_out_peer, mut socket_peer) = session();

        let mut payload = Vec::new();
        for round in 0u8..=255 {
            payload.extend(std::iter::repeat(round).take(97));
        }
        terminal_in_peer.write_all(&payload).unwrap();
        let relay = spawn_relay(harness);

        let mut delivered = vec![0u8; payload.len()];
        socket_peer.read_exact(&mut delivered).unwrap();
        assert_eq!(delivered, payload);

        drop(terminal_in_peer);
        assert_eq!(relay.join().unwrap().unwrap(), Outcome::StreamClosed);
    }

    #[test]
    fn terminal_wins_the_first_readiness_tie() {
        let (harness, mut terminal_in_peer, mut terminal_out_peer, mut socket_peer) = session();

        // Both sides have bytes pending before the loop starts.
        terminal_in_peer.write_all(b"from-terminal").unwrap();
        socket_peer.write_all(b"from-socket").unwrap();
        thread::sleep(Duration::from_millis(100));
        let relay = spawn_relay(harness);

        let mut buf = [0u8; 13];
        socket_peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"from-terminal");

        // The socket's own bytes were queued but never delivered.
        terminal_out_peer
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let mut scratch = [0u8; 16];
        match terminal_out_peer.read(&mut scratch) {
            Ok(n) => panic!("half-duplex violation: terminal received {n} bytes"),
            Err(err) => assert!(matches!(
                err.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            )),
        }

        drop(terminal_in_peer);
        assert_eq!(relay.join().unwrap().unwrap(), Outcome::StreamClosed);
    }
}
