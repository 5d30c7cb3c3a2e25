//! Error types for connection setup and the relay loop.
//!
//! Classifies failures into configuration errors (detected before any
//! socket work) and connection/runtime errors, and maps each class to a
//! process exit status.

use std::io;

use thiserror::Error;

use crate::relay::EndpointId;

/// Errors that can occur while setting up or driving a relay session.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Neither or both transport modes were selected
    #[error("select exactly one of --listen or --connect")]
    ModeSelection,

    /// A port argument did not parse as a TCP port number
    #[error("invalid port '{value}': {source}")]
    InvalidPort {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    /// Creating or configuring the listening socket failed
    #[error("failed to listen on port {port}: {source}")]
    Listen {
        port: u16,
        #[source]
        source: io::Error,
    },

    /// Waiting for the single inbound connection failed
    #[error("failed to accept a connection on port {port}: {source}")]
    Accept {
        port: u16,
        #[source]
        source: io::Error,
    },

    /// The outbound connection failed (refused, unreachable, timed out)
    #[error("failed to connect to {address}:{port}: {source}")]
    Connect {
        address: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// A descriptor could not be switched to non-blocking mode
    #[error("failed to set {endpoint} non-blocking: {source}")]
    Nonblocking {
        endpoint: EndpointId,
        #[source]
        source: io::Error,
    },

    /// The readiness wait itself failed
    #[error("readiness wait failed: {source}")]
    Poll {
        #[source]
        source: io::Error,
    },

    /// Every read source failed before either side closed cleanly
    #[error("connection lost: {source}")]
    ConnectionLost {
        #[source]
        source: io::Error,
    },
}

impl RelayError {
    /// Map error class to process exit status.
    ///
    /// Configuration errors use 2, matching clap's usage-error status.
    /// Connection and runtime failures use 1. Graceful end-of-stream is not
    /// an error and exits 0.
    pub fn exit_code(&self) -> i32 {
        match self {
            RelayError::ModeSelection | RelayError::InvalidPort { .. } => 2,
            RelayError::Listen { .. }
            | RelayError::Accept { .. }
            | RelayError::Connect { .. }
            | RelayError::Nonblocking { .. }
            | RelayError::Poll { .. }
            | RelayError::ConnectionLost { .. } => 1,
        }
    }
}
