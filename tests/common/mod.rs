//! Shared test utilities.

#![allow(dead_code)]

use std::net::TcpListener;

/// Find an available port for testing.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to free port");
    listener
        .local_addr()
        .expect("listener has no local address")
        .port()
}
