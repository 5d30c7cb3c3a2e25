//! Byte relay between the local terminal and a single TCP peer.

pub mod cli;
pub mod error;
pub mod logging;
pub mod net;
pub mod relay;
