//! The readiness-driven relay core.
//!
//! `engine` drives everything: it waits on the poller, drains readable
//! endpoints into the queue, and drains the queue into the locked write
//! target.

mod endpoint;
mod engine;
mod poller;
mod queue;

pub use endpoint::{
    read_chunk, set_nonblocking, write_some, EndpointId, Endpoints, ReadOutcome, MAX_CHUNK,
};
pub use engine::{Outcome, Relay};
pub use poller::{Poller, Readiness, WatchSet};
pub use queue::{Chunk, RelayQueue};
