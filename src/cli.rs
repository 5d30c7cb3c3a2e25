//! Command-line surface.
//!
//! Exactly one transport mode must be selected: listen on a port, or
//! connect to an address and port. Ports travel as strings and are parsed
//! here, so a bad port is rejected before any socket is opened.

use clap::{ArgGroup, Parser};

use crate::error::RelayError;

/// Relay bytes between the terminal and a single TCP peer.
#[derive(Debug, Parser)]
#[command(
    name = "tcpcat",
    version,
    about = "Relay bytes between the terminal and a single TCP peer",
    group(ArgGroup::new("mode").required(true).args(["listen", "connect"]))
)]
pub struct Cli {
    /// Listen on PORT and accept one inbound connection
    #[arg(short, long, value_name = "PORT")]
    pub listen: Option<String>,

    /// Connect to a remote ADDRESS and PORT
    #[arg(short, long, num_args = 2, value_names = ["ADDRESS", "PORT"])]
    pub connect: Option<Vec<String>>,
}

/// Resolved transport mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Accept one inbound connection on the given port.
    Listen { port: u16 },
    /// Establish one outbound connection.
    Connect { address: String, port: u16 },
}

impl Cli {
    /// Resolve the parsed flags into a transport mode.
    ///
    /// clap already enforces the required, mutually exclusive group; the
    /// match re-checks so a `Mode` can also be built from hand-constructed
    /// `Cli` values.
    pub fn mode(&self) -> Result<Mode, RelayError> {
        match (&self.listen, &self.connect) {
            (Some(port), None) => Ok(Mode::Listen {
                port: parse_port(port)?,
            }),
            (None, Some(connect)) => match connect.as_slice() {
                [address, port] => Ok(Mode::Connect {
                    address: address.clone(),
                    port: parse_port(port)?,
                }),
                _ => Err(RelayError::ModeSelection),
            },
            _ => Err(RelayError::ModeSelection),
        }
    }
}

fn parse_port(value: &str) -> Result<u16, RelayError> {
    value.parse().map_err(|source| RelayError::InvalidPort {
        value: value.to_string(),
        source,
    })
}
