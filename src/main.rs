use std::os::unix::io::AsRawFd;

use clap::Parser;

use tcpcat::cli::{Cli, Mode};
use tcpcat::error::RelayError;
use tcpcat::relay::{set_nonblocking, EndpointId, Endpoints, Outcome, Relay};
use tcpcat::{logging, net};

fn main() {
    logging::init();
    let cli = Cli::parse();

    match run(&cli) {
        // Graceful end-of-stream from either side: silent, status 0.
        Ok(Outcome::StreamClosed) => {}
        Err(err) => {
            tracing::error!(error = %err, "fatal");
            eprintln!("Error: {err}");
            std::process::exit(err.exit_code());
        }
    }
}

fn run(cli: &Cli) -> Result<Outcome, RelayError> {
    let stream = match cli.mode()? {
        Mode::Listen { port } => net::listen_accept(port)?,
        Mode::Connect { address, port } => net::connect(&address, port)?,
    };

    // The socket goes non-blocking once, right after establishment; the
    // terminal descriptors are re-asserted inside the loop.
    set_nonblocking(stream.as_raw_fd()).map_err(|source| RelayError::Nonblocking {
        endpoint: EndpointId::PeerSocket,
        source,
    })?;

    let endpoints = Endpoints::stdio(&stream);
    Relay::new(endpoints).run()
}
