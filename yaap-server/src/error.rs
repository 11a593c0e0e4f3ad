use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Cannot bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("Cannot configure listening socket: {0}")]
    Socket(#[from] nix::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}
