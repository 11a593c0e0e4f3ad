use std::io;

use thiserror::Error;

/// Errors that may occur when reading a message or a method payload.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error(transparent)]
    IoError(#[from] io::Error),
    #[error("Message too large! Maximum is {max}, but got {got}")]
    TooManyBytes { max: usize, got: usize },
    #[error("Unexpected end of data: needed {needed} bytes, but only {available} remain")]
    Truncated { needed: usize, available: usize },
    #[error("{0}")]
    InvalidFormat(String),
    #[error("Message was not completed within {0:?}")]
    Deadline(std::time::Duration),
}

impl ReadError {
    /// Whether the peer simply went away rather than sending garbage.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ReadError::IoError(err) => matches!(
                err.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
