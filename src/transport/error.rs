//! Transport layer error types.
//!
//! An idle read timeout is not an error; it is reported as
//! [`Received::Empty`](super::Received::Empty). Every variant here ends the
//! stream loop that observed it.

use std::io;

use thiserror::Error;

/// Transport layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error (socket operations).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The TCP peer closed the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// A TCP length prefix exceeds the receive buffer capacity.
    /// The byte stream can no longer be delimited.
    #[error("frame of {len} bytes exceeds buffer capacity of {max} bytes")]
    FrameTooLarge {
        /// Announced frame length.
        len: usize,
        /// Configured capacity.
        max: usize,
    },

    /// The transport has been closed.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Check if the remote end went away (as opposed to a local failure).
    pub fn is_peer_gone(&self) -> bool {
        match self {
            TransportError::ConnectionClosed => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
