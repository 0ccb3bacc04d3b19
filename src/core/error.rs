//! Error types for the streaming client.

use std::io;

use thiserror::Error;

use crate::frame::FrameError;
#[cfg(feature = "transport")]
use crate::transport::TransportError;

/// Coarse classification of a [`StreamError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Socket bind or connect failed.
    Connection,
    /// Read failed while streaming.
    IoFailure,
    /// A single frame was malformed.
    Framing,
    /// Operation not allowed in the current lifecycle state.
    InvalidState,
    /// Configuration rejected before use.
    Config,
}

/// Top-level errors.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Socket bind (UDP) or connect (TCP) failed. Never retried automatically.
    #[error("failed to connect to {endpoint}: {source}")]
    Connection {
        /// `host:port` the session tried to reach.
        endpoint: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Read error during streaming. Ends the current stream loop.
    #[cfg(feature = "transport")]
    #[error("stream i/o failure: {0}")]
    IoFailure(#[from] TransportError),

    /// Malformed frame. Dropped locally, never ends a stream.
    #[error("framing error: {0}")]
    Framing(#[from] FrameError),

    /// Illegal operation for the current state. No side effects were performed.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl StreamError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StreamError::Connection { .. } => ErrorKind::Connection,
            #[cfg(feature = "transport")]
            StreamError::IoFailure(_) => ErrorKind::IoFailure,
            StreamError::Framing(_) => ErrorKind::Framing,
            StreamError::InvalidState(_) => ErrorKind::InvalidState,
            StreamError::Config(_) => ErrorKind::Config,
        }
    }

    /// Check if this error ends the stream it occurred on.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::IoFailure)
    }
}

/// Result type for streaming operations.
pub type StreamResult<T> = Result<T, StreamError>;
