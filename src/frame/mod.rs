//! Frame model and decoding.
//!
//! Wire format of a single frame (one UDP datagram, or one length-delimited
//! record on TCP):
//!
//! ```text
//! +---------------------+----------------------------+
//! | Header              | Payload                    |
//! | 4 bytes (BE u32)    | 0 or more bytes, opaque    |
//! +---------------------+----------------------------+
//! ```
//!
//! The header is a sequence value; it is not validated for gaps or
//! duplicates. The payload is handed to a pluggable
//! [`PayloadDecoder`](crate::core::PayloadDecoder).

mod decoder;
mod payload;

use std::time::SystemTime;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::core::HEADER_SIZE;

pub use decoder::FrameDecoder;
pub use payload::{RawPayload, RawPayloadDecoder};

/// Per-frame decoding errors. Never fatal to a stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer shorter than the fixed header.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum frame size.
        expected: usize,
        /// Received size.
        actual: usize,
    },

    /// The payload decoder rejected the payload.
    #[error("invalid payload: {0}")]
    Payload(String),
}

/// One decoded unit of motion-capture data.
///
/// Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame<P = RawPayload> {
    /// Sequence/header value (big-endian on the wire).
    pub header: u32,
    /// When the frame was decoded.
    pub timestamp: SystemTime,
    /// Payload length in bytes, excluding the header.
    pub payload_len: usize,
    /// Payload as produced by the payload decoder.
    pub payload: P,
}

impl Frame {
    /// Encode a header and payload into wire bytes.
    pub fn encode(header: u32, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        buf.put_u32(header);
        buf.put_slice(payload);
        buf.freeze()
    }
}

impl<P> Frame<P> {
    /// Check if the frame carries no payload bytes.
    pub fn is_header_only(&self) -> bool {
        self.payload_len == 0
    }
}
