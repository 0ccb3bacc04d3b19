//! Length-prefixed framing for TCP byte streams.
//!
//! A TCP read does not correspond to a frame, so each frame is preceded by
//! its length:
//!
//! ```text
//! +--------------------+---------------------------------+
//! | Length             | Frame (header + payload)        |
//! | 4 bytes (BE u32)   | `Length` bytes                  |
//! +--------------------+---------------------------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::error::TransportError;
use crate::core::LENGTH_PREFIX_SIZE;

/// Prefix a frame with its big-endian length.
///
/// Fails with [`TransportError::FrameTooLarge`] if the length does not fit
/// the 4-byte prefix.
pub fn encode_length_prefixed(frame: &[u8]) -> Result<Bytes, TransportError> {
    let len = length_prefix(frame.len())?;
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + frame.len());
    buf.put_u32(len);
    buf.put_slice(frame);
    Ok(buf.freeze())
}

fn length_prefix(len: usize) -> Result<u32, TransportError> {
    u32::try_from(len).map_err(|_| TransportError::FrameTooLarge {
        len,
        max: u32::MAX as usize,
    })
}

/// Reassembles length-prefixed frames from arbitrary read boundaries.
///
/// Bytes of a partial frame stay buffered across reads.
#[derive(Debug)]
pub struct LengthDelimited {
    buffer: BytesMut,
    max_frame_len: usize,
}

impl LengthDelimited {
    /// Create a reassembler accepting frames up to `max_frame_len` bytes.
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(LENGTH_PREFIX_SIZE + max_frame_len),
            max_frame_len,
        }
    }

    /// Largest accepted frame.
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Number of buffered bytes not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Buffer to read into. Has spare capacity whenever `next_frame` last
    /// returned `Ok(None)`.
    pub fn read_buffer(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Append received bytes.
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Take the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, TransportError> {
        if self.buffer.len() < LENGTH_PREFIX_SIZE {
            self.buffer.reserve(LENGTH_PREFIX_SIZE - self.buffer.len());
            return Ok(None);
        }

        let len = u32::from_be_bytes([
            self.buffer[0],
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
        ]) as usize;

        if len > self.max_frame_len {
            return Err(TransportError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }

        let total = LENGTH_PREFIX_SIZE + len;
        if self.buffer.len() < total {
            self.buffer.reserve(total - self.buffer.len());
            return Ok(None);
        }

        self.buffer.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(self.buffer.split_to(len).freeze()))
    }
}
