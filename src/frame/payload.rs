//! Default pass-through payload stage.

use bytes::Bytes;

use super::FrameError;
use crate::core::PayloadDecoder;

/// Undecoded payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawPayload {
    bytes: Bytes,
}

impl RawPayload {
    /// Wrap payload bytes.
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Borrow the payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Take the payload bytes.
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

/// Payload decoder that keeps the bytes as they arrived.
///
/// Stands in until a decoder for the vendor's segment layout is plugged in.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawPayloadDecoder;

impl PayloadDecoder for RawPayloadDecoder {
    type Output = RawPayload;

    fn decode(&self, payload: Bytes) -> Result<RawPayload, FrameError> {
        Ok(RawPayload::new(payload))
    }
}
