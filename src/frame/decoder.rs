//! Frame decoder: splits a raw buffer into header and payload.

use std::time::SystemTime;

use bytes::{Buf, Bytes};

use super::{Frame, FrameError, RawPayloadDecoder};
use crate::core::{HEADER_SIZE, PayloadDecoder};

/// Decodes raw reads into [`Frame`]s.
///
/// Framing is fixed; payload interpretation is delegated to `D`.
#[derive(Debug, Clone)]
pub struct FrameDecoder<D = RawPayloadDecoder> {
    payload: D,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(RawPayloadDecoder)
    }
}

impl<D: PayloadDecoder> FrameDecoder<D> {
    /// Create a decoder with the given payload stage.
    pub fn new(payload: D) -> Self {
        Self { payload }
    }

    /// Get the payload stage.
    pub fn payload_decoder(&self) -> &D {
        &self.payload
    }

    /// Decode one frame.
    ///
    /// `arrival` becomes the frame's timestamp; no timestamp is read from the
    /// wire. A header-only buffer is a valid frame with an empty payload.
    pub fn decode(
        &self,
        raw: Bytes,
        arrival: SystemTime,
    ) -> Result<Frame<D::Output>, FrameError> {
        if raw.len() < HEADER_SIZE {
            return Err(FrameError::TooShort {
                expected: HEADER_SIZE,
                actual: raw.len(),
            });
        }

        let mut raw = raw;
        let header = raw.get_u32();
        let payload_len = raw.len();
        let payload = self.payload.decode(raw)?;

        Ok(Frame {
            header,
            timestamp: arrival,
            payload_len,
            payload,
        })
    }

    /// Decode one frame stamped with the current time.
    pub fn decode_now(&self, raw: Bytes) -> Result<Frame<D::Output>, FrameError> {
        self.decode(raw, SystemTime::now())
    }
}
