//! # mvn-stream
//!
//! Streaming network client for motion-capture suits.
//!
//! A capture server pushes a continuous stream of binary frames over UDP or
//! TCP. This crate receives them, splits each frame into its header and
//! payload, and hands decoded frames to registered observers. It provides:
//!
//! - **Transport**: UDP datagrams or length-prefixed TCP with bounded reads
//! - **Decoding**: 4-byte big-endian header plus a pluggable payload decoder
//! - **Streaming**: a background loop that survives idle peers and malformed frames
//! - **Sessions**: connect/stream/stop/disconnect lifecycle with observers
//!
//! ## Feature Flags
//!
//! - `transport` (default): sockets, TCP framing and the stream loop
//! - `client` (default): the [`Session`] API
//! - `cli`: the `mvn-tail` command-line tool
//!
//! ## Modules
//!
//! - [`core`]: Error types, observer traits and constants (always included)
//! - [`frame`]: Frame type and decoder (always included)
//! - [`config`]: Session configuration (always included)
//! - [`transport`]: Socket transport (requires `transport` feature)
//! - [`stream`]: Stream loop, observers and counters (requires `transport` feature)
//! - [`client`]: Session API (requires `client` feature)
//!
//! ## Example Usage
//!
//! ```rust
//! use mvn_stream::prelude::*;
//!
//! let decoder = FrameDecoder::default();
//! let raw = Frame::encode(0x4D58_5450, b"\x01\x02\x03");
//!
//! let frame = decoder.decode_now(raw).unwrap();
//! assert_eq!(frame.header, 0x4D58_5450);
//! assert_eq!(frame.payload_len, 3);
//! assert_eq!(frame.payload.as_bytes(), b"\x01\x02\x03");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Always included
pub mod config;
pub mod core;
pub mod frame;

// Transport layer (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod stream;

// Session API (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{ConfigSummary, Protocol, SessionConfig, SessionConfigBuilder};
    pub use crate::core::*;
    pub use crate::frame::{Frame, FrameDecoder, FrameError, RawPayload, RawPayloadDecoder};

    #[cfg(feature = "transport")]
    pub use crate::transport::{
        Received, Transport, TransportBuilder, TransportError, TransportResult,
    };

    #[cfg(feature = "transport")]
    pub use crate::stream::{
        LoopState, ObserverId, RunToken, StatsSnapshot, StopOutcome, StreamLoop, StreamStats,
    };

    #[cfg(feature = "client")]
    pub use crate::client::{Session, SessionStatus, StatusHandle};
}

// Re-export commonly used items at crate root
pub use crate::config::{Protocol, SessionConfig};
pub use crate::core::{ErrorKind, StreamError, StreamResult};
pub use crate::frame::{Frame, FrameDecoder, FrameError};

#[cfg(feature = "transport")]
pub use crate::transport::{Transport, TransportError};

#[cfg(feature = "client")]
pub use crate::client::Session;
