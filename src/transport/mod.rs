//! Transport layer.
//!
//! Owns the socket and turns timed reads into one of three outcomes:
//!
//! - **Frame**: the bytes of exactly one frame
//! - **Empty**: the read timed out; the peer is idle
//! - **Error**: a [`TransportError`], fatal to the stream reading it
//!
//! # Framing
//!
//! ```text
//! UDP:  [ datagram = frame ]                      one recv, one frame
//! TCP:  [ len:4 BE ][ frame ][ len:4 BE ][ frame ] length-prefixed stream
//! ```
//!
//! UDP datagrams are self-delimiting. A TCP stream has no message boundaries,
//! so frames are length-prefixed and reassembled by [`LengthDelimited`].

mod error;
mod framing;
mod socket;

pub use error::*;
pub use framing::{LengthDelimited, encode_length_prefixed};
pub use socket::*;
