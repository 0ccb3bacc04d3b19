//! Session API.
//!
//! High-level entry point: connect, stream, observe, disconnect.

mod session;

pub use session::*;
