//! Core constants, error taxonomy, and extension traits.
//!
//! This module has no runtime dependencies and is always compiled. The
//! transport, stream, and client layers build on the types defined here.

mod constants;
mod error;
mod traits;

pub use constants::*;
pub use error::*;
pub use traits::*;
