//! Wire and configuration constants.
//!
//! Defaults mirror the MVN network streamer's factory settings.

use std::time::Duration;

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// Size of the frame header (big-endian u32 sequence value).
pub const HEADER_SIZE: usize = 4;

/// Size of the length prefix that delimits frames on a TCP stream.
pub const LENGTH_PREFIX_SIZE: usize = 4;

// =============================================================================
// CONFIGURATION DEFAULTS
// =============================================================================

/// Default host the session binds to (UDP) or connects to (TCP).
pub const DEFAULT_HOST: &str = "localhost";

/// Default MVN network streamer port.
pub const DEFAULT_PORT: u16 = 9763;

/// Default receive buffer capacity in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Largest accepted receive buffer (maximum UDP datagram size).
pub const MAX_BUFFER_SIZE: usize = 65535;

/// Default per-read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Default time `stop` waits for the stream loop before giving up on it.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(2);
