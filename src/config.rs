//! Session configuration.
//!
//! A [`SessionConfig`] is built once, validated, and handed to a session. It
//! is never mutated while the session is connected.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::core::{
    DEFAULT_BUFFER_SIZE, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_STOP_GRACE, DEFAULT_TIMEOUT,
    HEADER_SIZE, MAX_BUFFER_SIZE, StreamError,
};

/// Transport protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    /// Bind locally and receive datagrams sent to `host:port`.
    #[default]
    Udp,
    /// Connect to `host:port` and read length-prefixed frames.
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Udp => f.write_str("UDP"),
            Protocol::Tcp => f.write_str("TCP"),
        }
    }
}

impl FromStr for Protocol {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("udp") {
            Ok(Protocol::Udp)
        } else if s.eq_ignore_ascii_case("tcp") {
            Ok(Protocol::Tcp)
        } else {
            Err(StreamError::Config(format!("unknown protocol: {s}")))
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Host to bind (UDP) or connect to (TCP).
    pub host: String,

    /// Port to bind or connect to.
    pub port: u16,

    /// Transport protocol.
    pub protocol: Protocol,

    /// Receive buffer capacity; also the largest accepted frame.
    pub buffer_size: usize,

    /// Per-read timeout. Bounds how long a stop request can go unnoticed.
    pub timeout: Duration,

    /// How long `stop_streaming` waits for the stream loop to exit.
    pub stop_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            protocol: Protocol::Udp,
            buffer_size: DEFAULT_BUFFER_SIZE,
            timeout: DEFAULT_TIMEOUT,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}

impl SessionConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    /// `host:port` as used in log lines and error messages.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Read-only summary for status displays.
    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            host: self.host.clone(),
            port: self.port,
            protocol: self.protocol,
        }
    }

    /// Check the configuration invariants.
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.host.trim().is_empty() {
            return Err(StreamError::Config("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(StreamError::Config("port must be positive".into()));
        }
        if self.timeout.is_zero() {
            return Err(StreamError::Config("timeout must be positive".into()));
        }
        if self.stop_grace.is_zero() {
            return Err(StreamError::Config("stop grace must be positive".into()));
        }
        if self.buffer_size < HEADER_SIZE || self.buffer_size > MAX_BUFFER_SIZE {
            return Err(StreamError::Config(format!(
                "buffer size must be between {HEADER_SIZE} and {MAX_BUFFER_SIZE} bytes, got {}",
                self.buffer_size
            )));
        }
        Ok(())
    }
}

/// Host, port and protocol of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSummary {
    /// Host.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Protocol.
    pub protocol: Protocol,
}

impl fmt::Display for ConfigSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}", self.protocol, self.host, self.port)
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Create a builder holding the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the protocol.
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.config.protocol = protocol;
        self
    }

    /// Set the receive buffer capacity.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    /// Set the per-read timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the per-read timeout in (fractional) seconds.
    ///
    /// Negative or non-finite values are rejected by [`build`](Self::build).
    pub fn timeout_secs(mut self, secs: f64) -> Self {
        self.config.timeout = Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO);
        self
    }

    /// Set the stop grace period.
    pub fn stop_grace(mut self, grace: Duration) -> Self {
        self.config.stop_grace = grace;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<SessionConfig, StreamError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
