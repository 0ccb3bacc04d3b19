//! Socket wrapper with timed reads.
//!
//! A [`Transport`] owns exactly one socket: a UDP socket bound to the
//! configured address (the suit's streamer sends datagrams to it), or a TCP
//! stream connected to it.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

use super::error::{TransportError, TransportResult};
use super::framing::LengthDelimited;
use crate::config::{Protocol, SessionConfig};
use crate::core::{DEFAULT_BUFFER_SIZE, DEFAULT_TIMEOUT, StreamError};

/// Outcome of a single timed read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Bytes of exactly one frame.
    Frame(Bytes),
    /// The read timed out with no data. Expected while the peer is idle.
    Empty,
}

#[derive(Debug)]
enum Socket {
    Udp(UdpSocket),
    Tcp {
        stream: TcpStream,
        framer: LengthDelimited,
    },
}

/// Exclusively owned socket performing timed reads.
#[derive(Debug)]
pub struct Transport {
    /// `None` once closed.
    socket: Option<Socket>,
    /// Datagram receive buffer.
    recv_buffer: Vec<u8>,
    /// Bound on each read.
    read_timeout: Duration,
    local_addr: SocketAddr,
    peer_addr: Option<SocketAddr>,
}

impl Transport {
    /// Open the transport described by `config`.
    ///
    /// UDP binds `host:port`; TCP connects to it, bounded by the configured
    /// timeout. Failures are reported as [`StreamError::Connection`].
    pub async fn open(config: &SessionConfig) -> Result<Self, StreamError> {
        let builder = TransportBuilder::new()
            .recv_buffer_size(config.buffer_size)
            .read_timeout(config.timeout);

        let endpoint = (config.host.as_str(), config.port);
        let opened = match config.protocol {
            Protocol::Udp => builder.bind_udp(endpoint).await,
            Protocol::Tcp => builder.connect_tcp(endpoint).await,
        };

        opened.map_err(|source| StreamError::Connection {
            endpoint: config.endpoint(),
            source,
        })
    }

    /// Perform one read bounded by the read timeout.
    ///
    /// Cancellation safe: dropping the returned future loses no data, and a
    /// partially received TCP frame stays buffered for the next call.
    pub async fn receive(&mut self) -> TransportResult<Received> {
        let read_timeout = self.read_timeout;
        let Self {
            socket,
            recv_buffer,
            ..
        } = self;

        match socket.as_mut().ok_or(TransportError::Closed)? {
            Socket::Udp(socket) => match timeout(read_timeout, socket.recv_from(recv_buffer)).await {
                Err(_elapsed) => Ok(Received::Empty),
                Ok(Ok((len, _from))) => Ok(Received::Frame(Bytes::copy_from_slice(
                    &recv_buffer[..len],
                ))),
                Ok(Err(e)) => Err(TransportError::Io(e)),
            },
            Socket::Tcp { stream, framer } => loop {
                if let Some(frame) = framer.next_frame()? {
                    return Ok(Received::Frame(frame));
                }
                match timeout(read_timeout, stream.read_buf(framer.read_buffer())).await {
                    Err(_elapsed) => return Ok(Received::Empty),
                    Ok(Ok(0)) => return Err(TransportError::ConnectionClosed),
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => return Err(TransportError::Io(e)),
                }
            },
        }
    }

    /// Release the socket. Idempotent.
    pub fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            tracing::debug!(local = %self.local_addr, "transport closed");
            drop(socket);
        }
    }

    /// Check if the socket is still held.
    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Protocol of the underlying socket, or `None` once closed.
    pub fn protocol(&self) -> Option<Protocol> {
        match self.socket.as_ref()? {
            Socket::Udp(_) => Some(Protocol::Udp),
            Socket::Tcp { .. } => Some(Protocol::Tcp),
        }
    }

    /// Local address of the socket.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Remote address (TCP only).
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Per-read timeout.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Builder for opening transports with custom options.
#[derive(Debug, Clone)]
pub struct TransportBuilder {
    recv_buffer_size: usize,
    read_timeout: Duration,
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self {
            recv_buffer_size: DEFAULT_BUFFER_SIZE,
            read_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the receive buffer size (largest accepted frame).
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size;
        self
    }

    /// Set the per-read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Bind a UDP socket and receive datagrams sent to it.
    pub async fn bind_udp(self, addr: impl tokio::net::ToSocketAddrs) -> io::Result<Transport> {
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        tracing::debug!(%local_addr, "udp transport bound");

        Ok(Transport {
            socket: Some(Socket::Udp(socket)),
            recv_buffer: vec![0u8; self.recv_buffer_size],
            read_timeout: self.read_timeout,
            local_addr,
            peer_addr: None,
        })
    }

    /// Connect a TCP stream. The attempt is bounded by the read timeout.
    pub async fn connect_tcp(self, addr: impl tokio::net::ToSocketAddrs) -> io::Result<Transport> {
        let stream = match timeout(self.read_timeout, TcpStream::connect(addr)).await {
            Ok(stream) => stream?,
            Err(_elapsed) => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {:?}", self.read_timeout),
                ));
            }
        };
        stream.set_nodelay(true)?;
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;
        tracing::debug!(%local_addr, %peer_addr, "tcp transport connected");

        Ok(Transport {
            socket: Some(Socket::Tcp {
                stream,
                framer: LengthDelimited::new(self.recv_buffer_size),
            }),
            recv_buffer: Vec::new(),
            read_timeout: self.read_timeout,
            local_addr,
            peer_addr: Some(peer_addr),
        })
    }
}
