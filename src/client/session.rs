//! Streaming session.
//!
//! A [`Session`] coordinates one logical connection: it owns the
//! configuration, the transport while connected, and the stream loop while
//! streaming. Frame and connection observers are registered on it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{ConfigSummary, SessionConfig};
use crate::core::{
    ConnectionObserver, FrameObserver, PayloadDecoder, StreamError, StreamResult,
};
use crate::frame::{Frame, FrameDecoder, RawPayloadDecoder};
use crate::stream::{
    LoopState, LoopStateCell, ObserverId, ObserverRegistry, RunToken, StatsSnapshot,
    StopOutcome, StreamLoop, StreamStats,
};
use crate::transport::Transport;

/// Message sent to the connection observer on a successful connect.
pub const MSG_CONNECTED: &str = "connected";

/// Message sent to the connection observer on disconnect.
pub const MSG_DISCONNECTED: &str = "disconnected";

/// Read-only snapshot of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    /// A transport is open.
    pub connected: bool,
    /// The stream loop is running.
    pub streaming: bool,
    /// Where the session points.
    pub config: ConfigSummary,
}

/// State touched by both the caller and the stream loop.
struct Shared<P> {
    connected: AtomicBool,
    latest: RwLock<Option<Arc<Frame<P>>>>,
    observers: ObserverRegistry<P>,
    stats: Arc<StreamStats>,
    loop_state: Arc<LoopStateCell>,
    summary: ConfigSummary,
}

impl<P> Shared<P> {
    fn status(&self) -> SessionStatus {
        SessionStatus {
            connected: self.connected.load(Ordering::Acquire),
            streaming: self.loop_state.get() == LoopState::Running,
            config: self.summary.clone(),
        }
    }

    fn latest_frame(&self) -> Option<Arc<Frame<P>>> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cache `frame` as the latest, then dispatch it while `run` is current.
    fn publish(&self, frame: Frame<P>, run: &RunToken) {
        let frame = Arc::new(frame);
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&frame));
        let failures = self
            .observers
            .dispatch_frame_while(&frame, || run.is_current());
        self.stats.record_observer_failures(failures);
    }
}

/// Cloneable, thread-safe view of a session's status.
///
/// Lets a renderer or UI thread poll the session without holding it.
pub struct StatusHandle<P> {
    shared: Arc<Shared<P>>,
}

impl<P> Clone for StatusHandle<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P> std::fmt::Debug for StatusHandle<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusHandle")
            .field("status", &self.shared.status())
            .finish()
    }
}

impl<P> StatusHandle<P> {
    /// Current status.
    pub fn status(&self) -> SessionStatus {
        self.shared.status()
    }

    /// Most recently decoded frame.
    pub fn latest_frame(&self) -> Option<Arc<Frame<P>>> {
        self.shared.latest_frame()
    }

    /// Stream counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

/// A streaming session.
///
/// Lifecycle: created disconnected; [`connect`](Self::connect) opens the
/// transport, [`start_streaming`](Self::start_streaming) hands it to the
/// stream loop, [`stop_streaming`](Self::stop_streaming) takes it back and
/// [`disconnect`](Self::disconnect) closes it.
///
/// Frame observers run on tokio's blocking pool, never on the runtime's
/// worker threads, and may block. A stop that outlasts
/// [`stop_grace`](SessionConfig::stop_grace) abandons the loop: an observer
/// already running finishes, later observers for that frame are skipped.
///
/// Dropping a session abandons the loop the same way without waiting. The
/// socket is released when the runtime cancels the loop task, which does not
/// wait for a running observer. Call [`disconnect`](Self::disconnect) first
/// to get a bounded, reported shutdown.
///
/// # Example
///
/// ```no_run
/// use mvn_stream::prelude::*;
///
/// # async fn run() -> Result<(), StreamError> {
/// let config = SessionConfig::builder().host("0.0.0.0").port(9763).build()?;
/// let mut session = Session::new(config);
///
/// session.set_connection_observer(|connected: bool, message: &str| {
///     println!("connected={connected}: {message}");
/// });
/// session.register_frame_observer(|frame: &Frame| {
///     println!("frame {} ({} bytes)", frame.header, frame.payload_len);
/// });
///
/// session.connect().await?;
/// session.start_streaming().await;
/// // ...
/// session.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct Session<D: PayloadDecoder = RawPayloadDecoder> {
    config: SessionConfig,
    shared: Arc<Shared<D::Output>>,
    /// Held while connected and not streaming.
    transport: Option<Transport>,
    stream: StreamLoop<D>,
    local_addr: Option<SocketAddr>,
}

impl<D: PayloadDecoder> std::fmt::Debug for Session<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("status", &self.shared.status())
            .field("local_addr", &self.local_addr)
            .field("observers", &self.shared.observers)
            .finish()
    }
}

impl Session {
    /// Create a disconnected session with the pass-through payload decoder.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_decoder(config, RawPayloadDecoder)
    }
}

impl<D: PayloadDecoder> Session<D> {
    /// Create a disconnected session with a custom payload decoder.
    pub fn with_decoder(config: SessionConfig, decoder: D) -> Self {
        let stats = Arc::new(StreamStats::new());
        let stream = StreamLoop::new(Arc::new(FrameDecoder::new(decoder)))
            .with_grace(config.stop_grace)
            .with_stats(Arc::clone(&stats));

        let shared = Arc::new(Shared {
            connected: AtomicBool::new(false),
            latest: RwLock::new(None),
            observers: ObserverRegistry::new(),
            stats,
            loop_state: stream.state_cell(),
            summary: config.summary(),
        });

        Self {
            config,
            shared,
            transport: None,
            stream,
            local_addr: None,
        }
    }

    /// Open the transport.
    ///
    /// Fails with [`StreamError::InvalidState`] if already connected; nothing
    /// is touched and no observer is called in that case. Otherwise the
    /// connection observer is told the outcome either way.
    pub async fn connect(&mut self) -> StreamResult<()> {
        if self.is_connected() {
            return Err(StreamError::InvalidState("already connected"));
        }

        match Transport::open(&self.config).await {
            Ok(transport) => {
                self.local_addr = Some(transport.local_addr());
                self.transport = Some(transport);
                self.shared.connected.store(true, Ordering::Release);
                tracing::info!(
                    endpoint = %self.config.endpoint(),
                    protocol = %self.config.protocol,
                    "session connected"
                );
                self.shared.observers.notify_connection(true, MSG_CONNECTED);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "session connect failed");
                self.shared.observers.notify_connection(false, &e.to_string());
                Err(e)
            }
        }
    }

    /// Stop streaming, close the transport and report the disconnect.
    ///
    /// A no-op success when already disconnected.
    pub async fn disconnect(&mut self) -> StreamResult<()> {
        self.stop_streaming().await;

        if !self.is_connected() && self.transport.is_none() {
            return Ok(());
        }

        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.local_addr = None;
        self.shared.connected.store(false, Ordering::Release);
        tracing::info!(endpoint = %self.config.endpoint(), "session disconnected");
        self.shared.observers.notify_connection(false, MSG_DISCONNECTED);
        Ok(())
    }

    /// Start the stream loop.
    ///
    /// Returns `false` without side effects when not connected or already
    /// streaming.
    pub async fn start_streaming(&mut self) -> bool {
        if !self.is_connected() {
            return false;
        }
        if self.stream.state() != LoopState::Idle {
            tracing::debug!("start_streaming ignored, stream loop is active");
            return false;
        }

        // A loop that ended on a read error still holds the transport.
        if let (_, Some(transport)) = self.stream.stop().await {
            self.transport = Some(transport);
        }
        let Some(transport) = self.transport.take() else {
            return false;
        };

        let on_frame = {
            let shared = Arc::clone(&self.shared);
            move |frame: Frame<D::Output>, run: &RunToken| shared.publish(frame, run)
        };
        let on_fatal = {
            let shared = Arc::clone(&self.shared);
            move |err: StreamError| {
                shared
                    .observers
                    .notify_connection(false, &format!("stream failed: {err}"));
            }
        };

        match self.stream.start(transport, on_frame, on_fatal) {
            Ok(()) => {
                tracing::info!(endpoint = %self.config.endpoint(), "streaming started");
                true
            }
            Err((e, transport)) => {
                tracing::warn!(error = %e, "failed to start streaming");
                self.transport = Some(transport);
                false
            }
        }
    }

    /// Stop the stream loop, waiting at most the configured grace period.
    ///
    /// Safe to call when not streaming. On [`StopOutcome::Forced`] the
    /// transport is lost with the abandoned loop, so the session becomes
    /// disconnected.
    pub async fn stop_streaming(&mut self) -> StopOutcome {
        let (outcome, transport) = self.stream.stop().await;
        if let Some(transport) = transport {
            self.transport = Some(transport);
        }

        match outcome {
            StopOutcome::Graceful => {
                tracing::info!(endpoint = %self.config.endpoint(), "streaming stopped");
            }
            StopOutcome::Forced => {
                self.local_addr = None;
                if self.shared.connected.swap(false, Ordering::AcqRel) {
                    self.shared.observers.notify_connection(
                        false,
                        "stream loop did not stop in time, connection dropped",
                    );
                }
            }
            StopOutcome::NotRunning => {}
        }
        outcome
    }

    /// Register a frame observer. Observers run in registration order.
    pub fn register_frame_observer(
        &self,
        observer: impl FrameObserver<D::Output> + 'static,
    ) -> ObserverId {
        self.shared.observers.register_frame(observer)
    }

    /// Remove a frame observer. Returns `false` if `id` is unknown.
    pub fn remove_frame_observer(&self, id: ObserverId) -> bool {
        self.shared.observers.remove_frame(id)
    }

    /// Set the connection observer, replacing any previous one.
    pub fn set_connection_observer(&self, observer: impl ConnectionObserver + 'static) {
        self.shared.observers.set_connection(observer);
    }

    /// Most recently decoded frame.
    pub fn latest_frame(&self) -> Option<Arc<Frame<D::Output>>> {
        self.shared.latest_frame()
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        self.shared.status()
    }

    /// Handle for reading status from other threads.
    pub fn status_handle(&self) -> StatusHandle<D::Output> {
        StatusHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Stream counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Check if the stream loop is running.
    pub fn is_streaming(&self) -> bool {
        self.stream.is_running()
    }

    /// Local address of the open transport.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
