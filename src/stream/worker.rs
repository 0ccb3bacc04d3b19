//! The background receive loop.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::state::{LoopState, LoopStateCell, RunToken, StopOutcome};
use super::stats::StreamStats;
use crate::core::{DEFAULT_STOP_GRACE, PayloadDecoder, StreamError};
use crate::frame::{Frame, FrameDecoder};
use crate::transport::{Received, Transport};

/// A cancellable background task pulling frames from a [`Transport`].
///
/// The loop owns the transport while it runs and hands it back when it
/// exits, so socket reads never race with the controller. Frame callbacks
/// run on tokio's blocking pool: a slow observer delays the next read but
/// never the runtime, so [`stop`](Self::stop) stays bounded by its grace
/// period.
///
/// # Example
///
/// ```ignore
/// let mut stream = StreamLoop::new(Arc::new(FrameDecoder::default()));
/// stream.start(
///     transport,
///     |frame, _run| println!("frame {}", frame.header),
///     |err| eprintln!("stream failed: {err}"),
/// )?;
///
/// let (outcome, transport) = stream.stop().await;
/// ```
pub struct StreamLoop<D: PayloadDecoder> {
    decoder: Arc<FrameDecoder<D>>,
    state: Arc<LoopStateCell>,
    stats: Arc<StreamStats>,
    grace: Duration,
    /// Shutdown signal for the current run.
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Task of the current run; yields the transport back on exit.
    handle: Option<JoinHandle<Transport>>,
}

impl<D: PayloadDecoder> std::fmt::Debug for StreamLoop<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamLoop")
            .field("state", &self.state())
            .field("grace", &self.grace)
            .field("has_task", &self.handle.is_some())
            .finish()
    }
}

impl<D: PayloadDecoder> StreamLoop<D> {
    /// Create an idle loop.
    pub fn new(decoder: Arc<FrameDecoder<D>>) -> Self {
        Self {
            decoder,
            state: Arc::new(LoopStateCell::new()),
            stats: Arc::new(StreamStats::new()),
            grace: DEFAULT_STOP_GRACE,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Set how long [`stop`](Self::stop) waits for the loop to exit.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Record counters into `stats` instead of a private instance.
    pub fn with_stats(mut self, stats: Arc<StreamStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Current state.
    pub fn state(&self) -> LoopState {
        self.state.get()
    }

    /// Check if the loop is running.
    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }

    /// Counters of this loop.
    pub fn stats(&self) -> &Arc<StreamStats> {
        &self.stats
    }

    pub(crate) fn state_cell(&self) -> Arc<LoopStateCell> {
        Arc::clone(&self.state)
    }

    /// Start receiving on `transport`.
    ///
    /// `on_frame` is called for every decoded frame, in decode order, one
    /// frame at a time. Its [`RunToken`] turns stale if the run is abandoned
    /// mid-dispatch.
    /// `on_fatal` is called at most once, when a read fails; the loop is Idle
    /// by then and does not reconnect.
    ///
    /// Fails with [`StreamError::InvalidState`] unless the loop is Idle, in
    /// which case the transport is handed back untouched. Must be called
    /// within a tokio runtime.
    #[allow(clippy::result_large_err)]
    pub fn start<F, E>(
        &mut self,
        transport: Transport,
        on_frame: F,
        on_fatal: E,
    ) -> Result<(), (StreamError, Transport)>
    where
        F: Fn(Frame<D::Output>, &RunToken) + Send + Sync + 'static,
        E: FnOnce(StreamError) + Send + 'static,
    {
        if self.handle.is_some() {
            return Err((
                StreamError::InvalidState("stream loop has not been stopped"),
                transport,
            ));
        }
        let Some(generation) = self.state.begin() else {
            return Err((StreamError::InvalidState("stream loop already running"), transport));
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let run = Run {
            generation,
            decoder: Arc::clone(&self.decoder),
            state: Arc::clone(&self.state),
            stats: Arc::clone(&self.stats),
        };

        tracing::debug!(generation, "stream loop starting");
        self.handle = Some(tokio::spawn(run.run(
            transport,
            on_frame,
            on_fatal,
            shutdown_rx,
        )));
        self.shutdown_tx = Some(shutdown_tx);
        Ok(())
    }

    /// Stop the loop and take the transport back.
    ///
    /// Waits up to the grace period. If the loop does not exit in time it is
    /// aborted, the outcome is [`StopOutcome::Forced`] and the transport is
    /// lost with it. Safe to call when nothing is running.
    pub async fn stop(&mut self) -> (StopOutcome, Option<Transport>) {
        let Some(mut handle) = self.handle.take() else {
            return (StopOutcome::NotRunning, None);
        };

        let was_running = self.state.request_stop();
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        match timeout(self.grace, &mut handle).await {
            Ok(Ok(transport)) => {
                let outcome = if was_running {
                    StopOutcome::Graceful
                } else {
                    StopOutcome::NotRunning
                };
                tracing::debug!(?outcome, "stream loop joined");
                (outcome, Some(transport))
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "stream loop task failed");
                self.state.abandon();
                (StopOutcome::Forced, None)
            }
            Err(_elapsed) => {
                tracing::warn!(grace = ?self.grace, "stream loop did not stop in time, aborting");
                handle.abort();
                self.state.abandon();
                (StopOutcome::Forced, None)
            }
        }
    }
}

impl<D: PayloadDecoder> Drop for StreamLoop<D> {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            // The task is parked on a read or a dispatch; cancelling it drops
            // the transport. A callback already running finishes on its own
            // thread, but the abandoned token stops it at the next observer.
            handle.abort();
            self.state.abandon();
        }
    }
}

/// Everything one run of the loop needs, moved into its task.
struct Run<D: PayloadDecoder> {
    generation: u64,
    decoder: Arc<FrameDecoder<D>>,
    state: Arc<LoopStateCell>,
    stats: Arc<StreamStats>,
}

impl<D: PayloadDecoder> Run<D> {
    async fn run<F, E>(
        self,
        mut transport: Transport,
        on_frame: F,
        on_fatal: E,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> Transport
    where
        F: Fn(Frame<D::Output>, &RunToken) + Send + Sync + 'static,
        E: FnOnce(StreamError) + Send + 'static,
    {
        let on_frame = Arc::new(on_frame);
        let token = RunToken::new(Arc::clone(&self.state), self.generation);

        while self.state.is_running(self.generation) {
            let received = tokio::select! {
                biased;
                // Fires on a stop request or when the controller goes away.
                _ = &mut shutdown_rx => break,
                received = transport.receive() => received,
            };

            let raw = match received {
                Ok(Received::Frame(raw)) => raw,
                Ok(Received::Empty) => {
                    self.stats.record_idle();
                    tracing::trace!("read timed out, peer idle");
                    continue;
                }
                Err(e) => {
                    self.state.finish(self.generation);
                    tracing::error!(error = %e, "stream read failed, stopping");
                    on_fatal(StreamError::IoFailure(e));
                    return transport;
                }
            };

            match self.decoder.decode(raw, SystemTime::now()) {
                Ok(frame) => {
                    // A stop may have been requested during the read.
                    if !self.state.is_running(self.generation) {
                        break;
                    }
                    self.stats.record_decoded();

                    let on_frame = Arc::clone(&on_frame);
                    let token = token.clone();
                    let dispatch =
                        tokio::task::spawn_blocking(move || on_frame(frame, &token));
                    if let Err(e) = dispatch.await {
                        tracing::error!(error = %e, "frame dispatch failed");
                    }
                }
                Err(e) => {
                    self.stats.record_dropped();
                    tracing::debug!(error = %e, "dropping malformed frame");
                }
            }
        }

        self.state.finish(self.generation);
        tracing::debug!(generation = self.generation, "stream loop stopped");
        transport
    }
}
