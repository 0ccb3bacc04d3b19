//! Stream loop state machine.
//!
//! ```text
//!  Idle --start--> Running --stop--> Stopping --loop exits--> Idle
//!                     |
//!                     +--fatal i/o error----------------------> Idle
//! ```

use std::sync::{Arc, Mutex, PoisonError};

/// Lifecycle state of a stream loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoopState {
    /// No loop is running.
    #[default]
    Idle,
    /// The loop is receiving and dispatching frames.
    Running,
    /// A stop was requested; the loop exits at its next check.
    Stopping,
}

/// How a stop request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopOutcome {
    /// No loop was running (never started, or already ended on an error).
    NotRunning,
    /// The loop observed the request and exited within the grace period.
    Graceful,
    /// The loop did not exit within the grace period and was abandoned.
    Forced,
}

#[derive(Debug, Default)]
struct Inner {
    state: LoopState,
    /// Incremented per run so an abandoned run cannot touch a newer one.
    generation: u64,
}

/// Shared loop state, written by the loop and its controller.
#[derive(Debug, Default)]
pub(crate) struct LoopStateCell {
    inner: Mutex<Inner>,
}

impl LoopStateCell {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn get(&self) -> LoopState {
        self.lock().state
    }

    /// Idle -> Running. Returns the new run's generation.
    pub(crate) fn begin(&self) -> Option<u64> {
        let mut inner = self.lock();
        if inner.state != LoopState::Idle {
            return None;
        }
        inner.state = LoopState::Running;
        inner.generation += 1;
        Some(inner.generation)
    }

    /// Running -> Stopping.
    pub(crate) fn request_stop(&self) -> bool {
        let mut inner = self.lock();
        if inner.state == LoopState::Running {
            inner.state = LoopState::Stopping;
            true
        } else {
            false
        }
    }

    /// Check if run `generation` should keep going.
    pub(crate) fn is_running(&self, generation: u64) -> bool {
        let inner = self.lock();
        inner.generation == generation && inner.state == LoopState::Running
    }

    /// Check if run `generation` has not been abandoned.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    /// Back to Idle, if run `generation` is still the current one.
    pub(crate) fn finish(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation {
            inner.state = LoopState::Idle;
        }
    }

    /// Back to Idle, orphaning whatever run is current.
    pub(crate) fn abandon(&self) {
        let mut inner = self.lock();
        inner.state = LoopState::Idle;
        inner.generation += 1;
    }
}

/// Identifies one run of a stream loop.
///
/// Passed along with every frame so a dispatch in progress can tell that its
/// run was abandoned by a forced stop and skip the remaining observers.
#[derive(Debug, Clone)]
pub struct RunToken {
    state: Arc<LoopStateCell>,
    generation: u64,
}

impl RunToken {
    pub(crate) fn new(state: Arc<LoopStateCell>, generation: u64) -> Self {
        Self { state, generation }
    }

    /// Check if the run is still the loop's current one.
    ///
    /// Stays `true` through a graceful stop; turns `false` once the run is
    /// abandoned.
    pub fn is_current(&self) -> bool {
        self.state.is_current(self.generation)
    }
}
