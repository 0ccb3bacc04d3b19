//! Stream diagnostics counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the stream loop.
#[derive(Debug, Default)]
pub struct StreamStats {
    frames_decoded: AtomicU64,
    frames_dropped: AtomicU64,
    observer_failures: AtomicU64,
    idle_timeouts: AtomicU64,
}

/// Point-in-time copy of [`StreamStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Frames decoded and dispatched.
    pub frames_decoded: u64,
    /// Frames dropped as malformed.
    pub frames_dropped: u64,
    /// Observer invocations that returned an error or panicked.
    pub observer_failures: u64,
    /// Reads that timed out with no data.
    pub idle_timeouts: u64,
}

impl StreamStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_decoded(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_observer_failures(&self, count: u64) {
        if count > 0 {
            self.observer_failures.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_idle(&self) {
        self.idle_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            observer_failures: self.observer_failures.load(Ordering::Relaxed),
            idle_timeouts: self.idle_timeouts.load(Ordering::Relaxed),
        }
    }
}
