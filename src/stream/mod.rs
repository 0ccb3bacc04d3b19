//! Stream loop: receive, decode, cache, dispatch.
//!
//! One loop runs per streaming session. Each iteration performs a single
//! timed read and then:
//!
//! | Read outcome | Action                                                |
//! |--------------|-------------------------------------------------------|
//! | frame bytes  | decode; on success run `on_frame` on the blocking pool |
//! | malformed    | drop the frame, count it, keep going                  |
//! | timeout      | keep going                                            |
//! | error        | go Idle, report once via `on_fatal`, exit             |
//!
//! Stop requests are cooperative: the loop checks its state once per
//! iteration and a pending read is interrupted as soon as the request lands.
//! A loop still dispatching when the grace period runs out is abandoned; its
//! [`RunToken`] goes stale so the dispatch skips the observers it has not
//! reached yet.

mod observers;
mod state;
mod stats;
mod worker;

pub use observers::{ObserverId, ObserverRegistry};
pub(crate) use state::LoopStateCell;
pub use state::{LoopState, RunToken, StopOutcome};
pub use stats::{StatsSnapshot, StreamStats};
pub use worker::StreamLoop;
