//! Extension points of the streaming client.
//!
//! Payload interpretation and frame/connection consumers are plugged in
//! through these traits so that framing and stream management never depend on
//! what a payload means or who is listening.

use bytes::Bytes;

use crate::frame::{Frame, FrameError};

/// Error returned by an observer that failed to handle an event.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Strategy for interpreting the bytes that follow the frame header.
///
/// The frame decoder handles framing (header extraction, length checks) and
/// hands the remainder to a `PayloadDecoder`. The vendor's segment/pose
/// layout can be added as a new implementation without touching framing.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use mvn_stream::core::PayloadDecoder;
/// use mvn_stream::frame::FrameError;
///
/// /// Reads the segment count from the first payload byte.
/// struct SegmentCount;
///
/// impl PayloadDecoder for SegmentCount {
///     type Output = u8;
///
///     fn decode(&self, payload: Bytes) -> Result<u8, FrameError> {
///         payload
///             .first()
///             .copied()
///             .ok_or_else(|| FrameError::Payload("missing segment count".into()))
///     }
/// }
/// ```
pub trait PayloadDecoder: Send + Sync + 'static {
    /// Decoded payload representation carried by each [`Frame`].
    type Output: Send + Sync + 'static;

    /// Interpret a payload.
    ///
    /// Returning an error drops the frame; the stream continues.
    fn decode(&self, payload: Bytes) -> Result<Self::Output, FrameError>;
}

/// Consumer of decoded frames.
///
/// Invoked synchronously on the stream loop, once per frame, in registration
/// order. Failures (returned errors and panics) are contained to the
/// observer that raised them.
///
/// Any `Fn(&Frame<P>)` closure is a frame observer.
pub trait FrameObserver<P>: Send + Sync {
    /// Handle a newly decoded frame.
    fn on_frame(&self, frame: &Frame<P>) -> Result<(), ObserverError>;
}

impl<P, F> FrameObserver<P> for F
where
    F: Fn(&Frame<P>) + Send + Sync,
{
    fn on_frame(&self, frame: &Frame<P>) -> Result<(), ObserverError> {
        self(frame);
        Ok(())
    }
}

/// Consumer of connection-state transitions.
///
/// Any `Fn(bool, &str)` closure is a connection observer.
pub trait ConnectionObserver: Send + Sync {
    /// Called with the new connection state and a human-readable reason.
    fn on_connection_change(&self, connected: bool, message: &str);
}

impl<F> ConnectionObserver for F
where
    F: Fn(bool, &str) + Send + Sync,
{
    fn on_connection_change(&self, connected: bool, message: &str) {
        self(connected, message);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::SystemTime;

    use super::*;

    struct Rejecting;

    impl FrameObserver<()> for Rejecting {
        fn on_frame(&self, frame: &Frame<()>) -> Result<(), ObserverError> {
            Err(format!("rejected frame {}", frame.header).into())
        }
    }

    fn frame() -> Frame<()> {
        Frame {
            header: 7,
            timestamp: SystemTime::now(),
            payload_len: 0,
            payload: (),
        }
    }

    #[test]
    fn test_closure_frame_observer() {
        let seen = Mutex::new(Vec::new());
        let observer = |f: &Frame<()>| seen.lock().unwrap().push(f.header);

        assert!(observer.on_frame(&frame()).is_ok());
        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[test]
    fn test_struct_frame_observer_error() {
        let err = Rejecting.on_frame(&frame()).unwrap_err();
        assert_eq!(err.to_string(), "rejected frame 7");
    }

    #[test]
    fn test_closure_connection_observer() {
        let events = Mutex::new(Vec::new());
        let observer = |connected: bool, message: &str| {
            events.lock().unwrap().push((connected, message.to_string()));
        };

        observer.on_connection_change(true, "connected");
        assert_eq!(
            *events.lock().unwrap(),
            vec![(true, "connected".to_string())]
        );
    }
}
