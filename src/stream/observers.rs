//! Observer registration and dispatch.
//!
//! Every invocation runs inside its own failure boundary: an observer that
//! returns an error or panics is logged and counted, and dispatch moves on to
//! the next observer.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::core::{ConnectionObserver, FrameObserver};
use crate::frame::Frame;

/// Handle identifying a registered frame observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

type SharedFrameObserver<P> = Arc<dyn FrameObserver<P>>;

/// Ordered frame observers plus at most one connection observer.
pub struct ObserverRegistry<P> {
    frame: RwLock<Vec<(ObserverId, SharedFrameObserver<P>)>>,
    connection: RwLock<Option<Arc<dyn ConnectionObserver>>>,
    next_id: AtomicU64,
}

impl<P> Default for ObserverRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> std::fmt::Debug for ObserverRegistry<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("frame_observers", &self.frame_observer_count())
            .field("has_connection_observer", &self.has_connection_observer())
            .finish()
    }
}

impl<P> ObserverRegistry<P> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            frame: RwLock::new(Vec::new()),
            connection: RwLock::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append a frame observer. Observers run in registration order.
    pub fn register_frame(&self, observer: impl FrameObserver<P> + 'static) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let observer: SharedFrameObserver<P> = Arc::new(observer);
        self.frame
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        id
    }

    /// Remove a frame observer. Returns `false` if `id` is not registered.
    pub fn remove_frame(&self, id: ObserverId) -> bool {
        let mut observers = self.frame.write().unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(registered, _)| *registered != id);
        observers.len() != before
    }

    /// Number of registered frame observers.
    pub fn frame_observer_count(&self) -> usize {
        self.frame.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Set the connection observer, replacing any previous one.
    pub fn set_connection(&self, observer: impl ConnectionObserver + 'static) {
        let observer: Arc<dyn ConnectionObserver> = Arc::new(observer);
        *self
            .connection
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }

    /// Check if a connection observer is set.
    pub fn has_connection_observer(&self) -> bool {
        self.connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Deliver a frame to every frame observer, in registration order.
    ///
    /// Returns the number of observers that failed.
    pub fn dispatch_frame(&self, frame: &Frame<P>) -> u64 {
        self.dispatch_frame_while(frame, || true)
    }

    /// Like [`dispatch_frame`](Self::dispatch_frame), but checks `proceed`
    /// before each observer and stops at the first `false`.
    pub fn dispatch_frame_while(&self, frame: &Frame<P>, mut proceed: impl FnMut() -> bool) -> u64 {
        // Invoke outside the lock so observers may register others.
        let observers: Vec<SharedFrameObserver<P>> = self
            .frame
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        let mut failures = 0;
        for (index, observer) in observers.iter().enumerate() {
            if !proceed() {
                tracing::debug!(
                    header = frame.header,
                    skipped = observers.len() - index,
                    "dispatch cut short"
                );
                break;
            }
            match catch_unwind(AssertUnwindSafe(|| observer.on_frame(frame))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    tracing::warn!(observer = index, header = frame.header, error = %e, "frame observer failed");
                }
                Err(panic) => {
                    failures += 1;
                    tracing::warn!(
                        observer = index,
                        header = frame.header,
                        panic = panic_message(panic.as_ref()),
                        "frame observer panicked"
                    );
                }
            }
        }
        failures
    }

    /// Report a connection-state transition to the connection observer.
    pub fn notify_connection(&self, connected: bool, message: &str) {
        let observer = self
            .connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        if let Some(observer) = observer {
            let result = catch_unwind(AssertUnwindSafe(|| {
                observer.on_connection_change(connected, message)
            }));
            if let Err(panic) = result {
                tracing::warn!(
                    connected,
                    panic = panic_message(panic.as_ref()),
                    "connection observer panicked"
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::SystemTime;

    use super::*;
    use crate::core::ObserverError;

    fn frame(header: u32) -> Frame<()> {
        Frame {
            header,
            timestamp: SystemTime::now(),
            payload_len: 0,
            payload: (),
        }
    }

    #[test]
    fn test_registration_order() {
        let registry = ObserverRegistry::<()>::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for name in ["a", "b", "c"] {
            let calls = Arc::clone(&calls);
            registry.register_frame(move |f: &Frame<()>| {
                calls.lock().unwrap().push((name, f.header));
            });
        }

        assert_eq!(registry.dispatch_frame(&frame(1)), 0);
        assert_eq!(registry.dispatch_frame(&frame(2)), 0);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![("a", 1), ("b", 1), ("c", 1), ("a", 2), ("b", 2), ("c", 2)]
        );
    }

    fn panicking(_: &Frame<()>) {
        panic!("observer bug");
    }

    fn panicking_connection(_: bool, _: &str) {
        panic!("ui thread gone");
    }

    struct Failing;

    impl FrameObserver<()> for Failing {
        fn on_frame(&self, _frame: &Frame<()>) -> Result<(), ObserverError> {
            Err("renderer unavailable".into())
        }
    }

    #[test]
    fn test_failures_are_isolated() {
        let registry = ObserverRegistry::<()>::new();
        let reached = Arc::new(Mutex::new(0));

        registry.register_frame(panicking);
        registry.register_frame(Failing);
        let counter = Arc::clone(&reached);
        registry.register_frame(move |_: &Frame<()>| *counter.lock().unwrap() += 1);

        assert_eq!(registry.dispatch_frame(&frame(1)), 2);
        assert_eq!(*reached.lock().unwrap(), 1);
    }

    #[test]
    fn test_dispatch_stops_when_told() {
        let registry = ObserverRegistry::<()>::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let current = Arc::new(std::sync::atomic::AtomicBool::new(true));

        let sink = Arc::clone(&calls);
        let flag = Arc::clone(&current);
        registry.register_frame(move |_: &Frame<()>| {
            sink.lock().unwrap().push("a");
            flag.store(false, Ordering::SeqCst);
        });
        let sink = Arc::clone(&calls);
        registry.register_frame(move |_: &Frame<()>| sink.lock().unwrap().push("b"));

        let failures = registry.dispatch_frame_while(&frame(1), || current.load(Ordering::SeqCst));
        assert_eq!(failures, 0);
        assert_eq!(*calls.lock().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_remove_frame_observer() {
        let registry = ObserverRegistry::<()>::new();
        let first = registry.register_frame(|_: &Frame<()>| {});
        let second = registry.register_frame(|_: &Frame<()>| {});
        assert_ne!(first, second);

        assert!(registry.remove_frame(first));
        assert!(!registry.remove_frame(first));
        assert_eq!(registry.frame_observer_count(), 1);
    }

    #[test]
    fn test_connection_observer_replaced() {
        let registry = ObserverRegistry::<()>::new();
        let events = Arc::new(Mutex::new(Vec::new()));

        // No observer: notification is a no-op.
        registry.notify_connection(true, "connected");

        registry.set_connection(panicking_connection);
        let sink = Arc::clone(&events);
        registry.set_connection(move |connected: bool, message: &str| {
            sink.lock().unwrap().push((connected, message.to_string()));
        });

        registry.notify_connection(false, "disconnected");
        assert_eq!(
            *events.lock().unwrap(),
            vec![(false, "disconnected".to_string())]
        );
    }

    #[test]
    fn test_connection_observer_panic_contained() {
        let registry = ObserverRegistry::<()>::new();
        registry.set_connection(panicking_connection);
        registry.notify_connection(true, "connected");
        assert!(registry.has_connection_observer());
    }
}
