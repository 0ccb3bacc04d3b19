//! End-to-end session tests.
//!
//! Drive a [`Session`] against loopback peers over UDP and TCP and check what
//! observers see.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mvn_stream::prelude::*;
use mvn_stream::transport::encode_length_prefixed;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, UdpSocket};

type Events = Arc<Mutex<Vec<(bool, String)>>>;
type Seen = Arc<Mutex<Vec<(u32, usize)>>>;

fn free_udp_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap().port()
}

fn udp_config(port: u16) -> SessionConfig {
    SessionConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .timeout(Duration::from_millis(50))
        .stop_grace(Duration::from_secs(1))
        .build()
        .unwrap()
}

fn tcp_config(port: u16) -> SessionConfig {
    SessionConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .protocol(Protocol::Tcp)
        .timeout(Duration::from_millis(200))
        .stop_grace(Duration::from_secs(1))
        .build()
        .unwrap()
}

fn record_events(session: &Session) -> Events {
    let events: Events = Arc::default();
    let sink = Arc::clone(&events);
    session.set_connection_observer(move |connected: bool, message: &str| {
        sink.lock().unwrap().push((connected, message.to_string()));
    });
    events
}

fn record_frames(session: &Session) -> Seen {
    let seen: Seen = Arc::default();
    let sink = Arc::clone(&seen);
    session.register_frame_observer(move |frame: &Frame| {
        sink.lock().unwrap().push((frame.header, frame.payload_len));
    });
    seen
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn sender_to(session: &Session) -> UdpSocket {
    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender.connect(session.local_addr().unwrap()).await.unwrap();
    sender
}

/// A datagram with header 1 and a 5-byte payload reaches the observer once.
#[tokio::test]
async fn test_udp_frame_delivered_once() {
    let mut session = Session::new(udp_config(free_udp_port()));
    let seen = record_frames(&session);

    session.connect().await.unwrap();
    assert!(session.start_streaming().await);

    let sender = sender_to(&session).await;
    sender.send(b"\x00\x00\x00\x01hello").await.unwrap();

    wait_for(|| !seen.lock().unwrap().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*seen.lock().unwrap(), vec![(1, 5)]);

    let latest = session.latest_frame().unwrap();
    assert_eq!(latest.header, 1);
    assert_eq!(latest.payload.as_bytes(), b"hello");
    assert_eq!(session.stats().frames_decoded, 1);

    session.disconnect().await.unwrap();
}

/// An idle peer is not an error.
#[tokio::test]
async fn test_idle_peer_keeps_streaming() {
    let mut session = Session::new(udp_config(free_udp_port()));
    let events = record_events(&session);

    session.connect().await.unwrap();
    assert!(session.start_streaming().await);

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(session.is_streaming());
    assert!(session.stats().idle_timeouts > 0);
    assert_eq!(*events.lock().unwrap(), vec![(true, "connected".to_string())]);

    session.disconnect().await.unwrap();
}

/// A refused TCP connect fails, leaves the session disconnected and reports
/// exactly one event.
#[tokio::test]
async fn test_refused_tcp_connect() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut session = Session::new(tcp_config(port));
    let events = record_events(&session);

    let err = session.connect().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(!session.is_connected());

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(!events[0].0);
    assert_eq!(events[0].1, err.to_string());
}

#[tokio::test]
async fn test_connect_twice_keeps_first_transport() {
    let mut session = Session::new(udp_config(free_udp_port()));
    session.connect().await.unwrap();
    let first = session.local_addr();

    let err = session.connect().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(session.local_addr(), first);

    // The first socket still receives.
    let seen = record_frames(&session);
    assert!(session.start_streaming().await);
    let sender = sender_to(&session).await;
    sender.send(b"\x00\x00\x00\x07").await.unwrap();
    wait_for(|| !seen.lock().unwrap().is_empty()).await;

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_start_streaming_when_disconnected() {
    let mut session = Session::new(udp_config(free_udp_port()));
    assert!(!session.start_streaming().await);
    assert!(!session.status().streaming);
}

#[tokio::test]
async fn test_no_delivery_after_stop() {
    let mut session = Session::new(udp_config(free_udp_port()));
    let seen = record_frames(&session);

    session.connect().await.unwrap();
    assert!(session.start_streaming().await);
    let sender = sender_to(&session).await;

    sender.send(b"\x00\x00\x00\x01").await.unwrap();
    wait_for(|| seen.lock().unwrap().len() == 1).await;

    assert_eq!(session.stop_streaming().await, StopOutcome::Graceful);
    let delivered = seen.lock().unwrap().len();

    for _ in 0..5 {
        sender.send(b"\x00\x00\x00\x02").await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(seen.lock().unwrap().len(), delivered);
    assert!(session.is_connected());
    session.disconnect().await.unwrap();
}

/// Observers registered A then B see each frame A first.
#[tokio::test]
async fn test_observer_order() {
    let mut session = Session::new(udp_config(free_udp_port()));
    let calls = Arc::new(Mutex::new(Vec::new()));

    for name in ["a", "b"] {
        let calls = Arc::clone(&calls);
        session.register_frame_observer(move |frame: &Frame| {
            calls.lock().unwrap().push((frame.header, name));
        });
    }

    session.connect().await.unwrap();
    assert!(session.start_streaming().await);
    let sender = sender_to(&session).await;
    for header in 1u32..=3 {
        sender.send(&header.to_be_bytes()).await.unwrap();
    }

    wait_for(|| calls.lock().unwrap().len() == 6).await;
    assert_eq!(
        *calls.lock().unwrap(),
        vec![(1, "a"), (1, "b"), (2, "a"), (2, "b"), (3, "a"), (3, "b")]
    );

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_twice() {
    let mut session = Session::new(udp_config(free_udp_port()));
    session.connect().await.unwrap();

    session.disconnect().await.unwrap();
    session.disconnect().await.unwrap();
    assert!(!session.is_connected());
}

fn faulty(_: &Frame) {
    panic!("renderer crashed");
}

/// Short datagrams are dropped and a panicking observer does not starve the
/// rest.
#[tokio::test]
async fn test_bad_frames_and_faulty_observers() {
    let mut session = Session::new(udp_config(free_udp_port()));
    session.register_frame_observer(faulty);
    let seen = record_frames(&session);

    session.connect().await.unwrap();
    assert!(session.start_streaming().await);
    let sender = sender_to(&session).await;

    sender.send(b"\x00\x01").await.unwrap();
    sender.send(b"\x00\x00\x00\x09ok").await.unwrap();
    wait_for(|| session.stats().observer_failures == 1).await;

    let stats = session.stats();
    assert_eq!(stats.frames_dropped, 1);
    assert_eq!(stats.frames_decoded, 1);
    assert_eq!(stats.observer_failures, 1);
    assert_eq!(*seen.lock().unwrap(), vec![(9, 2)]);
    assert!(session.is_streaming());

    session.disconnect().await.unwrap();
}

/// Length-prefixed frames over TCP, then the peer hangs up.
#[tokio::test]
async fn test_tcp_stream_and_peer_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut session = Session::new(tcp_config(port));
    let events = record_events(&session);
    let seen = record_frames(&session);

    session.connect().await.unwrap();
    let (mut peer, _) = listener.accept().await.unwrap();
    assert!(session.start_streaming().await);

    let mut wire = Vec::new();
    wire.extend_from_slice(&encode_length_prefixed(&Frame::encode(1, b"hello")).unwrap());
    wire.extend_from_slice(&encode_length_prefixed(&Frame::encode(2, b"")).unwrap());
    wire.extend_from_slice(&encode_length_prefixed(&Frame::encode(3, b"abc")).unwrap());
    peer.write_all(&wire).await.unwrap();
    peer.flush().await.unwrap();

    wait_for(|| seen.lock().unwrap().len() == 3).await;
    assert_eq!(*seen.lock().unwrap(), vec![(1, 5), (2, 0), (3, 3)]);

    drop(peer);
    wait_for(|| !session.is_streaming()).await;
    wait_for(|| events.lock().unwrap().len() == 2).await;

    {
        let events = events.lock().unwrap();
        assert_eq!(events[0], (true, "connected".to_string()));
        assert!(!events[1].0);
        assert!(events[1].1.starts_with("stream failed:"));
    }

    // Still connected until told otherwise.
    assert!(session.is_connected());
    assert_eq!(session.stop_streaming().await, StopOutcome::NotRunning);
    session.disconnect().await.unwrap();
    assert_eq!(events.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_status_handle_tracks_session() {
    let mut session = Session::new(udp_config(free_udp_port()));
    let handle = session.status_handle();
    assert!(!handle.status().connected);

    session.connect().await.unwrap();
    assert!(session.start_streaming().await);
    let status = handle.status();
    assert!(status.connected);
    assert!(status.streaming);

    let observer = std::thread::spawn(move || handle.status().config.to_string());
    assert!(observer.join().unwrap().starts_with("UDP 127.0.0.1:"));

    session.disconnect().await.unwrap();
}

/// A blocking observer cannot hold `stop_streaming` past the grace period.
/// The session drops the connection, and the observers after the blocked one
/// never see the frame.
#[tokio::test]
async fn test_forced_stop_disconnects() {
    let config = SessionConfig {
        stop_grace: Duration::from_millis(100),
        ..udp_config(free_udp_port())
    };
    let mut session = Session::new(config);
    let events = record_events(&session);

    let entered = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&entered);
    session.register_frame_observer(move |_: &Frame| {
        flag.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(600));
    });
    let later = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&later);
    session.register_frame_observer(move |_: &Frame| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    session.connect().await.unwrap();
    assert!(session.start_streaming().await);
    let sender = sender_to(&session).await;
    sender.send(b"\x00\x00\x00\x01").await.unwrap();
    wait_for(|| entered.load(Ordering::SeqCst) == 1).await;

    let started = Instant::now();
    assert_eq!(session.stop_streaming().await, StopOutcome::Forced);
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(later.load(Ordering::SeqCst), 0);

    let status = session.status();
    assert!(!status.connected);
    assert!(!status.streaming);
    assert!(session.local_addr().is_none());
    {
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(!events[1].0);
        assert!(events[1].1.contains("did not stop in time"));
    }

    // The blocked observer returns, the one after it is skipped.
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(later.load(Ordering::SeqCst), 0);

    session.disconnect().await.unwrap();
    assert_eq!(events.lock().unwrap().len(), 2);
}

/// Dropping a session mid-dispatch frees its port without waiting for the
/// observer.
#[tokio::test]
async fn test_drop_releases_socket_during_dispatch() {
    let mut session = Session::new(udp_config(free_udp_port()));

    let entered = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));
    let (flag, done) = (Arc::clone(&entered), Arc::clone(&finished));
    session.register_frame_observer(move |_: &Frame| {
        flag.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(800));
        done.store(true, Ordering::SeqCst);
    });

    session.connect().await.unwrap();
    assert!(session.start_streaming().await);
    let addr = session.local_addr().unwrap();
    let sender = sender_to(&session).await;
    sender.send(b"\x00\x00\x00\x01").await.unwrap();
    wait_for(|| entered.load(Ordering::SeqCst) == 1).await;

    drop(session);
    wait_for(|| std::net::UdpSocket::bind(addr).is_ok()).await;
    assert!(!finished.load(Ordering::SeqCst));
}
