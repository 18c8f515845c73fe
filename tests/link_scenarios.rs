use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};

use peerchat::client::{event_channel, LinkEvent, LinkEventKind, LinkEvents, LinkOptions, PeerLink};
use peerchat::common::{ConnectionState, PeerEndpoint};
use peerchat::error::{ConnectError, SendError};

const TIMEOUT: Duration = Duration::from_secs(5);

fn listen() -> (TcpListener, PeerEndpoint) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, PeerEndpoint::new("127.0.0.1", port).unwrap())
}

fn closed_port() -> PeerEndpoint {
    let (listener, endpoint) = listen();
    drop(listener);
    endpoint
}

fn accept(listener: &TcpListener) -> TcpStream {
    let (stream, _) = listener.accept().unwrap();
    stream.set_read_timeout(Some(TIMEOUT)).unwrap();
    stream
}

fn read_exactly(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0; len];
    stream.read_exact(&mut buf).unwrap();
    buf
}

fn states(events: &LinkEvents) -> Vec<ConnectionState> {
    events
        .try_iter()
        .filter_map(|e| match e.kind {
            LinkEventKind::StateChanged(state) => Some(state),
            _ => None,
        })
        .collect()
}

/// Waits for the first event matching `pred`
fn wait_for<P>(events: &LinkEvents, pred: P) -> LinkEvent
where
    P: Fn(&LinkEventKind) -> bool,
{
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        let event = events.recv_timeout(left).expect("event did not arrive");
        if pred(&event.kind) {
            return event;
        }
    }
}

fn wait_written(events: &LinkEvents, count: usize) {
    for _ in 0..count {
        wait_for(events, |k| matches!(k, LinkEventKind::Written { .. }));
    }
}

#[test]
fn connect_to_listening_peer_and_send_hello() {
    let (listener, endpoint) = listen();
    let (tx, rx) = event_channel();
    let link = PeerLink::new(endpoint, LinkOptions::default(), tx);

    link.connect().unwrap();
    let mut peer = accept(&listener);
    assert_eq!(
        states(&rx),
        vec![ConnectionState::Connecting, ConnectionState::Connected]
    );
    assert!(link.holds_socket());

    link.send("hello").unwrap();
    wait_written(&rx, 1);
    link.close();

    let mut received = Vec::new();
    peer.read_to_end(&mut received).unwrap();
    assert_eq!(received, b"hello\n");
}

#[test]
fn connect_to_closed_port_fails() {
    let (tx, rx) = event_channel();
    let link = PeerLink::new(closed_port(), LinkOptions::default(), tx);

    let err = link.connect().unwrap_err();
    assert!(matches!(err, ConnectError::Dial { .. }));
    assert!(matches!(link.state(), ConnectionState::Failed(_)));
    assert!(!link.holds_socket());

    let seen = states(&rx);
    assert_eq!(seen[0], ConnectionState::Connecting);
    assert!(matches!(seen[1], ConnectionState::Failed(_)));

    let started = Instant::now();
    assert_eq!(link.send("hello"), Err(SendError::NotConnected));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn connect_with_timeout_to_closed_port_fails() {
    let options = LinkOptions {
        connect_timeout: Some(Duration::from_secs(2)),
        ..LinkOptions::default()
    };
    let (tx, _rx) = event_channel();
    let link = PeerLink::new(closed_port(), options, tx);
    assert!(link.connect().is_err());
    assert!(matches!(link.state(), ConnectionState::Failed(_)));
}

#[test]
fn empty_send_writes_nothing() {
    let (listener, endpoint) = listen();
    let (tx, rx) = event_channel();
    let link = PeerLink::new(endpoint, LinkOptions::default(), tx);
    link.connect().unwrap();
    let mut peer = accept(&listener);

    link.send("").unwrap();
    link.send("x").unwrap();
    wait_written(&rx, 1);

    assert_eq!(read_exactly(&mut peer, 2), b"x\n");
    assert!(rx
        .try_iter()
        .all(|e| !matches!(e.kind, LinkEventKind::Written { .. })));
}

#[test]
fn frames_arrive_in_send_order() {
    let (listener, endpoint) = listen();
    let (tx, rx) = event_channel();
    let link = PeerLink::new(endpoint, LinkOptions::default(), tx);
    link.connect().unwrap();
    let mut peer = accept(&listener);

    link.send("A").unwrap();
    link.send("B").unwrap();
    let expected: Vec<String> = (0..200).map(|i| format!("line {}", i)).collect();
    for line in &expected {
        link.send(line).unwrap();
    }
    wait_written(&rx, 202);
    link.close();

    let mut received = String::new();
    peer.read_to_string(&mut received).unwrap();
    let mut lines = received.lines();
    assert_eq!(lines.next(), Some("A"));
    assert_eq!(lines.next(), Some("B"));
    let rest: Vec<&str> = lines.collect();
    assert_eq!(rest, expected);
}

#[test]
fn close_is_idempotent() {
    let (listener, endpoint) = listen();
    let (tx, rx) = event_channel();
    let link = PeerLink::new(endpoint, LinkOptions::default(), tx);
    link.connect().unwrap();
    let _peer = accept(&listener);

    link.close();
    link.close();
    assert_eq!(link.state(), ConnectionState::Closed);
    assert!(!link.holds_socket());

    let closed = states(&rx)
        .into_iter()
        .filter(|s| *s == ConnectionState::Closed)
        .count();
    assert_eq!(closed, 1);
    assert_eq!(link.send("late"), Err(SendError::NotConnected));
}

#[test]
fn close_on_idle_link_does_nothing() {
    let (tx, rx) = event_channel();
    let link = PeerLink::new(PeerEndpoint::default(), LinkOptions::default(), tx);
    link.close();
    assert_eq!(link.state(), ConnectionState::Idle);
    assert!(rx.try_recv().is_err());
}

#[test]
fn peer_hangup_surfaces_write_failure() {
    let (listener, endpoint) = listen();
    let (tx, rx) = event_channel();
    let link = PeerLink::new(endpoint, LinkOptions::default(), tx);
    link.connect().unwrap();
    drop(accept(&listener));

    let deadline = Instant::now() + TIMEOUT;
    let failure = loop {
        assert!(Instant::now() < deadline, "write failure never reported");
        match link.send("ping") {
            Ok(()) | Err(SendError::NotConnected) => {}
            Err(other) => panic!("unexpected send error: {other}"),
        }
        if let Ok(event) = rx.recv_timeout(Duration::from_millis(20)) {
            if let LinkEventKind::WriteFailed(err) = event.kind {
                break err;
            }
        }
    };

    assert!(matches!(failure, SendError::WriteFailed { .. }));
    assert!(matches!(link.state(), ConnectionState::Failed(_)));
    assert!(!link.holds_socket());
    assert_eq!(link.send("again"), Err(SendError::NotConnected));
}

#[test]
fn closed_link_reconnects_with_fresh_socket() {
    let (listener, endpoint) = listen();
    let (tx, rx) = event_channel();
    let link = PeerLink::new(endpoint, LinkOptions::default(), tx);

    link.connect().unwrap();
    let _first = accept(&listener);
    link.close();

    link.connect().unwrap();
    let mut second = accept(&listener);
    assert!(link.is_connected());
    link.send("again").unwrap();
    wait_written(&rx, 1);
    assert_eq!(read_exactly(&mut second, 6), b"again\n");
}

#[test]
fn close_during_queued_writes_is_tolerated() {
    let (listener, endpoint) = listen();
    let (tx, rx) = event_channel();
    let link = PeerLink::new(endpoint, LinkOptions::default(), tx);
    link.connect().unwrap();
    let _peer = accept(&listener);

    let line = "x".repeat(64 * 1024);
    for _ in 0..64 {
        link.send(&line).unwrap();
    }
    link.close();

    assert_eq!(link.state(), ConnectionState::Closed);
    assert!(!link.holds_socket());

    // every queued frame is accounted for, written or reported
    let mut settled = 0;
    let deadline = Instant::now() + TIMEOUT;
    while settled < 64 && Instant::now() < deadline {
        if let Ok(event) = rx.recv_timeout(Duration::from_millis(50)) {
            if matches!(
                event.kind,
                LinkEventKind::Written { .. } | LinkEventKind::WriteFailed(_)
            ) {
                settled += 1;
            }
        }
    }
    assert_eq!(settled, 64);
    assert_eq!(link.state(), ConnectionState::Closed);
}

#[test]
fn receive_loop_reports_lines_and_hangup() {
    let (listener, endpoint) = listen();
    let options = LinkOptions {
        receive: true,
        ..LinkOptions::default()
    };
    let (tx, rx) = event_channel();
    let link = PeerLink::new(endpoint, options, tx);
    link.connect().unwrap();

    let mut peer = accept(&listener);
    std::io::Write::write_all(&mut peer, b"hi there\r\nsecond\n").unwrap();

    let first = wait_for(&rx, |k| matches!(k, LinkEventKind::Inbound(_)));
    assert_eq!(first.kind, LinkEventKind::Inbound("hi there".to_string()));
    let second = wait_for(&rx, |k| matches!(k, LinkEventKind::Inbound(_)));
    assert_eq!(second.kind, LinkEventKind::Inbound("second".to_string()));

    drop(peer);
    wait_for(&rx, |k| {
        matches!(k, LinkEventKind::StateChanged(ConnectionState::Failed(_)))
    });
    assert!(!link.holds_socket());
    assert_eq!(link.send("anyone?"), Err(SendError::NotConnected));
}

#[test]
fn connected_is_reported_before_an_immediate_hangup() {
    let (listener, endpoint) = listen();
    let options = LinkOptions {
        receive: true,
        ..LinkOptions::default()
    };
    let (tx, rx) = event_channel();
    let link = PeerLink::new(endpoint, options, tx);
    link.connect().unwrap();
    drop(accept(&listener));

    let mut seen = Vec::new();
    let deadline = Instant::now() + TIMEOUT;
    while !matches!(seen.last(), Some(ConnectionState::Failed(_))) {
        let left = deadline.saturating_duration_since(Instant::now());
        let event = rx.recv_timeout(left).expect("hangup was not reported");
        if let LinkEventKind::StateChanged(state) = event.kind {
            seen.push(state);
        }
    }
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], ConnectionState::Connecting);
    assert_eq!(seen[1], ConnectionState::Connected);
}

#[test]
fn reconnect_events_carry_a_new_generation() {
    let (listener, endpoint) = listen();
    let (tx, rx) = event_channel();
    let link = PeerLink::new(endpoint, LinkOptions::default(), tx);

    link.connect().unwrap();
    let _first = accept(&listener);
    let first = link.generation();
    link.close();
    link.connect().unwrap();
    let _second = accept(&listener);
    let second = link.generation();
    assert_ne!(first, second);

    let stamped: Vec<(u64, ConnectionState)> = rx
        .try_iter()
        .filter_map(|e| match e.kind {
            LinkEventKind::StateChanged(state) => Some((e.generation, state)),
            _ => None,
        })
        .collect();
    assert_eq!(
        stamped,
        vec![
            (first, ConnectionState::Connecting),
            (first, ConnectionState::Connected),
            (first, ConnectionState::Closed),
            (second, ConnectionState::Connecting),
            (second, ConnectionState::Connected),
        ]
    );
}
