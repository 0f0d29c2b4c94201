//! End-to-end scenario tests against real loopback sockets (spec §8 S1-S6).
//! No mocked transport: the property under test is the engine's interaction
//! with non-blocking UDP readiness, which a fake socket can't exercise.

use std::net::{Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use groupcast::{CastClient, CastListener, CastMode, Config, ErrorKind, HandleResult, Operation};

#[derive(Debug, Clone)]
enum Event {
    PrepareConnect,
    Connect,
    Handshake,
    Send(Vec<u8>),
    Receive(Vec<u8>),
    Close(Operation, i32),
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

struct TestListener {
    recorder: Arc<Recorder>,
    veto_receive_after: Option<usize>,
}

impl CastListener for TestListener {
    fn on_prepare_connect(&self, _connection_id: u64, _local_addr: SocketAddr) -> HandleResult {
        self.recorder.events.lock().unwrap().push(Event::PrepareConnect);
        HandleResult::Ok
    }

    fn on_connect(&self, _connection_id: u64) -> HandleResult {
        self.recorder.events.lock().unwrap().push(Event::Connect);
        HandleResult::Ok
    }

    fn on_handshake(&self, _connection_id: u64) -> HandleResult {
        self.recorder.events.lock().unwrap().push(Event::Handshake);
        HandleResult::Ok
    }

    fn on_send(&self, _connection_id: u64, data: &[u8]) -> HandleResult {
        self.recorder.events.lock().unwrap().push(Event::Send(data.to_vec()));
        HandleResult::Ok
    }

    fn on_receive(&self, _connection_id: u64, data: &[u8]) -> HandleResult {
        let already = self.recorder.count(|e| matches!(e, Event::Receive(_)));
        self.recorder.events.lock().unwrap().push(Event::Receive(data.to_vec()));
        if let Some(limit) = self.veto_receive_after {
            if already + 1 > limit {
                return HandleResult::Error;
            }
        }
        HandleResult::Ok
    }

    fn on_close(&self, _connection_id: u64, operation: Operation, code: i32) -> HandleResult {
        self.recorder.events.lock().unwrap().push(Event::Close(operation, code));
        HandleResult::Ok
    }
}

fn wait_until(timeout: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if pred() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    pred()
}

fn start_client(port: u16, recorder: Arc<Recorder>, veto_receive_after: Option<usize>) -> CastClient {
    let mut config = Config::new();
    config.set_multicast_ttl(true, 1).unwrap();
    config.set_multicast_loop(true, true).unwrap();

    let listener = Arc::new(TestListener { recorder, veto_receive_after });
    let mut client = CastClient::new(config, listener);
    let started = client.start("239.0.0.1", port, Some("0.0.0.0:0".parse().unwrap()), None);
    assert!(started, "start failed: {:?}", client.get_last_error());
    client
}

#[test]
fn s1_loopback_multicast_echo() {
    let recorder = Arc::new(Recorder::default());
    let mut client = start_client(9101, recorder.clone(), None);

    assert!(client.send(b"PING"));

    assert!(wait_until(Duration::from_secs(2), || {
        recorder.count(|e| matches!(e, Event::Send(_))) >= 1
    }));
    assert!(wait_until(Duration::from_secs(2), || {
        recorder.count(|e| matches!(e, Event::Receive(_))) >= 1
    }));

    assert!(client.stop());

    assert!(wait_until(Duration::from_secs(2), || {
        recorder.count(|e| matches!(e, Event::Close(..))) == 1
    }));

    let events = recorder.events();
    let send_idx = events.iter().position(|e| matches!(e, Event::Send(d) if d == b"PING"));
    let recv_idx = events.iter().position(|e| matches!(e, Event::Receive(d) if d == b"PING"));
    assert!(send_idx.is_some() && recv_idx.is_some());
    assert!(send_idx.unwrap() < recv_idx.unwrap(), "on_send must precede on_receive");

    match events.last().unwrap() {
        Event::Close(Operation::Close, 0) => {}
        other => panic!("expected on_close(close, 0), got {other:?}"),
    }
}

#[test]
fn s2_oversized_send_is_rejected_without_state_change() {
    let mut config = Config::new();
    config.set_max_datagram_size(true, 1024).unwrap();
    let mut client = CastClient::new(config, Arc::new(groupcast::NullListener));
    assert!(client.start("239.0.0.2", 9102, None, None));

    let big = vec![0u8; 2048];
    assert!(!client.send(&big));
    assert_eq!(client.get_last_error().0, ErrorKind::InvalidParam);
    assert!(client.has_started());

    client.stop();
}

#[test]
fn s3_send_before_start_is_invalid_state() {
    let config = Config::new();
    let client = CastClient::new(config, Arc::new(groupcast::NullListener));
    assert!(!client.send(b"hi"));
    assert_eq!(client.get_last_error().0, ErrorKind::InvalidState);
}

#[test]
fn s4_pause_resume_drops_and_then_delivers() {
    let recorder = Arc::new(Recorder::default());
    let mut client = start_client(9104, recorder.clone(), None);

    assert!(client.pause_receive(true));
    assert!(client.is_pause_receive());

    for i in 0..10u8 {
        client.send(&[i]);
    }
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(recorder.count(|e| matches!(e, Event::Receive(_))), 0);

    assert!(client.pause_receive(false));
    assert!(!client.is_pause_receive());

    for i in 100..103u8 {
        client.send(&[i]);
    }

    assert!(wait_until(Duration::from_secs(2), || {
        recorder.count(|e| matches!(e, Event::Receive(_))) >= 3
    }));

    client.stop();
}

#[test]
fn s5_listener_veto_on_second_receive_closes_session() {
    let recorder = Arc::new(Recorder::default());
    let mut client = start_client(9105, recorder.clone(), Some(2));

    for i in 0..5u8 {
        client.send(&[i]);
    }

    assert!(wait_until(Duration::from_secs(2), || {
        recorder.count(|e| matches!(e, Event::Close(..))) == 1
    }));

    let receives = recorder.count(|e| matches!(e, Event::Receive(_)));
    assert_eq!(receives, 2, "listener should veto after exactly 2 deliveries");

    match recorder.events().last().unwrap() {
        Event::Close(Operation::Receive, _) => {}
        other => panic!("expected on_close(receive, cancelled), got {other:?}"),
    }

    let _ = client.stop();
}

#[test]
fn s6_broadcast_ipv6_is_rejected() {
    let mut config = Config::new();
    config.set_cast_mode(true, CastMode::Broadcast).unwrap();
    let mut client = CastClient::new(config, Arc::new(groupcast::NullListener));

    let bind: SocketAddr = (Ipv6Addr::UNSPECIFIED, 0).into();
    let started = client.start("", 9106, Some(bind), None);
    assert!(!started);
    assert_eq!(client.get_last_error().0, ErrorKind::ProtocolNotSupported);
    assert!(!client.has_started());
}
