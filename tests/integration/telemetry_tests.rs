//! Integration tests for the telemetry publisher and the MQTT adapter.
//!
//! The MQTT tests run against a minimal broker stub on a loopback
//! `TcpListener` that answers CONNECT and QoS 1 PUBLISH.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::mocks::{MockTelemetry, RecordingActuators, RecordingSink, bench_config, make_loop};

use sorter::adapters::mqtt::{MqttEndpoint, MqttTelemetry};
use sorter::app::ports::TelemetryPort;
use sorter::app::stop::StopToken;
use sorter::config::{TelemetryBackend, TelemetryConfig};
use sorter::error::TelemetryError;
use sorter::tally::{Label, new_tally};
use sorter::telemetry::payload::{StatusAnnouncement, TelemetrySnapshot};
use sorter::telemetry::publisher::{self, PublisherConfig};

fn fast_publisher() -> PublisherConfig {
    PublisherConfig {
        interval: Duration::from_millis(20),
        announcement: StatusAnnouncement::running("Bench Sorter"),
    }
}

// ── Publisher ────────────────────────────────────────────────

#[test]
fn publisher_attempts_every_interval_with_zero_cycles() {
    let tally = new_tally();
    let stop = StopToken::new();
    let (telemetry, log) = MockTelemetry::new();

    let mut handle =
        publisher::spawn(telemetry, tally.reader(), stop.clone(), fast_publisher()).unwrap();
    thread::sleep(Duration::from_millis(200));
    stop.trigger();
    assert!(handle.shutdown(Duration::from_secs(2)));

    let counters = handle.counters();
    assert!(counters.attempts >= 3, "attempts = {}", counters.attempts);
    assert_eq!(counters.failures, 0);

    let log = log.lock().unwrap();
    assert_eq!(log.connects, 1);
    assert_eq!(log.announces.len(), 1);
    assert_eq!(log.announces[0].status, "Running");
    assert_eq!(log.announces[0].device_type, "Bench Sorter");
    assert!(log.published.iter().all(|s| s.counts == [0, 0, 0]));
    assert_eq!(log.closes, 1);
}

#[test]
fn first_publish_is_immediate() {
    let tally = new_tally();
    let stop = StopToken::new();
    let (telemetry, log) = MockTelemetry::new();
    let config = PublisherConfig {
        interval: Duration::from_secs(60),
        ..fast_publisher()
    };

    let mut handle = publisher::spawn(telemetry, tally.reader(), stop.clone(), config).unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while log.lock().unwrap().published.is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    stop.trigger();
    // A 60 s wait is cut short by the stop.
    assert!(handle.shutdown(Duration::from_secs(2)));
    assert!(!log.lock().unwrap().published.is_empty());
}

#[test]
fn published_snapshots_track_the_tally() {
    let mut tally = new_tally();
    let stop = StopToken::new();
    let (telemetry, log) = MockTelemetry::new();

    let mut handle =
        publisher::spawn(telemetry, tally.reader(), stop.clone(), fast_publisher()).unwrap();
    tally.increment(Label::Accept);
    tally.increment(Label::RejectA);
    thread::sleep(Duration::from_millis(100));
    stop.trigger();
    assert!(handle.shutdown(Duration::from_secs(2)));

    let log = log.lock().unwrap();
    let last = log.published.last().unwrap();
    assert_eq!(last.counts, [1, 1, 0]);
    // Snapshots are monotonic.
    for pair in log.published.windows(2) {
        let a: u64 = pair[0].counts.iter().sum();
        let b: u64 = pair[1].counts.iter().sum();
        assert!(a <= b);
    }
}

// ── Scenario 4: endpoint refuses every connection ────────────

#[test]
fn refused_endpoint_never_blocks_the_loop() {
    let mut cfg = bench_config(Some(5));
    cfg.control.cycle_interval_ms = 20;
    let mut sorter = make_loop(&cfg, vec![Ok(Label::Accept); 5], RecordingActuators::new());
    sorter.settings_mut().publisher = fast_publisher();

    let (telemetry, log) = MockTelemetry::refusing();
    let summary = sorter.run(telemetry, &mut RecordingSink::new()).unwrap();

    assert_eq!(summary.cycles(), 5);
    assert_eq!(sorter.persistence().records.len(), 5);
    assert!(summary.publisher.failures >= 1);
    assert_eq!(summary.publisher.delivered, 0);
    assert!(summary.publisher_joined);

    let log = log.lock().unwrap();
    assert!(log.connects >= 2, "retried on later ticks");
    assert!(log.published.is_empty());
}

#[test]
fn closed_port_is_a_connect_error_in_the_loop() {
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let mut cfg = bench_config(Some(3));
    cfg.control.cycle_interval_ms = 20;
    cfg.telemetry = TelemetryConfig {
        backend: mqtt_backend(port),
        io_timeout_ms: 200,
        ..TelemetryConfig::default()
    };
    let endpoint = MqttEndpoint::from_config(&cfg.telemetry).unwrap();

    let mut sorter = make_loop(&cfg, vec![], RecordingActuators::new());
    sorter.settings_mut().publisher = fast_publisher();
    let summary = sorter
        .run(MqttTelemetry::new(endpoint), &mut RecordingSink::new())
        .unwrap();

    assert_eq!(summary.cycles(), 3);
    assert!(summary.publisher.failures >= 1);
    assert_eq!(summary.publisher.delivered, 0);
}

// ── Shutdown grace ───────────────────────────────────────────

#[test]
fn stalled_publisher_is_abandoned_after_grace() {
    let mut cfg = bench_config(Some(1));
    cfg.control.shutdown_grace_ms = 100;
    let mut sorter = make_loop(&cfg, vec![Ok(Label::Accept)], RecordingActuators::new());
    sorter.settings_mut().publisher = fast_publisher();

    let (telemetry, _log) = MockTelemetry::stalling(Duration::from_secs(2));
    let start = Instant::now();
    let summary = sorter.run(telemetry, &mut RecordingSink::new()).unwrap();

    assert!(!summary.publisher_joined);
    assert!(start.elapsed() < Duration::from_millis(1500));
    assert!(sorter.actuators().released());
}

// ── MQTT loopback broker ─────────────────────────────────────

#[derive(Debug, Default)]
struct BrokerLog {
    client_id: String,
    username: Option<String>,
    keepalive: u16,
    publishes: Vec<(String, u8, Vec<u8>)>,
    disconnected: bool,
}

fn mqtt_backend(port: u16) -> TelemetryBackend {
    TelemetryBackend::Mqtt {
        host: "127.0.0.1".into(),
        port,
        client_id: "bench".into(),
        username: Some("user".into()),
        password: None,
        telemetry_topic: "sorter/telemetry".into(),
        attributes_topic: "sorter/attributes".into(),
    }
}

fn read_packet(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let mut first = [0u8; 1];
    stream.read_exact(&mut first).ok()?;
    let mut len = 0usize;
    for shift in 0..4 {
        let mut b = [0u8; 1];
        stream.read_exact(&mut b).ok()?;
        len |= usize::from(b[0] & 0x7F) << (7 * shift);
        if b[0] & 0x80 == 0 {
            break;
        }
    }
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).ok()?;
    Some((first[0], body))
}

fn take_str(body: &[u8], at: &mut usize) -> String {
    let len = usize::from(u16::from_be_bytes([body[*at], body[*at + 1]]));
    let s = String::from_utf8(body[*at + 2..*at + 2 + len].to_vec()).unwrap();
    *at += 2 + len;
    s
}

/// Accept one client, answer CONNACK with `return_code`, then PUBACK every
/// QoS 1 publish until DISCONNECT or EOF.
fn spawn_broker(return_code: u8) -> (u16, JoinHandle<BrokerLog>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let mut log = BrokerLog::default();
        let (mut stream, _) = listener.accept().unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        let (first, body) = read_packet(&mut stream).unwrap();
        assert_eq!(first, 0x10, "expected CONNECT");
        let mut at = 0;
        assert_eq!(take_str(&body, &mut at), "MQTT");
        assert_eq!(body[at], 4, "protocol level 3.1.1");
        let flags = body[at + 1];
        log.keepalive = u16::from_be_bytes([body[at + 2], body[at + 3]]);
        at += 4;
        log.client_id = take_str(&body, &mut at);
        if flags & 0x80 != 0 {
            log.username = Some(take_str(&body, &mut at));
        }
        stream.write_all(&[0x20, 0x02, 0x00, return_code]).unwrap();
        if return_code != 0 {
            return log;
        }

        while let Some((first, body)) = read_packet(&mut stream) {
            match first >> 4 {
                3 => {
                    let qos = (first >> 1) & 0x03;
                    let mut at = 0;
                    let topic = take_str(&body, &mut at);
                    if qos == 1 {
                        let id = [body[at], body[at + 1]];
                        at += 2;
                        stream.write_all(&[0x40, 0x02, id[0], id[1]]).unwrap();
                    }
                    log.publishes.push((topic, qos, body[at..].to_vec()));
                }
                14 => {
                    log.disconnected = true;
                    break;
                }
                _ => {}
            }
        }
        log
    });
    (port, handle)
}

fn endpoint(port: u16, qos: u8) -> MqttEndpoint {
    MqttEndpoint::from_config(&TelemetryConfig {
        backend: mqtt_backend(port),
        qos,
        io_timeout_ms: 2000,
        ..TelemetryConfig::default()
    })
    .unwrap()
}

#[test]
fn mqtt_session_announces_publishes_and_disconnects() {
    let (port, broker) = spawn_broker(0);
    let mut client = MqttTelemetry::new(endpoint(port, 1));

    client.connect().unwrap();
    assert!(client.is_connected());
    client
        .announce(&StatusAnnouncement::running("Smart Sorter"))
        .unwrap();
    client
        .publish(&TelemetrySnapshot {
            counts: [4, 2, 1],
            working_time_secs: 37,
        })
        .unwrap();
    client.close();
    assert!(!client.is_connected());

    let log = broker.join().unwrap();
    assert_eq!(log.client_id, "bench");
    assert_eq!(log.username.as_deref(), Some("user"));
    assert_eq!(log.keepalive, 60);
    assert!(log.disconnected);
    assert_eq!(log.publishes.len(), 2);

    let (topic, qos, payload) = &log.publishes[0];
    assert_eq!(topic, "sorter/attributes");
    assert_eq!(*qos, 1);
    let v: serde_json::Value = serde_json::from_slice(payload).unwrap();
    assert_eq!(v["status"], "Running");
    assert_eq!(v["deviceType"], "Smart Sorter");

    let (topic, _, payload) = &log.publishes[1];
    assert_eq!(topic, "sorter/telemetry");
    let v: serde_json::Value = serde_json::from_slice(payload).unwrap();
    assert_eq!(v["Accept"], 4);
    assert_eq!(v["Reject-A"], 2);
    assert_eq!(v["Uncertain"], 1);
    assert_eq!(v["working_time"], 37);
}

#[test]
fn mqtt_qos0_needs_no_ack() {
    let (port, broker) = spawn_broker(0);
    let mut client = MqttTelemetry::new(endpoint(port, 0));
    client.connect().unwrap();
    client
        .publish(&TelemetrySnapshot {
            counts: [1, 0, 0],
            working_time_secs: 1,
        })
        .unwrap();
    client.close();

    let log = broker.join().unwrap();
    assert_eq!(log.publishes.len(), 1);
    assert_eq!(log.publishes[0].1, 0);
}

#[test]
fn mqtt_refused_connack_is_reported() {
    let (port, broker) = spawn_broker(5);
    let mut client = MqttTelemetry::new(endpoint(port, 1));
    assert_eq!(client.connect(), Err(TelemetryError::Refused(5)));
    assert!(!client.is_connected());
    broker.join().unwrap();
}

#[test]
fn mqtt_connect_to_closed_port_fails() {
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let mut client = MqttTelemetry::new(endpoint(port, 1));
    assert!(matches!(client.connect(), Err(TelemetryError::Connect(_))));
    assert!(!client.is_connected());
}

#[test]
fn mqtt_missing_puback_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let broker = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let _ = read_packet(&mut stream);
        stream.write_all(&[0x20, 0x02, 0x00, 0x00]).unwrap();
        // Swallow the publish without acknowledging it.
        let _ = read_packet(&mut stream);
        thread::sleep(Duration::from_millis(500));
    });

    let mut ep = endpoint(port, 1);
    ep.io_timeout = Duration::from_millis(150);
    let mut client = MqttTelemetry::new(ep);
    client.connect().unwrap();
    let result = client.publish(&TelemetrySnapshot {
        counts: [0, 0, 0],
        working_time_secs: 0,
    });
    assert_eq!(result, Err(TelemetryError::AckTimeout));
    assert!(!client.is_connected(), "connection dropped after a timeout");
    broker.join().unwrap();
}
