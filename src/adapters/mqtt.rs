//! MQTT 3.1.1 telemetry adapter over plain TCP.
//!
//! Implements [`TelemetryPort`] for ThingsBoard (device access token as
//! username, fixed `v1/devices/me/*` topics) and for generic brokers.
//!
//! Every socket operation is bounded by the configured I/O timeout: connect
//! uses `connect_timeout`, reads and writes use socket timeouts, and
//! acknowledgement waits stop at a deadline.  Any I/O error drops the
//! connection; the publisher reconnects on its next tick.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::app::ports::TelemetryPort;
use crate::config::{TelemetryBackend, TelemetryConfig};
use crate::error::TelemetryError;
use crate::telemetry::codec::{self, ConnectOptions, Packet, PacketDecoder};
use crate::telemetry::payload::{StatusAnnouncement, TelemetrySnapshot};

pub const THINGSBOARD_TELEMETRY_TOPIC: &str = "v1/devices/me/telemetry";
pub const THINGSBOARD_ATTRIBUTES_TOPIC: &str = "v1/devices/me/attributes";

/// Resolved connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub telemetry_topic: String,
    pub attributes_topic: String,
    pub qos: u8,
    pub keepalive_secs: u16,
    pub io_timeout: Duration,
}

impl MqttEndpoint {
    /// `None` for the disabled backend.
    pub fn from_config(cfg: &TelemetryConfig) -> Option<Self> {
        let (host, port, client_id, username, password, telemetry_topic, attributes_topic) =
            match &cfg.backend {
                TelemetryBackend::Disabled => return None,
                TelemetryBackend::ThingsBoard {
                    host,
                    port,
                    access_token,
                } => (
                    host.clone(),
                    *port,
                    String::new(),
                    Some(access_token.clone()),
                    None,
                    THINGSBOARD_TELEMETRY_TOPIC.to_string(),
                    THINGSBOARD_ATTRIBUTES_TOPIC.to_string(),
                ),
                TelemetryBackend::Mqtt {
                    host,
                    port,
                    client_id,
                    username,
                    password,
                    telemetry_topic,
                    attributes_topic,
                } => (
                    host.clone(),
                    *port,
                    client_id.clone(),
                    username.clone(),
                    password.clone(),
                    telemetry_topic.clone(),
                    attributes_topic.clone(),
                ),
            };
        Some(Self {
            host,
            port,
            client_id,
            username,
            password,
            telemetry_topic,
            attributes_topic,
            qos: cfg.qos,
            keepalive_secs: cfg.keepalive_secs,
            io_timeout: Duration::from_millis(cfg.io_timeout_ms),
        })
    }
}

pub struct MqttTelemetry {
    endpoint: MqttEndpoint,
    stream: Option<TcpStream>,
    decoder: PacketDecoder,
    next_packet_id: u16,
}

impl MqttTelemetry {
    pub fn new(endpoint: MqttEndpoint) -> Self {
        Self {
            endpoint,
            stream: None,
            decoder: PacketDecoder::new(),
            next_packet_id: 1,
        }
    }

    fn packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        id
    }

    fn open_socket(&self) -> Result<TcpStream, TelemetryError> {
        let addrs = (self.endpoint.host.as_str(), self.endpoint.port)
            .to_socket_addrs()
            .map_err(|_| TelemetryError::Resolve)?;

        let mut last = TelemetryError::Resolve;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.endpoint.io_timeout) {
                Ok(stream) => {
                    let t = Some(self.endpoint.io_timeout);
                    stream
                        .set_read_timeout(t)
                        .and_then(|()| stream.set_write_timeout(t))
                        .and_then(|()| stream.set_nodelay(true))
                        .map_err(|e| TelemetryError::Connect(e.kind()))?;
                    return Ok(stream);
                }
                Err(e) => last = TelemetryError::Connect(e.kind()),
            }
        }
        Err(last)
    }

    /// Write a whole packet; on failure the connection is dropped.
    fn send(&mut self, packet: &[u8]) -> Result<(), TelemetryError> {
        let stream = self.stream.as_mut().ok_or(TelemetryError::NotConnected)?;
        if let Err(e) = stream.write_all(packet).and_then(|()| stream.flush()) {
            self.drop_connection();
            return Err(io_error(&e));
        }
        Ok(())
    }

    /// Read until `want` matches a decoded packet or the deadline passes.
    fn await_packet<T>(
        &mut self,
        mut want: impl FnMut(Packet) -> Option<Result<T, TelemetryError>>,
    ) -> Result<T, TelemetryError> {
        let deadline = Instant::now() + self.endpoint.io_timeout;
        let mut buf = [0u8; 256];

        loop {
            if Instant::now() >= deadline {
                self.drop_connection();
                return Err(TelemetryError::AckTimeout);
            }
            let stream = self.stream.as_mut().ok_or(TelemetryError::NotConnected)?;
            let n = match stream.read(&mut buf) {
                Ok(0) => {
                    self.drop_connection();
                    return Err(TelemetryError::ConnectionClosed);
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.drop_connection();
                    return Err(io_error(&e));
                }
            };

            let mut offset = 0;
            while offset < n {
                let (packet, used) = self.decoder.feed(&buf[offset..n]);
                offset += used;
                match packet {
                    Some(Packet::Malformed) => {
                        self.drop_connection();
                        return Err(TelemetryError::Protocol);
                    }
                    Some(p) => {
                        if let Some(result) = want(p) {
                            if result.is_err() {
                                self.drop_connection();
                            }
                            return result;
                        }
                        debug!("TELEM | ignoring {p:?}");
                    }
                    None => {}
                }
            }
        }
    }

    fn publish_to(&mut self, topic_is_telemetry: bool, payload: &[u8]) -> Result<(), TelemetryError> {
        let qos = self.endpoint.qos;
        let id = if qos > 0 { self.packet_id() } else { 0 };
        let topic = if topic_is_telemetry {
            &self.endpoint.telemetry_topic
        } else {
            &self.endpoint.attributes_topic
        };
        let packet = codec::encode_publish(topic, payload, qos, id)?;
        self.send(&packet)?;
        if qos == 0 {
            return Ok(());
        }
        self.await_packet(|p| match p {
            Packet::PubAck { packet_id } if packet_id == id => Some(Ok(())),
            _ => None,
        })
    }

    fn drop_connection(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.decoder.reset();
    }
}

fn io_error(e: &io::Error) -> TelemetryError {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TelemetryError::AckTimeout,
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => TelemetryError::ConnectionClosed,
        kind => TelemetryError::Io(kind),
    }
}

impl TelemetryPort for MqttTelemetry {
    fn connect(&mut self) -> Result<(), TelemetryError> {
        self.drop_connection();
        let stream = self.open_socket()?;
        self.stream = Some(stream);

        let connect = codec::encode_connect(&ConnectOptions {
            client_id: &self.endpoint.client_id,
            username: self.endpoint.username.as_deref(),
            password: self.endpoint.password.as_deref(),
            keepalive_secs: self.endpoint.keepalive_secs,
        })?;
        self.send(&connect)?;

        self.await_packet(|p| match p {
            Packet::ConnAck { return_code: 0, .. } => Some(Ok(())),
            Packet::ConnAck { return_code, .. } => Some(Err(TelemetryError::Refused(return_code))),
            _ => Some(Err(TelemetryError::Protocol)),
        })?;
        debug!(
            "TELEM | MQTT session open with {}:{}",
            self.endpoint.host, self.endpoint.port
        );
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn announce(&mut self, status: &StatusAnnouncement) -> Result<(), TelemetryError> {
        let payload = serde_json::to_vec(status).map_err(|_| TelemetryError::Encode)?;
        self.publish_to(false, &payload)
    }

    fn publish(&mut self, snapshot: &TelemetrySnapshot) -> Result<(), TelemetryError> {
        let payload = serde_json::to_vec(snapshot).map_err(|_| TelemetryError::Encode)?;
        self.publish_to(true, &payload)
    }

    fn close(&mut self) {
        if self.stream.is_none() {
            return;
        }
        if self.send(&codec::encode_disconnect()).is_err() {
            warn!("TELEM | DISCONNECT not delivered");
        }
        self.drop_connection();
    }
}
