//! MQTT 3.1.1 packet codec (client side, QoS 0/1 publish only).
//!
//! Wire format of every control packet:
//! ```text
//! ┌──────────────┬──────────────────────┬───────────────────────────┐
//! │ Type|Flags 1B│ Remaining length 1–4B│ Variable header + payload │
//! │              │ base-128 varint      │ (remaining length bytes)  │
//! └──────────────┴──────────────────────┴───────────────────────────┘
//! ```
//!
//! Encoders build complete packets.  [`PacketDecoder`] accumulates incoming
//! bytes and yields broker packets one at a time; a single socket read may
//! hold part of a header, part of a body, or several packets back to back.

use crate::error::TelemetryError;

/// Largest value the 4-byte remaining-length varint can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Body bytes retained for inspection.  Longer packets are skipped.
const MAX_BODY: usize = 64;

pub const PACKET_CONNECT: u8 = 1;
pub const PACKET_CONNACK: u8 = 2;
pub const PACKET_PUBLISH: u8 = 3;
pub const PACKET_PUBACK: u8 = 4;
pub const PACKET_DISCONNECT: u8 = 14;

const PROTOCOL_LEVEL_311: u8 = 4;

// ---------------------------------------------------------------------------
// Remaining length
// ---------------------------------------------------------------------------

/// Encode `len` as a remaining-length varint.  Returns the bytes and the
/// number used, or `None` if `len` exceeds [`MAX_REMAINING_LENGTH`].
pub fn encode_remaining_length(mut len: usize) -> Option<([u8; 4], usize)> {
    if len > MAX_REMAINING_LENGTH {
        return None;
    }
    let mut out = [0u8; 4];
    let mut n = 0;
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        out[n] = byte;
        n += 1;
        if len == 0 {
            return Some((out, n));
        }
    }
}

/// Decode a remaining-length varint from the front of `bytes`.
///
/// `Ok(None)` means more bytes are needed; `Err(())` means the varint runs
/// past four bytes.
#[allow(clippy::result_unit_err)]
pub fn decode_remaining_length(bytes: &[u8]) -> Result<Option<(usize, usize)>, ()> {
    let mut value = 0usize;
    for (i, &b) in bytes.iter().enumerate().take(4) {
        value += usize::from(b & 0x7F) << (7 * i);
        if b & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    if bytes.len() >= 4 { Err(()) } else { Ok(None) }
}

// ---------------------------------------------------------------------------
// Encoders
// ---------------------------------------------------------------------------

/// CONNECT parameters.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions<'a> {
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub keepalive_secs: u16,
}

fn put_str(buf: &mut Vec<u8>, s: &str) -> Result<(), TelemetryError> {
    let len = u16::try_from(s.len()).map_err(|_| TelemetryError::Encode)?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn frame(first_byte: u8, body: &[u8]) -> Result<Vec<u8>, TelemetryError> {
    let (len, n) = encode_remaining_length(body.len()).ok_or(TelemetryError::Encode)?;
    let mut out = Vec::with_capacity(1 + n + body.len());
    out.push(first_byte);
    out.extend_from_slice(&len[..n]);
    out.extend_from_slice(body);
    Ok(out)
}

/// Build a clean-session CONNECT packet.
pub fn encode_connect(opts: &ConnectOptions<'_>) -> Result<Vec<u8>, TelemetryError> {
    let mut flags = 0x02; // clean session
    if opts.username.is_some() {
        flags |= 0x80;
    }
    if opts.password.is_some() {
        if opts.username.is_none() {
            // 3.1.1 forbids a password without a username.
            return Err(TelemetryError::Encode);
        }
        flags |= 0x40;
    }

    let mut body = Vec::with_capacity(32);
    put_str(&mut body, "MQTT")?;
    body.push(PROTOCOL_LEVEL_311);
    body.push(flags);
    body.extend_from_slice(&opts.keepalive_secs.to_be_bytes());
    put_str(&mut body, opts.client_id)?;
    if let Some(user) = opts.username {
        put_str(&mut body, user)?;
    }
    if let Some(pass) = opts.password {
        put_str(&mut body, pass)?;
    }
    frame(PACKET_CONNECT << 4, &body)
}

/// Build a PUBLISH packet.  `packet_id` is required for QoS 1 and ignored
/// for QoS 0.
pub fn encode_publish(
    topic: &str,
    payload: &[u8],
    qos: u8,
    packet_id: u16,
) -> Result<Vec<u8>, TelemetryError> {
    if qos > 1 || topic.is_empty() || (qos == 1 && packet_id == 0) {
        return Err(TelemetryError::Encode);
    }
    let mut body = Vec::with_capacity(topic.len() + payload.len() + 4);
    put_str(&mut body, topic)?;
    if qos == 1 {
        body.extend_from_slice(&packet_id.to_be_bytes());
    }
    body.extend_from_slice(payload);
    frame((PACKET_PUBLISH << 4) | (qos << 1), &body)
}

pub fn encode_disconnect() -> [u8; 2] {
    [PACKET_DISCONNECT << 4, 0x00]
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Broker → client packets the telemetry client cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet {
    ConnAck { session_present: bool, return_code: u8 },
    PubAck { packet_id: u16 },
    /// Well-formed packet of a type the client ignores.
    Other { packet_type: u8 },
    /// Bad remaining length or a body that does not fit its type.
    Malformed,
}

enum DecoderState {
    /// Waiting for the type/flags byte.
    ReadingType,
    /// Collecting remaining-length varint bytes.
    ReadingLength { first: u8, collected: usize },
    /// Collecting body bytes.
    ReadingBody {
        first: u8,
        expected: usize,
        collected: usize,
    },
}

/// Streaming MQTT packet decoder.
pub struct PacketDecoder {
    state: DecoderState,
    len_buf: [u8; 4],
    body_buf: [u8; MAX_BODY],
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::ReadingType,
            len_buf: [0; 4],
            body_buf: [0; MAX_BODY],
        }
    }

    /// Feed bytes into the decoder.
    ///
    /// Returns the first completed packet (if any) together with the number
    /// of input bytes consumed.  Call again with the remainder to drain
    /// further packets.
    pub fn feed(&mut self, data: &[u8]) -> (Option<Packet>, usize) {
        let mut offset = 0;

        while offset < data.len() {
            match &mut self.state {
                DecoderState::ReadingType => {
                    let first = data[offset];
                    offset += 1;
                    self.state = DecoderState::ReadingLength {
                        first,
                        collected: 0,
                    };
                }

                DecoderState::ReadingLength { first, collected } => {
                    let first = *first;
                    self.len_buf[*collected] = data[offset];
                    *collected += 1;
                    offset += 1;

                    match decode_remaining_length(&self.len_buf[..*collected]) {
                        Ok(None) => {}
                        Ok(Some((0, _))) => {
                            self.state = DecoderState::ReadingType;
                            return (Some(classify(first, &[], 0)), offset);
                        }
                        Ok(Some((expected, _))) => {
                            self.state = DecoderState::ReadingBody {
                                first,
                                expected,
                                collected: 0,
                            };
                        }
                        Err(()) => {
                            self.state = DecoderState::ReadingType;
                            return (Some(Packet::Malformed), offset);
                        }
                    }
                }

                DecoderState::ReadingBody {
                    first,
                    expected,
                    collected,
                } => {
                    let needed = *expected - *collected;
                    let available = data.len() - offset;
                    let to_take = needed.min(available);

                    // Retain what fits; the tail of oversized packets is skipped.
                    if *collected < MAX_BODY {
                        let keep = to_take.min(MAX_BODY - *collected);
                        self.body_buf[*collected..*collected + keep]
                            .copy_from_slice(&data[offset..offset + keep]);
                    }

                    *collected += to_take;
                    offset += to_take;

                    if *collected == *expected {
                        let (first, len) = (*first, *expected);
                        self.state = DecoderState::ReadingType;
                        let kept = len.min(MAX_BODY);
                        return (Some(classify(first, &self.body_buf[..kept], len)), offset);
                    }
                }
            }
        }

        (None, offset)
    }

    /// Reset decoder state (e.g. after a reconnect).
    pub fn reset(&mut self) {
        self.state = DecoderState::ReadingType;
    }
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn classify(first: u8, body: &[u8], len: usize) -> Packet {
    match first >> 4 {
        PACKET_CONNACK => {
            if first & 0x0F != 0 || len != 2 {
                return Packet::Malformed;
            }
            Packet::ConnAck {
                session_present: body[0] & 0x01 != 0,
                return_code: body[1],
            }
        }
        PACKET_PUBACK => {
            if first & 0x0F != 0 || len != 2 {
                return Packet::Malformed;
            }
            Packet::PubAck {
                packet_id: u16::from_be_bytes([body[0], body[1]]),
            }
        }
        0 | 15 => Packet::Malformed,
        packet_type => Packet::Other { packet_type },
    }
}
