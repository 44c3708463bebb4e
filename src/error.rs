//! Error taxonomy for the sorter.
//!
//! Every port has its own small `Copy` error enum so the control loop can
//! tell a fatal startup condition apart from the per-cycle failures it
//! absorbs.  Only [`StartupError`] ever leaves
//! [`SortingLoop::run`](crate::app::service::SortingLoop::run); the rest are
//! turned into log lines, events, and counters.

use core::fmt;
use std::io;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Failure to obtain a classification for the current frame.
///
/// Always recovered by the control loop as `Label::Uncertain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyError {
    /// The backend did not answer within its deadline.
    Timeout,
    /// The backend answered with an error (HTTP failure, model error, ...).
    Backend,
    /// No frame was available to classify.
    NoFrame,
}

impl fmt::Display for ClassifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "classification timed out"),
            Self::Backend => write!(f, "classification backend failed"),
            Self::NoFrame => write!(f, "no frame to classify"),
        }
    }
}

impl From<CaptureError> for ClassifyError {
    fn from(_: CaptureError) -> Self {
        Self::NoFrame
    }
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureError {
    /// The device returned no data for this frame.
    NoData,
    /// End of a recorded stream.
    EndOfStream,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData => write!(f, "camera returned no data"),
            Self::EndOfStream => write!(f, "end of stream"),
        }
    }
}

// ---------------------------------------------------------------------------
// Actuation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuationError {
    /// A move was requested before `acquire` or after `release`.
    NotAcquired,
    /// The PWM channel rejected the duty-cycle write.
    PwmWriteFailed,
    /// Target position outside the actuator's travel.
    OutOfRange,
    /// The actuator hardware could not be opened or enabled.
    Unavailable,
}

impl fmt::Display for ActuationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAcquired => write!(f, "actuator not acquired"),
            Self::PwmWriteFailed => write!(f, "PWM write failed"),
            Self::OutOfRange => write!(f, "target out of range"),
            Self::Unavailable => write!(f, "actuator unavailable"),
        }
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceError {
    /// The underlying file could not be opened or written.
    Io(io::ErrorKind),
    /// The row could not be rendered.
    Format,
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(kind) => write!(f, "log write failed: {kind}"),
            Self::Format => write!(f, "log row formatting failed"),
        }
    }
}

impl From<io::Error> for PersistenceError {
    fn from(e: io::Error) -> Self {
        Self::Io(e.kind())
    }
}

impl From<fmt::Error> for PersistenceError {
    fn from(_: fmt::Error) -> Self {
        Self::Format
    }
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

/// Delivery failures inside the telemetry publisher.  Logged and retried on
/// the next tick; never seen by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryError {
    /// Host name did not resolve to any address.
    Resolve,
    /// TCP connect failed.
    Connect(io::ErrorKind),
    /// Broker answered CONNACK with a non-zero return code.
    Refused(u8),
    /// Socket read/write failed on an established connection.
    Io(io::ErrorKind),
    /// No acknowledgement arrived within the I/O timeout.
    AckTimeout,
    /// Broker sent something we did not expect.
    Protocol,
    /// Peer closed the connection.
    ConnectionClosed,
    /// Operation needs a connection and there is none.
    NotConnected,
    /// Payload could not be serialised or does not fit a packet.
    Encode,
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve => write!(f, "endpoint did not resolve"),
            Self::Connect(kind) => write!(f, "connect failed: {kind}"),
            Self::Refused(code) => write!(f, "connection refused by broker (code {code})"),
            Self::Io(kind) => write!(f, "socket error: {kind}"),
            Self::AckTimeout => write!(f, "acknowledgement timed out"),
            Self::Protocol => write!(f, "unexpected packet from broker"),
            Self::ConnectionClosed => write!(f, "connection closed by peer"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Encode => write!(f, "payload encoding failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Startup
// ---------------------------------------------------------------------------

/// The only error that crosses the control loop's boundary.  The loop never
/// enters `Running` when one of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupError {
    /// The actuators could not be acquired.
    ActuatorUnavailable(ActuationError),
    /// The telemetry thread could not be spawned.
    PublisherSpawn(io::ErrorKind),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActuatorUnavailable(e) => write!(f, "actuators unavailable: {e}"),
            Self::PublisherSpawn(kind) => write!(f, "telemetry task spawn failed: {kind}"),
        }
    }
}

impl std::error::Error for StartupError {}

impl From<ActuationError> for StartupError {
    fn from(e: ActuationError) -> Self {
        Self::ActuatorUnavailable(e)
    }
}
