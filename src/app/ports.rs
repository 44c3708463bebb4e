//! Port traits — the hexagonal boundary between the control loop and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ SortingLoop (domain)
//! ```
//!
//! Driven adapters (camera, classifier, servos, CSV log, MQTT, event sinks,
//! config file) implement these traits.  The
//! [`SortingLoop`](super::service::SortingLoop) consumes them via generics,
//! so the domain core never touches hardware or sockets directly.
//!
//! All port errors are typed; the loop decides per variant whether a
//! failure is absorbed or fatal.

use chrono::{DateTime, Local};

use crate::config::SorterConfig;
use crate::error::{
    ActuationError, CaptureError, ClassifyError, PersistenceError, TelemetryError,
};
use crate::routing::{ActuatorId, Position};
use crate::tally::{Label, TallySnapshot};
use crate::telemetry::payload::{StatusAnnouncement, TelemetrySnapshot};

// ───────────────────────────────────────────────────────────────
// Camera port (driven adapter: sensor → domain)
// ───────────────────────────────────────────────────────────────

/// One captured image, row-major RGB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

pub trait CameraPort {
    fn capture(&mut self) -> Result<Frame, CaptureError>;
}

// ───────────────────────────────────────────────────────────────
// Classification port (driven adapter: model → domain)
// ───────────────────────────────────────────────────────────────

/// Result of classifying one frame.  Low-confidence detections have
/// already been folded into [`Label::Uncertain`] by the provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub label: Label,
    pub confidence: f32,
}

pub trait ClassificationPort {
    /// Classify `frame` within the backend's own deadline.
    fn classify(&mut self, frame: &Frame) -> Result<Classification, ClassifyError>;
}

// ───────────────────────────────────────────────────────────────
// Actuation port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port: the domain calls this to move the servos.
pub trait ActuationPort {
    /// Claim and enable the actuators.  Failure here is fatal at startup.
    fn acquire(&mut self) -> Result<(), ActuationError>;

    /// Move `actuator` to `target`, blocking until settled.
    /// Repeating a move to the current position is harmless.
    fn move_to(&mut self, actuator: ActuatorId, target: Position) -> Result<(), ActuationError>;

    /// De-energise and hand the actuators back.  Safe to call twice.
    fn release(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Persistence port (driven adapter: domain → durable log)
// ───────────────────────────────────────────────────────────────

/// One appended row: wall-clock timestamp + the tally after the cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedRecord {
    pub timestamp: DateTime<Local>,
    pub tally: TallySnapshot,
}

pub trait PersistencePort {
    /// Append one record.  The caller logs failures and never retries.
    fn append(&mut self, record: &PersistedRecord) -> Result<(), PersistenceError>;
}

// ───────────────────────────────────────────────────────────────
// Telemetry port (driven adapter: publisher → remote endpoint)
// ───────────────────────────────────────────────────────────────

/// Remote telemetry endpoint.  Owned by the publisher thread.
pub trait TelemetryPort: Send {
    /// Open the persistent connection.
    fn connect(&mut self) -> Result<(), TelemetryError>;

    fn is_connected(&self) -> bool;

    /// Send the "running" status record.  Called after every connect.
    fn announce(&mut self, status: &StatusAnnouncement) -> Result<(), TelemetryError>;

    /// Deliver one snapshot.
    fn publish(&mut self, snapshot: &TelemetrySnapshot) -> Result<(), TelemetryError>;

    /// Close the connection.  Safe to call when not connected.
    fn close(&mut self);
}

impl<T: TelemetryPort + ?Sized> TelemetryPort for Box<T> {
    fn connect(&mut self) -> Result<(), TelemetryError> {
        (**self).connect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn announce(&mut self, status: &StatusAnnouncement) -> Result<(), TelemetryError> {
        (**self).announce(status)
    }

    fn publish(&mut self, snapshot: &TelemetrySnapshot) -> Result<(), TelemetryError> {
        (**self).publish(snapshot)
    }

    fn close(&mut self) {
        (**self).close();
    }
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists sorter configuration.
///
/// Implementations MUST validate before persisting.  Invalid ranges are
/// rejected with [`ConfigError::ValidationFailed`], not silently clamped.
pub trait ConfigPort {
    /// Load configuration.  Returns [`SorterConfig::default()`] when no
    /// stored config exists.
    fn load(&self) -> Result<SorterConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SorterConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// Stored config failed to parse.
    Corrupted(String),
    /// A config field failed range validation.
    ValidationFailed(&'static str),
    /// Underlying file could not be read or written.
    Io(std::io::ErrorKind),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted(msg) => write!(f, "config corrupted: {}", msg),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::Io(kind) => write!(f, "config I/O error: {}", kind),
        }
    }
}

impl std::error::Error for ConfigError {}
