//! Telemetry record shapes.
//!
//! ```text
//!   periodic:  {"Accept": 4, "Reject-A": 2, "Uncertain": 1, "working_time": 37}
//!   connect:   {"status": "Running", "deviceType": "Smart Sorter"}
//! ```

use core::fmt;

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::tally::{Label, TallySnapshot};

/// Immutable copy of the tally at publish time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub counts: [u64; Label::COUNT],
    /// Whole seconds since the loop started.
    pub working_time_secs: u64,
}

impl From<&TallySnapshot> for TelemetrySnapshot {
    fn from(t: &TallySnapshot) -> Self {
        Self {
            counts: t.counts,
            working_time_secs: t.elapsed_secs(),
        }
    }
}

impl TelemetrySnapshot {
    pub fn count(&self, label: Label) -> u64 {
        self.counts[label as usize]
    }
}

/// Keys are the label names in column order, then `working_time`.
impl Serialize for TelemetrySnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Label::COUNT + 1))?;
        for label in Label::ALL {
            map.serialize_entry(label.name(), &self.count(label))?;
        }
        map.serialize_entry("working_time", &self.working_time_secs)?;
        map.end()
    }
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in Label::ALL {
            write!(f, "{}={} ", label.name(), self.count(label))?;
        }
        write!(f, "working_time={}s", self.working_time_secs)
    }
}

/// Status record sent once per connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusAnnouncement {
    pub status: &'static str,
    #[serde(rename = "deviceType")]
    pub device_type: String,
}

impl StatusAnnouncement {
    pub fn running(device_type: impl Into<String>) -> Self {
        Self {
            status: "Running",
            device_type: device_type.into(),
        }
    }
}
