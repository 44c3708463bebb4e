//! Log-only telemetry backend, used when no broker is configured.
//!
//! Always "connected"; every record goes to the log as its JSON payload.

use log::info;

use crate::app::ports::TelemetryPort;
use crate::error::TelemetryError;
use crate::telemetry::payload::{StatusAnnouncement, TelemetrySnapshot};

#[derive(Debug, Default)]
pub struct LogTelemetry {
    connected: bool,
    published: u64,
}

impl LogTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> u64 {
        self.published
    }
}

impl TelemetryPort for LogTelemetry {
    fn connect(&mut self) -> Result<(), TelemetryError> {
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn announce(&mut self, status: &StatusAnnouncement) -> Result<(), TelemetryError> {
        let json = serde_json::to_string(status).map_err(|_| TelemetryError::Encode)?;
        info!("TELEM | attributes {json}");
        Ok(())
    }

    fn publish(&mut self, snapshot: &TelemetrySnapshot) -> Result<(), TelemetryError> {
        if !self.connected {
            return Err(TelemetryError::NotConnected);
        }
        let json = serde_json::to_string(snapshot).map_err(|_| TelemetryError::Encode)?;
        info!("TELEM | telemetry {json}");
        self.published += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.connected = false;
    }
}
