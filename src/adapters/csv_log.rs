//! Append-only CSV log of tally snapshots.
//!
//! ```text
//! Timestamp,Accept,Reject-A,Uncertain
//! 2025-03-14 09:26:53 Friday,1,0,0
//! 2025-03-14 09:26:54 Friday,1,1,0
//! ```
//!
//! The header is written once, when the file is new or empty.  Each record
//! goes out as a single `write_all` of the full row followed by a
//! best-effort `sync_data`; a failed write is reported and the handle
//! dropped so the next append reopens the file.  A failed sync is only
//! logged, since the row already reached the OS.

use core::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::app::ports::{PersistedRecord, PersistencePort};
use crate::error::PersistenceError;
use crate::tally::Label;

/// Local time with weekday name.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %A";

pub struct CsvLog {
    path: PathBuf,
    file: Option<File>,
}

impl CsvLog {
    /// Nothing is opened until the first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&mut self) -> Result<&mut File, PersistenceError> {
        if self.file.is_none() {
            if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            if file.metadata()?.len() == 0 {
                file.write_all(header().as_bytes())?;
                info!("PERSIST | created {}", self.path.display());
            }
            self.file = Some(file);
        }
        self.file.as_mut().ok_or(PersistenceError::Io(std::io::ErrorKind::NotFound))
    }
}

pub fn header() -> String {
    let mut h = String::from("Timestamp");
    for label in Label::ALL {
        h.push(',');
        h.push_str(label.name());
    }
    h.push('\n');
    h
}

pub fn format_row(record: &PersistedRecord) -> Result<String, PersistenceError> {
    let mut row = String::with_capacity(64);
    write!(row, "{}", record.timestamp.format(TIMESTAMP_FORMAT))?;
    for label in Label::ALL {
        write!(row, ",{}", record.tally.count(label))?;
    }
    row.push('\n');
    Ok(row)
}

impl PersistencePort for CsvLog {
    fn append(&mut self, record: &PersistedRecord) -> Result<(), PersistenceError> {
        let row = format_row(record)?;
        let file = self.open()?;
        if let Err(e) = file.write_all(row.as_bytes()) {
            self.file = None;
            return Err(e.into());
        }
        if let Err(e) = file.sync_data() {
            warn!("PERSIST | sync of {} failed: {e}", self.path.display());
        }
        Ok(())
    }
}
