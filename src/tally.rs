//! Sort counter shared between the control loop and the telemetry task.
//!
//! ```text
//!   SortingLoop ──increment──▶ ┌───────────────────────────┐
//!   (TallyWriter, one owner)   │ Mutex<CS, RefCell<Tally>> │ ◀──snapshot── TelemetryPublisher
//!                              └───────────────────────────┘ ◀──snapshot── overlays / tests
//! ```
//!
//! The tally lives behind an `embassy-sync` blocking mutex.  Every access
//! is a short closure inside the critical section, so a reader always sees
//! the counts of a completed cycle and never a half-applied increment.
//!
//! Only [`TallyWriter`] can mutate the counts and it is deliberately not
//! `Clone`: the control loop is the single writer.

use core::cell::RefCell;
use core::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Label
// ---------------------------------------------------------------------------

/// Outcome category of a single cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Label {
    /// Ripe / good object.
    Accept = 0,
    /// Unripe / bad object.
    #[serde(rename = "Reject-A")]
    RejectA = 1,
    /// Low confidence or nothing detected.
    Uncertain = 2,
}

impl Label {
    pub const COUNT: usize = 3;

    /// Every label in column order (CSV and telemetry share it).
    pub const ALL: [Label; Label::COUNT] = [Label::Accept, Label::RejectA, Label::Uncertain];

    /// External name used as CSV column and telemetry key.
    pub fn name(self) -> &'static str {
        match self {
            Self::Accept => "Accept",
            Self::RejectA => "Reject-A",
            Self::Uncertain => "Uncertain",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Tally state
// ---------------------------------------------------------------------------

struct SortTally {
    counts: [u64; Label::COUNT],
    total: u64,
    epoch: Instant,
}

impl SortTally {
    fn new() -> Self {
        Self {
            counts: [0; Label::COUNT],
            total: 0,
            epoch: Instant::now(),
        }
    }

    fn snapshot(&self) -> TallySnapshot {
        TallySnapshot {
            counts: self.counts,
            total: self.total,
            elapsed: self.epoch.elapsed(),
        }
    }
}

/// Immutable copy of the tally taken inside the critical section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TallySnapshot {
    pub counts: [u64; Label::COUNT],
    /// Sum of all counters; equals the number of completed cycles.
    pub total: u64,
    /// Time since the loop started (the `working_time` metric).
    pub elapsed: Duration,
}

impl TallySnapshot {
    pub fn count(&self, label: Label) -> u64 {
        self.counts[label as usize]
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed.as_secs()
    }
}

type Shared = Mutex<CriticalSectionRawMutex, RefCell<SortTally>>;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// The single mutating handle.  Owned by the control loop.
pub struct TallyWriter {
    shared: Arc<Shared>,
}

/// Cloneable read-only handle for the publisher and display overlays.
#[derive(Clone)]
pub struct TallyReader {
    shared: Arc<Shared>,
}

/// Create a zeroed tally and return its writer.
pub fn new_tally() -> TallyWriter {
    TallyWriter {
        shared: Arc::new(Mutex::new(RefCell::new(SortTally::new()))),
    }
}

impl TallyWriter {
    /// Count one completed cycle and return the resulting state.
    pub fn increment(&mut self, label: Label) -> TallySnapshot {
        self.shared.lock(|cell| {
            let mut tally = cell.borrow_mut();
            tally.counts[label as usize] = tally.counts[label as usize].saturating_add(1);
            tally.total = tally.total.saturating_add(1);
            tally.snapshot()
        })
    }

    /// Zero every counter and restart the uptime clock.  Called on `Starting`.
    pub fn reset(&mut self) {
        self.shared.lock(|cell| *cell.borrow_mut() = SortTally::new());
    }

    pub fn snapshot(&self) -> TallySnapshot {
        self.shared.lock(|cell| cell.borrow().snapshot())
    }

    pub fn reader(&self) -> TallyReader {
        TallyReader {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl TallyReader {
    pub fn snapshot(&self) -> TallySnapshot {
        self.shared.lock(|cell| cell.borrow().snapshot())
    }
}
