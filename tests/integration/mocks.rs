//! Mock adapters for integration tests.
//!
//! Records every port call so tests can assert on the full command and
//! record history without servos, sockets, or files.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sorter::app::events::AppEvent;
use sorter::app::ports::{
    ActuationPort, Classification, ClassificationPort, EventSink, Frame, PersistedRecord,
    PersistencePort, TelemetryPort,
};
use sorter::app::service::SortingLoop;
use sorter::app::stop::StopToken;
use sorter::adapters::camera::SimCamera;
use sorter::config::{CameraConfig, SorterConfig};
use sorter::error::{ActuationError, ClassifyError, PersistenceError, TelemetryError};
use sorter::routing::{ActuatorId, Position};
use sorter::tally::Label;
use sorter::telemetry::payload::{StatusAnnouncement, TelemetrySnapshot};

// ── Actuators ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorCall {
    Acquire,
    Move(ActuatorId, Position),
    Release,
}

/// Records calls; fails the moves whose 0-based index is listed.
#[derive(Default)]
pub struct RecordingActuators {
    pub calls: Vec<ActuatorCall>,
    moves: usize,
    fail_moves: Vec<usize>,
    refuse_acquire: bool,
    stop_on_first_move: Option<StopToken>,
    /// Stop state seen at each move.
    pub stopped_at_move: Vec<bool>,
    watch: Option<StopToken>,
}

#[allow(dead_code)]
impl RecordingActuators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_moves(mut self, indices: &[usize]) -> Self {
        self.fail_moves = indices.to_vec();
        self
    }

    pub fn refusing_acquire() -> Self {
        Self {
            refuse_acquire: true,
            ..Self::default()
        }
    }

    /// Trigger `stop` from inside the first move, as a signal would.
    pub fn stop_during_first_move(&mut self, stop: StopToken) {
        self.watch = Some(stop.clone());
        self.stop_on_first_move = Some(stop);
    }

    pub fn watch(&mut self, stop: StopToken) {
        self.watch = Some(stop);
    }

    pub fn moves(&self) -> Vec<(ActuatorId, Position)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                ActuatorCall::Move(a, p) => Some((*a, *p)),
                _ => None,
            })
            .collect()
    }

    pub fn released(&self) -> bool {
        matches!(self.calls.last(), Some(ActuatorCall::Release))
    }
}

impl ActuationPort for RecordingActuators {
    fn acquire(&mut self) -> Result<(), ActuationError> {
        if self.refuse_acquire {
            return Err(ActuationError::Unavailable);
        }
        self.calls.push(ActuatorCall::Acquire);
        Ok(())
    }

    fn move_to(&mut self, actuator: ActuatorId, target: Position) -> Result<(), ActuationError> {
        let index = self.moves;
        self.moves += 1;
        self.calls.push(ActuatorCall::Move(actuator, target));
        if let Some(stop) = &self.watch {
            self.stopped_at_move.push(stop.is_triggered());
        }
        if index == 0 {
            if let Some(stop) = self.stop_on_first_move.take() {
                stop.trigger();
            }
        }
        if self.fail_moves.contains(&index) {
            return Err(ActuationError::PwmWriteFailed);
        }
        Ok(())
    }

    fn release(&mut self) {
        if matches!(self.calls.last(), Some(ActuatorCall::Release)) {
            return;
        }
        self.calls.push(ActuatorCall::Release);
    }
}

// ── Classifier ────────────────────────────────────────────────

/// Replays scripted results, then answers `Uncertain`.
pub struct MockClassifier {
    script: VecDeque<Result<Label, ClassifyError>>,
}

impl MockClassifier {
    pub fn new(script: Vec<Result<Label, ClassifyError>>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

impl ClassificationPort for MockClassifier {
    fn classify(&mut self, _frame: &Frame) -> Result<Classification, ClassifyError> {
        let label = self.script.pop_front().unwrap_or(Ok(Label::Uncertain))?;
        Ok(Classification {
            label,
            confidence: 0.9,
        })
    }
}

// ── Persistence ───────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryLog {
    pub records: Vec<PersistedRecord>,
    attempts: usize,
    fail_appends: Vec<usize>,
}

#[allow(dead_code)]
impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_appends(indices: &[usize]) -> Self {
        Self {
            fail_appends: indices.to_vec(),
            ..Self::default()
        }
    }
}

impl PersistencePort for MemoryLog {
    fn append(&mut self, record: &PersistedRecord) -> Result<(), PersistenceError> {
        let index = self.attempts;
        self.attempts += 1;
        if self.fail_appends.contains(&index) {
            return Err(PersistenceError::Io(std::io::ErrorKind::PermissionDenied));
        }
        self.records.push(record.clone());
        Ok(())
    }
}

// ── Telemetry ─────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct TelemetryLog {
    pub connects: usize,
    pub announces: Vec<StatusAnnouncement>,
    pub published: Vec<TelemetrySnapshot>,
    pub closes: usize,
}

/// Telemetry endpoint with a shared call log.
pub struct MockTelemetry {
    log: Arc<Mutex<TelemetryLog>>,
    connected: bool,
    refuse: bool,
    publish_delay: Duration,
}

#[allow(dead_code)]
impl MockTelemetry {
    pub fn new() -> (Self, Arc<Mutex<TelemetryLog>>) {
        let log = Arc::new(Mutex::new(TelemetryLog::default()));
        (
            Self {
                log: Arc::clone(&log),
                connected: false,
                refuse: false,
                publish_delay: Duration::ZERO,
            },
            log,
        )
    }

    /// Every connect attempt is refused by the broker.
    pub fn refusing() -> (Self, Arc<Mutex<TelemetryLog>>) {
        let (mut t, log) = Self::new();
        t.refuse = true;
        (t, log)
    }

    /// Every publish blocks for `delay`.
    pub fn stalling(delay: Duration) -> (Self, Arc<Mutex<TelemetryLog>>) {
        let (mut t, log) = Self::new();
        t.publish_delay = delay;
        (t, log)
    }
}

impl TelemetryPort for MockTelemetry {
    fn connect(&mut self) -> Result<(), TelemetryError> {
        self.log.lock().unwrap().connects += 1;
        if self.refuse {
            return Err(TelemetryError::Refused(5));
        }
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn announce(&mut self, status: &StatusAnnouncement) -> Result<(), TelemetryError> {
        self.log.lock().unwrap().announces.push(status.clone());
        Ok(())
    }

    fn publish(&mut self, snapshot: &TelemetrySnapshot) -> Result<(), TelemetryError> {
        if !self.publish_delay.is_zero() {
            std::thread::sleep(self.publish_delay);
        }
        self.log.lock().unwrap().published.push(*snapshot);
        Ok(())
    }

    fn close(&mut self) {
        self.connected = false;
        self.log.lock().unwrap().closes += 1;
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Builders ──────────────────────────────────────────────────

/// Config with no pacing and a tiny frame, bounded to `cycles`.
pub fn bench_config(cycles: Option<u64>) -> SorterConfig {
    let mut cfg = SorterConfig::default();
    cfg.control.cycle_interval_ms = 0;
    cfg.control.max_cycles = cycles;
    cfg.control.shutdown_grace_ms = 2000;
    cfg.camera = CameraConfig {
        width: 2,
        height: 2,
    };
    cfg
}

pub type MockLoop = SortingLoop<SimCamera, MockClassifier, RecordingActuators, MemoryLog>;

pub fn make_loop(
    cfg: &SorterConfig,
    script: Vec<Result<Label, ClassifyError>>,
    actuators: RecordingActuators,
) -> MockLoop {
    SortingLoop::new(
        cfg,
        SimCamera::new(&cfg.camera),
        MockClassifier::new(script),
        actuators,
        MemoryLog::new(),
    )
}
