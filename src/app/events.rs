//! Outbound application events.
//!
//! The [`SortingLoop`](super::service::SortingLoop) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other side
//! decide what to do with them (console log, test recorder, ...).

use crate::diagnostics::RunSummary;
use crate::error::{ActuationError, ClassifyError, PersistenceError};
use crate::fsm::LoopState;
use crate::routing::{ActuatorId, Position};
use crate::tally::{Label, TallySnapshot};

/// Structured events emitted by the control loop.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Actuators acquired, tally zeroed, publisher running.
    Started,

    /// The lifecycle FSM transitioned between states.
    StateChanged { from: LoopState, to: LoopState },

    /// One cycle finished: commands issued, tally incremented, record appended.
    CycleCompleted(CycleReport),

    /// Capture or classification failed; the cycle falls back to `Uncertain`.
    ClassificationFailed { cycle: u64, error: ClassifyError },

    /// One actuation command failed.  The cycle is still counted.
    ActuationFailed {
        cycle: u64,
        actuator: ActuatorId,
        target: Position,
        error: ActuationError,
    },

    /// The record for this cycle was not written.
    PersistenceFailed { cycle: u64, error: PersistenceError },

    /// An actuator crossed the consecutive-failure threshold.
    HealthDegraded {
        actuator: ActuatorId,
        consecutive_failures: u32,
    },

    /// A degraded actuator succeeded again.
    HealthRecovered { actuator: ActuatorId },

    /// The loop reached `Stopped`.
    Stopped(RunSummary),
}

/// Per-cycle outcome, emitted once the cycle is fully accounted for.
#[derive(Debug, Clone, Copy)]
pub struct CycleReport {
    /// 1-based cycle number.
    pub cycle: u64,
    pub label: Label,
    /// Classifier confidence; `None` when the label is a fallback.
    pub confidence: Option<f32>,
    /// Commands issued this cycle.
    pub commands: u8,
    /// Commands that failed this cycle.
    pub actuation_failures: u8,
    /// Whether the record was appended.
    pub persisted: bool,
    /// Tally right after the increment.
    pub tally: TallySnapshot,
}
