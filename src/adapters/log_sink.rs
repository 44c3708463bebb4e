//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the `log` facade.  Normal progress goes out at `info`, failures and
//! degraded actuators at `warn`.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::tally::Label;

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started => {
                info!("START | actuators acquired, tally zeroed, publisher running");
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {from} -> {to}");
            }
            AppEvent::CycleCompleted(r) => {
                let confidence = r
                    .confidence
                    .map_or_else(|| "-".to_string(), |c| format!("{c:.2}"));
                info!(
                    "CYCLE | #{} {} (conf {}) | {}={} {}={} {}={} | cmds={} failed={}{}",
                    r.cycle,
                    r.label,
                    confidence,
                    Label::Accept,
                    r.tally.count(Label::Accept),
                    Label::RejectA,
                    r.tally.count(Label::RejectA),
                    Label::Uncertain,
                    r.tally.count(Label::Uncertain),
                    r.commands,
                    r.actuation_failures,
                    if r.persisted { "" } else { " | not persisted" },
                );
            }
            AppEvent::ClassificationFailed { cycle, error } => {
                warn!("CYCLE | #{cycle} classification failed ({error}), counting as Uncertain");
            }
            AppEvent::ActuationFailed {
                cycle,
                actuator,
                target,
                error,
            } => {
                warn!("ACTUATION | #{cycle} {actuator} -> {target} failed: {error}");
            }
            AppEvent::PersistenceFailed { cycle, error } => {
                warn!("PERSIST | #{cycle} record not written: {error}");
            }
            AppEvent::HealthDegraded {
                actuator,
                consecutive_failures,
            } => {
                warn!("HEALTH | {actuator} degraded after {consecutive_failures} consecutive failures");
            }
            AppEvent::HealthRecovered { actuator } => {
                info!("HEALTH | {actuator} recovered");
            }
            AppEvent::Stopped(summary) => {
                info!(
                    "STOP | {} cycles, reason={}, degraded=0b{:02b}",
                    summary.cycles(),
                    summary
                        .stop_reason
                        .map_or_else(|| "-".to_string(), |r| r.to_string()),
                    summary.degraded_mask,
                );
            }
        }
    }
}
