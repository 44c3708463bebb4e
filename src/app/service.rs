//! Application service — the hexagonal core.
//!
//! [`SortingLoop`] owns the lifecycle FSM, the decision table, the health
//! supervisor, and the single tally writer.  All I/O flows through port
//! traits, so the whole loop runs against mock adapters in tests.
//!
//! ```text
//!   CameraPort ──▶ ┌──────────────────────────────┐ ──▶ ActuationPort
//! ClassifyPort ──▶ │          SortingLoop          │ ──▶ PersistencePort
//!                  │ FSM · DecisionTable · Health  │ ──▶ EventSink
//!                  └──────────────┬───────────────┘
//!                        TallyReader │ StopToken
//!                                    ▼
//!                      telemetry thread ──▶ TelemetryPort
//! ```
//!
//! One cycle is: capture → classify → lookup → move route → move sort →
//! increment → append → report.  The stop token is only consulted between
//! cycles, so a cycle in flight always finishes its commands and its count.

use std::time::{Duration, Instant};

use chrono::Local;
use log::{debug, info, warn};

use crate::config::SorterConfig;
use crate::diagnostics::{LoopCounters, PublisherCounters, RunSummary};
use crate::error::{ClassifyError, StartupError};
use crate::fsm::context::{LoopContext, RunLimits};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, LoopState};
use crate::health::{HealthChange, HealthSupervisor};
use crate::routing::DecisionTable;
use crate::tally::{Label, TallyReader, TallyWriter, new_tally};
use crate::telemetry::payload::StatusAnnouncement;
use crate::telemetry::publisher::{self, PublisherConfig, PublisherHandle};

use super::events::{AppEvent, CycleReport};
use super::ports::{
    ActuationPort, CameraPort, ClassificationPort, Classification, EventSink, PersistedRecord,
    PersistencePort, TelemetryPort,
};
use super::stop::StopToken;

// ───────────────────────────────────────────────────────────────
// Settings
// ───────────────────────────────────────────────────────────────

/// Timing knobs derived from [`SorterConfig`].
#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Pause between cycles.
    pub cycle_interval: Duration,
    pub limits: RunLimits,
    /// How long `Draining` waits for the publisher.
    pub shutdown_grace: Duration,
    pub publisher: PublisherConfig,
}

impl LoopSettings {
    pub fn from_config(cfg: &SorterConfig) -> Self {
        Self {
            cycle_interval: Duration::from_millis(cfg.control.cycle_interval_ms),
            limits: RunLimits {
                max_cycles: cfg.control.max_cycles,
                max_duration: cfg.control.max_duration_secs.map(Duration::from_secs),
            },
            shutdown_grace: Duration::from_millis(cfg.control.shutdown_grace_ms),
            publisher: PublisherConfig {
                interval: Duration::from_secs(cfg.telemetry.interval_secs),
                announcement: StatusAnnouncement::running(cfg.device_name.clone()),
            },
        }
    }
}

// ───────────────────────────────────────────────────────────────
// SortingLoop
// ───────────────────────────────────────────────────────────────

pub struct SortingLoop<C, K, A, P>
where
    C: CameraPort,
    K: ClassificationPort,
    A: ActuationPort,
    P: PersistencePort,
{
    camera: C,
    classifier: K,
    actuators: A,
    persistence: P,
    settings: LoopSettings,
    table: DecisionTable,
    health: HealthSupervisor,
    tally: TallyWriter,
    stop: StopToken,
    counters: LoopCounters,
    cycles: u64,
}

impl<C, K, A, P> SortingLoop<C, K, A, P>
where
    C: CameraPort,
    K: ClassificationPort,
    A: ActuationPort,
    P: PersistencePort,
{
    /// Build the loop.  Nothing is acquired until [`run`](Self::run).
    pub fn new(cfg: &SorterConfig, camera: C, classifier: K, actuators: A, persistence: P) -> Self {
        Self {
            camera,
            classifier,
            actuators,
            persistence,
            settings: LoopSettings::from_config(cfg),
            table: DecisionTable::from_config(&cfg.routing),
            health: HealthSupervisor::new(&cfg.health),
            tally: new_tally(),
            stop: StopToken::new(),
            counters: LoopCounters::default(),
            cycles: 0,
        }
    }

    // ── Hooks ─────────────────────────────────────────────────

    /// Read-only tally handle for overlays and other observers.
    pub fn tally_reader(&self) -> TallyReader {
        self.tally.reader()
    }

    /// Cloneable stop handle, e.g. for a signal handler.
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    pub fn settings_mut(&mut self) -> &mut LoopSettings {
        &mut self.settings
    }

    pub fn actuators(&self) -> &A {
        &self.actuators
    }

    pub fn actuators_mut(&mut self) -> &mut A {
        &mut self.actuators
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    pub fn health(&self) -> &HealthSupervisor {
        &self.health
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Drive the loop from `Starting` to `Stopped`.
    ///
    /// Only a startup failure is returned as an error; every per-cycle
    /// failure is absorbed, counted, and reported through `sink`.
    pub fn run<T, S>(&mut self, telemetry: T, sink: &mut S) -> Result<RunSummary, StartupError>
    where
        T: TelemetryPort + 'static,
        S: EventSink + ?Sized,
    {
        let started = Instant::now();
        let mut ctx = LoopContext::new(self.settings.limits);
        let mut fsm = Fsm::new(build_state_table(), LoopState::Starting);
        fsm.start(&mut ctx);

        let mut handle = self.start_up(telemetry)?;
        sink.emit(&AppEvent::Started);
        ctx.startup_complete = true;

        let mut publisher_joined = false;
        let mut publisher_counters = PublisherCounters::default();

        loop {
            self.observe(&mut ctx, started);
            let prev = fsm.current_state();
            fsm.tick(&mut ctx);
            let state = fsm.current_state();
            if state != prev {
                sink.emit(&AppEvent::StateChanged {
                    from: prev,
                    to: state,
                });
            }

            match state {
                LoopState::Starting => {}
                LoopState::Running => {
                    self.run_cycle(sink);
                    self.observe(&mut ctx, started);
                    if ctx.stop_condition().is_none() {
                        let pause = ctx
                            .remaining_duration()
                            .map_or(self.settings.cycle_interval, |left| {
                                left.min(self.settings.cycle_interval)
                            });
                        self.stop.pause(pause);
                    }
                }
                LoopState::Draining => {
                    self.stop.trigger();
                    publisher_joined = handle.shutdown(self.settings.shutdown_grace);
                    publisher_counters = handle.counters();
                    self.actuators.release();
                    ctx.drained = true;
                }
                LoopState::Stopped => break,
            }
        }

        let summary = RunSummary {
            tally: self.tally.snapshot(),
            loop_counters: self.counters,
            publisher: publisher_counters,
            stop_reason: ctx.stop_reason,
            publisher_joined,
            degraded_mask: self.health.faults(),
        };
        info!(
            "APP | stopped after {} cycles in {}s",
            summary.cycles(),
            summary.uptime().as_secs()
        );
        sink.emit(&AppEvent::Stopped(summary));
        Ok(summary)
    }

    /// `Starting`: acquire actuators, zero the tally, spawn the publisher.
    fn start_up<T>(&mut self, telemetry: T) -> Result<PublisherHandle, StartupError>
    where
        T: TelemetryPort + 'static,
    {
        self.actuators.acquire().map_err(|e| {
            warn!("APP | actuators unavailable: {e}");
            StartupError::ActuatorUnavailable(e)
        })?;

        self.tally.reset();
        self.cycles = 0;
        self.counters = LoopCounters::default();

        match publisher::spawn(
            telemetry,
            self.tally.reader(),
            self.stop.clone(),
            self.settings.publisher.clone(),
        ) {
            Ok(handle) => {
                info!("APP | started");
                Ok(handle)
            }
            Err(e) => {
                warn!("APP | telemetry thread spawn failed: {e}");
                self.actuators.release();
                Err(StartupError::PublisherSpawn(e.kind()))
            }
        }
    }

    /// Copy observed progress into the FSM blackboard.
    fn observe(&self, ctx: &mut LoopContext, started: Instant) {
        ctx.elapsed = started.elapsed();
        ctx.stop_requested = self.stop.is_triggered();
        ctx.cycles_completed = self.cycles;
    }

    // ── One cycle ─────────────────────────────────────────────

    fn classify(&mut self) -> Result<Classification, ClassifyError> {
        let frame = self.camera.capture()?;
        self.classifier.classify(&frame)
    }

    /// Run one full cycle.  Always counts exactly one label.
    pub(crate) fn run_cycle<S: EventSink + ?Sized>(&mut self, sink: &mut S) -> CycleReport {
        let cycle = self.cycles + 1;

        // 1. Classification, failing safe to Uncertain
        let (label, confidence) = match self.classify() {
            Ok(c) => (c.label, Some(c.confidence)),
            Err(error) => {
                self.counters.classification_fallbacks += 1;
                sink.emit(&AppEvent::ClassificationFailed { cycle, error });
                (Label::Uncertain, None)
            }
        };

        // 2. Commands, route first then sort
        let commands = self.table.lookup(label).commands.clone();
        let mut failures = 0u8;
        for cmd in &commands {
            let result = self.actuators.move_to(cmd.actuator, cmd.target);
            if let Err(error) = result {
                failures += 1;
                self.counters.actuation_failures += 1;
                sink.emit(&AppEvent::ActuationFailed {
                    cycle,
                    actuator: cmd.actuator,
                    target: cmd.target,
                    error,
                });
            }
            match self.health.record(cmd.actuator, result.is_ok()) {
                Some(HealthChange::Degraded {
                    actuator,
                    consecutive_failures,
                }) => sink.emit(&AppEvent::HealthDegraded {
                    actuator,
                    consecutive_failures,
                }),
                Some(HealthChange::Recovered { actuator }) => {
                    sink.emit(&AppEvent::HealthRecovered { actuator })
                }
                None => {}
            }
        }

        // 3. Count, after every command was issued
        let tally = self.tally.increment(label);
        self.cycles = cycle;

        // 4. Persist, at most once
        let record = PersistedRecord {
            timestamp: Local::now(),
            tally,
        };
        let persisted = match self.persistence.append(&record) {
            Ok(()) => true,
            Err(error) => {
                self.counters.persistence_failures += 1;
                sink.emit(&AppEvent::PersistenceFailed { cycle, error });
                false
            }
        };

        let report = CycleReport {
            cycle,
            label,
            confidence,
            commands: commands.len() as u8,
            actuation_failures: failures,
            persisted,
            tally,
        };
        debug!("APP | cycle {cycle} done: {label}");
        sink.emit(&AppEvent::CycleCompleted(report));
        report
    }
}

impl<C, K, A, P> Drop for SortingLoop<C, K, A, P>
where
    C: CameraPort,
    K: ClassificationPort,
    A: ActuationPort,
    P: PersistencePort,
{
    fn drop(&mut self) {
        self.actuators.release();
    }
}
