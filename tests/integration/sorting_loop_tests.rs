//! Integration tests for the SortingLoop → decision table → actuators →
//! tally → persistence pipeline, against mock ports.

use std::time::{Duration, Instant};

use crate::mocks::{
    ActuatorCall, MemoryLog, MockClassifier, MockTelemetry, RecordingActuators, RecordingSink,
    bench_config, make_loop,
};

use sorter::adapters::camera::SimCamera;
use sorter::adapters::csv_log::CsvLog;
use sorter::app::events::AppEvent;
use sorter::app::service::SortingLoop;
use sorter::error::{ActuationError, ClassifyError, StartupError};
use sorter::fsm::LoopState;
use sorter::fsm::context::StopReason;
use sorter::routing::{ActuatorId, Position};
use sorter::tally::Label;

// ── Scenario 1: one of each ──────────────────────────────────

#[test]
fn one_of_each_label_counts_and_persists_each_cycle() {
    let cfg = bench_config(Some(3));
    let mut sorter = make_loop(
        &cfg,
        vec![Ok(Label::Accept), Ok(Label::RejectA), Ok(Label::Uncertain)],
        RecordingActuators::new(),
    );
    let (telemetry, _log) = MockTelemetry::new();
    let mut sink = RecordingSink::new();

    let summary = sorter.run(telemetry, &mut sink).unwrap();

    assert_eq!(summary.tally.counts, [1, 1, 1]);
    assert_eq!(summary.stop_reason, Some(StopReason::MaxCycles));

    let records = &sorter.persistence().records;
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].tally.counts, [1, 0, 0]);
    assert_eq!(records[1].tally.counts, [1, 1, 0]);
    assert_eq!(records[2].tally.counts, [1, 1, 1]);
    for (i, r) in records.iter().enumerate() {
        assert_eq!(r.tally.total, i as u64 + 1);
    }
}

#[test]
fn commands_follow_decision_table_route_first() {
    let cfg = bench_config(Some(3));
    let r = cfg.routing;
    let mut sorter = make_loop(
        &cfg,
        vec![Ok(Label::Accept), Ok(Label::RejectA), Ok(Label::Uncertain)],
        RecordingActuators::new(),
    );
    let (telemetry, _log) = MockTelemetry::new();
    sorter.run(telemetry, &mut RecordingSink::new()).unwrap();

    assert_eq!(
        sorter.actuators().moves(),
        vec![
            (ActuatorId::Route, Position(r.route_accept_deg)),
            (ActuatorId::Sort, Position(r.sort_accept_deg)),
            (ActuatorId::Route, Position(r.route_eject_deg)),
            (ActuatorId::Sort, Position(r.sort_reject_deg)),
            (ActuatorId::Route, Position(r.route_eject_deg)),
        ]
    );
}

#[test]
fn csv_rows_match_running_tally() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counts.csv");
    let cfg = bench_config(Some(3));
    let mut sorter = SortingLoop::new(
        &cfg,
        SimCamera::new(&cfg.camera),
        MockClassifier::new(vec![Ok(Label::Accept), Ok(Label::RejectA), Ok(Label::Uncertain)]),
        RecordingActuators::new(),
        CsvLog::new(&path),
    );
    let (telemetry, _log) = MockTelemetry::new();
    sorter.run(telemetry, &mut RecordingSink::new()).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines[0], "Timestamp,Accept,Reject-A,Uncertain");
    assert_eq!(lines.len(), 4);
    assert!(lines[1].ends_with(",1,0,0"));
    assert!(lines[2].ends_with(",1,1,0"));
    assert!(lines[3].ends_with(",1,1,1"));
}

// ── Scenario 2: classification timeout ───────────────────────

#[test]
fn classification_timeout_counts_as_uncertain() {
    let cfg = bench_config(Some(3));
    let mut sorter = make_loop(
        &cfg,
        vec![
            Ok(Label::Accept),
            Err(ClassifyError::Timeout),
            Ok(Label::Accept),
        ],
        RecordingActuators::new(),
    );
    let (telemetry, _log) = MockTelemetry::new();
    let mut sink = RecordingSink::new();
    let summary = sorter.run(telemetry, &mut sink).unwrap();

    assert_eq!(summary.tally.count(Label::Uncertain), 1);
    assert_eq!(summary.tally.count(Label::Accept), 2);
    assert_eq!(summary.cycles(), 3);
    assert_eq!(summary.loop_counters.classification_fallbacks, 1);

    let cycle2 = sink.events.iter().find_map(|e| match e {
        AppEvent::CycleCompleted(r) if r.cycle == 2 => Some(*r),
        _ => None,
    });
    let cycle2 = cycle2.unwrap();
    assert_eq!(cycle2.label, Label::Uncertain);
    assert_eq!(cycle2.confidence, None);
    assert_eq!(
        sink.count(|e| matches!(
            e,
            AppEvent::ClassificationFailed {
                cycle: 2,
                error: ClassifyError::Timeout
            }
        )),
        1
    );
}

#[test]
fn capture_failure_counts_as_uncertain() {
    let cfg = bench_config(Some(2));
    let mut sorter = SortingLoop::new(
        &cfg,
        SimCamera::new(&cfg.camera).with_frame_limit(1),
        MockClassifier::new(vec![Ok(Label::Accept), Ok(Label::Accept)]),
        RecordingActuators::new(),
        MemoryLog::new(),
    );
    let (telemetry, _log) = MockTelemetry::new();
    let mut sink = RecordingSink::new();
    let summary = sorter.run(telemetry, &mut sink).unwrap();

    assert_eq!(summary.tally.counts, [1, 0, 1]);
    assert_eq!(
        sink.count(|e| matches!(
            e,
            AppEvent::ClassificationFailed {
                error: ClassifyError::NoFrame,
                ..
            }
        )),
        1
    );
}

// ── Scenario 3: actuation failure ────────────────────────────

#[test]
fn route_failure_still_counts_and_loop_continues() {
    let cfg = bench_config(Some(3));
    let mut sorter = make_loop(
        &cfg,
        vec![Ok(Label::Accept), Ok(Label::Accept), Ok(Label::RejectA)],
        // Move 0 is the route command of cycle 1.
        RecordingActuators::new().failing_moves(&[0]),
    );
    let (telemetry, _log) = MockTelemetry::new();
    let mut sink = RecordingSink::new();
    let summary = sorter.run(telemetry, &mut sink).unwrap();

    assert_eq!(summary.tally.counts, [2, 1, 0]);
    assert_eq!(summary.loop_counters.actuation_failures, 1);
    assert_eq!(
        sink.count(|e| matches!(
            e,
            AppEvent::ActuationFailed {
                cycle: 1,
                actuator: ActuatorId::Route,
                error: ActuationError::PwmWriteFailed,
                ..
            }
        )),
        1
    );
    // The sort command of the failing cycle was still issued.
    assert_eq!(sorter.actuators().moves().len(), 6);
    assert_eq!(sorter.persistence().records.len(), 3);
}

#[test]
fn repeated_failures_degrade_then_recover() {
    let mut cfg = bench_config(Some(4));
    cfg.health.failure_threshold = 2;
    // Every cycle is Uncertain: one route move each.  Moves 0 and 1 fail.
    let mut sorter = make_loop(
        &cfg,
        vec![
            Ok(Label::Uncertain),
            Ok(Label::Uncertain),
            Ok(Label::Uncertain),
            Ok(Label::Uncertain),
        ],
        RecordingActuators::new().failing_moves(&[0, 1]),
    );
    let (telemetry, _log) = MockTelemetry::new();
    let mut sink = RecordingSink::new();
    let summary = sorter.run(telemetry, &mut sink).unwrap();

    assert_eq!(
        sink.count(|e| matches!(
            e,
            AppEvent::HealthDegraded {
                actuator: ActuatorId::Route,
                consecutive_failures: 2
            }
        )),
        1
    );
    assert_eq!(
        sink.count(|e| matches!(
            e,
            AppEvent::HealthRecovered {
                actuator: ActuatorId::Route
            }
        )),
        1
    );
    assert_eq!(summary.degraded_mask, 0);
    assert_eq!(summary.cycles(), 4);
}

#[test]
fn persistence_failure_is_absorbed() {
    let cfg = bench_config(Some(3));
    let mut sorter = SortingLoop::new(
        &cfg,
        SimCamera::new(&cfg.camera),
        MockClassifier::new(vec![Ok(Label::Accept); 3]),
        RecordingActuators::new(),
        MemoryLog::failing_appends(&[1]),
    );
    let (telemetry, _log) = MockTelemetry::new();
    let mut sink = RecordingSink::new();
    let summary = sorter.run(telemetry, &mut sink).unwrap();

    assert_eq!(summary.cycles(), 3);
    assert_eq!(summary.loop_counters.persistence_failures, 1);
    assert_eq!(sorter.persistence().records.len(), 2);
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::PersistenceFailed { cycle: 2, .. })),
        1
    );
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::CycleCompleted(r) if !r.persisted)),
        1
    );
}

// ── Scenario 5: stop mid-cycle ───────────────────────────────

#[test]
fn stop_during_cycle_finishes_that_cycle_only() {
    let cfg = bench_config(None);
    let mut sorter = make_loop(&cfg, vec![Ok(Label::Accept); 10], RecordingActuators::new());
    let stop = sorter.stop_token();
    sorter.actuators_mut().stop_during_first_move(stop);

    let (telemetry, _log) = MockTelemetry::new();
    let mut sink = RecordingSink::new();
    let summary = sorter.run(telemetry, &mut sink).unwrap();

    // Both commands of cycle 1 went out and the cycle was counted.
    assert_eq!(summary.cycles(), 1);
    assert_eq!(summary.tally.count(Label::Accept), 1);
    assert_eq!(summary.stop_reason, Some(StopReason::Interrupted));
    assert_eq!(
        sorter.actuators().calls,
        vec![
            ActuatorCall::Acquire,
            ActuatorCall::Move(ActuatorId::Route, Position(cfg.routing.route_accept_deg)),
            ActuatorCall::Move(ActuatorId::Sort, Position(cfg.routing.sort_accept_deg)),
            ActuatorCall::Release,
        ]
    );
    assert_eq!(sorter.persistence().records.len(), 1);
}

// ── Shutdown ─────────────────────────────────────────────────

#[test]
fn stop_before_start_issues_no_commands() {
    let cfg = bench_config(None);
    let mut sorter = make_loop(&cfg, vec![Ok(Label::Accept)], RecordingActuators::new());
    sorter.stop_token().trigger();

    let (telemetry, _log) = MockTelemetry::new();
    let mut sink = RecordingSink::new();
    let summary = sorter.run(telemetry, &mut sink).unwrap();

    assert_eq!(summary.cycles(), 0);
    assert!(sorter.actuators().moves().is_empty());
    assert!(sorter.actuators().released());
    assert_eq!(
        sink.count(|e| matches!(
            e,
            AppEvent::StateChanged {
                from: LoopState::Starting,
                to: LoopState::Draining
            }
        )),
        1
    );
}

#[test]
fn external_stop_ends_unbounded_run() {
    let mut cfg = bench_config(None);
    cfg.control.cycle_interval_ms = 10;
    let mut sorter = make_loop(&cfg, vec![], RecordingActuators::new());
    let stop = sorter.stop_token();
    sorter.actuators_mut().watch(stop.clone());

    let trigger = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        stop.trigger();
    });

    let (telemetry, _log) = MockTelemetry::new();
    let summary = sorter.run(telemetry, &mut RecordingSink::new()).unwrap();
    trigger.join().unwrap();

    assert!(summary.cycles() >= 1);
    assert_eq!(summary.stop_reason, Some(StopReason::Interrupted));
    assert!(sorter.actuators().released());
    // Every move began before the stop was seen, except possibly the one
    // in flight when it arrived; none follow the release.
    let after_stop = sorter
        .actuators()
        .stopped_at_move
        .iter()
        .filter(|s| **s)
        .count();
    assert!(after_stop <= 1);
}

#[test]
fn lifecycle_visits_every_state_in_order() {
    let cfg = bench_config(Some(1));
    let mut sorter = make_loop(&cfg, vec![Ok(Label::RejectA)], RecordingActuators::new());
    let (telemetry, _log) = MockTelemetry::new();
    let mut sink = RecordingSink::new();
    sorter.run(telemetry, &mut sink).unwrap();

    let transitions: Vec<_> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::StateChanged { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            (LoopState::Starting, LoopState::Running),
            (LoopState::Running, LoopState::Draining),
            (LoopState::Draining, LoopState::Stopped),
        ]
    );
}

#[test]
fn duration_limit_stops_the_loop() {
    let mut cfg = bench_config(None);
    cfg.control.cycle_interval_ms = 20;
    let mut sorter = make_loop(&cfg, vec![], RecordingActuators::new());
    sorter.settings_mut().limits.max_duration = Some(Duration::from_millis(150));

    let (telemetry, _log) = MockTelemetry::new();
    let start = Instant::now();
    let summary = sorter.run(telemetry, &mut RecordingSink::new()).unwrap();

    assert_eq!(summary.stop_reason, Some(StopReason::MaxDuration));
    assert!(summary.cycles() >= 1);
    assert!(start.elapsed() < Duration::from_secs(3));
}

// ── Startup ──────────────────────────────────────────────────

#[test]
fn unavailable_actuators_fail_startup() {
    let cfg = bench_config(Some(3));
    let mut sorter = make_loop(&cfg, vec![], RecordingActuators::refusing_acquire());
    let (telemetry, log) = MockTelemetry::new();
    let mut sink = RecordingSink::new();

    let result = sorter.run(telemetry, &mut sink);

    assert_eq!(
        result.err(),
        Some(StartupError::ActuatorUnavailable(ActuationError::Unavailable))
    );
    assert!(sink.events.is_empty());
    assert!(sorter.persistence().records.is_empty());
    assert_eq!(log.lock().unwrap().connects, 0);
}
