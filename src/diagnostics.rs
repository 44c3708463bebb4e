//! Run diagnostics.
//!
//! Failure counters accumulated by the control loop and the final
//! [`RunSummary`] printed on shutdown.

use core::fmt;
use std::time::Duration;

use crate::fsm::context::StopReason;
use crate::tally::{Label, TallySnapshot};

/// Failure counters kept by the control loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopCounters {
    /// Cycles whose label fell back to `Uncertain` because capture or
    /// classification failed.
    pub classification_fallbacks: u64,
    /// Individual actuation commands that failed.
    pub actuation_failures: u64,
    /// Records that could not be appended.
    pub persistence_failures: u64,
}

/// Delivery counters kept by the telemetry task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherCounters {
    /// Ticks on which a publish was attempted.
    pub attempts: u64,
    pub delivered: u64,
    pub failures: u64,
}

/// Final report of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub tally: TallySnapshot,
    pub loop_counters: LoopCounters,
    pub publisher: PublisherCounters,
    pub stop_reason: Option<StopReason>,
    /// False when the telemetry task outlived the shutdown grace period.
    pub publisher_joined: bool,
    /// Actuator health fault mask at shutdown.
    pub degraded_mask: u8,
}

impl RunSummary {
    pub fn cycles(&self) -> u64 {
        self.tally.total
    }

    pub fn uptime(&self) -> Duration {
        self.tally.elapsed
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run summary")?;
        writeln!(f, "  cycles:       {}", self.cycles())?;
        for label in Label::ALL {
            writeln!(f, "  {:<13} {}", format!("{label}:"), self.tally.count(label))?;
        }
        writeln!(f, "  uptime:       {}s", self.uptime().as_secs())?;
        writeln!(
            f,
            "  stop reason:  {}",
            self.stop_reason
                .map_or_else(|| "-".to_string(), |r| r.to_string())
        )?;
        writeln!(
            f,
            "  failures:     classify={} actuation={} persistence={}",
            self.loop_counters.classification_fallbacks,
            self.loop_counters.actuation_failures,
            self.loop_counters.persistence_failures
        )?;
        write!(
            f,
            "  telemetry:    attempts={} delivered={} failed={}{}",
            self.publisher.attempts,
            self.publisher.delivered,
            self.publisher.failures,
            if self.publisher_joined {
                ""
            } else {
                " (task abandoned)"
            }
        )
    }
}
