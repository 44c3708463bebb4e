//! Shared mutable context threaded through every FSM handler.
//!
//! `LoopContext` is the blackboard the lifecycle handlers read from and
//! write to.  The [`SortingLoop`](crate::app::service::SortingLoop) refreshes
//! the observed fields (stop flag, cycle count, elapsed time, completion
//! flags) before every tick.

use core::fmt;
use std::time::Duration;

/// Configured run limits.  `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunLimits {
    pub max_cycles: Option<u64>,
    pub max_duration: Option<Duration>,
}

/// Why the loop left `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Operator interrupt or an external `StopToken::trigger`.
    Interrupted,
    MaxCycles,
    MaxDuration,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted => write!(f, "interrupted"),
            Self::MaxCycles => write!(f, "max cycles reached"),
            Self::MaxDuration => write!(f, "max duration reached"),
        }
    }
}

pub struct LoopContext {
    /// Time since the loop entered `Starting`.
    pub elapsed: Duration,

    // -- Limits --
    pub limits: RunLimits,

    // -- Observed progress (written by the service) --
    /// Actuators acquired, tally zeroed, publisher spawned.
    pub startup_complete: bool,
    /// The stop token has been triggered.
    pub stop_requested: bool,
    pub cycles_completed: u64,
    /// Publisher joined (or grace elapsed) and actuators released.
    pub drained: bool,

    // -- Outcome (written by handlers) --
    pub stop_reason: Option<StopReason>,
}

impl LoopContext {
    pub fn new(limits: RunLimits) -> Self {
        Self {
            elapsed: Duration::ZERO,
            limits,
            startup_complete: false,
            stop_requested: false,
            cycles_completed: 0,
            drained: false,
            stop_reason: None,
        }
    }

    /// First stop condition that currently holds, if any.  An operator
    /// interrupt takes precedence over the configured limits.
    pub fn stop_condition(&self) -> Option<StopReason> {
        if self.stop_requested {
            return Some(StopReason::Interrupted);
        }
        if self
            .limits
            .max_cycles
            .is_some_and(|max| self.cycles_completed >= max)
        {
            return Some(StopReason::MaxCycles);
        }
        if self
            .limits
            .max_duration
            .is_some_and(|max| self.elapsed >= max)
        {
            return Some(StopReason::MaxDuration);
        }
        None
    }

    /// Time left before `max_duration`, if bounded.
    pub fn remaining_duration(&self) -> Option<Duration> {
        self.limits
            .max_duration
            .map(|max| max.saturating_sub(self.elapsed))
    }
}
