//! Actuator health supervisor.
//!
//! The control loop reports the outcome of every actuation command.  The
//! supervisor keeps a consecutive-failure counter per actuator and a
//! latched fault bitmask (see [`ActuatorId::mask`]).
//!
//! ## Fault lifecycle
//!
//! 1. A command fails; the actuator's counter increments.
//! 2. When the counter reaches the threshold the bit is SET and
//!    [`HealthChange::Degraded`] is returned once.
//! 3. The next successful command on that actuator resets the counter,
//!    CLEARS the bit, and returns [`HealthChange::Recovered`] once.
//!
//! Degraded health never stops the loop; it is an operator signal.  The
//! supervisor itself is silent: the caller turns each change into an
//! [`AppEvent`](crate::app::events::AppEvent) and the event sink logs it.

use crate::config::HealthConfig;
use crate::routing::ActuatorId;

/// A transition of one actuator's health bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthChange {
    Degraded {
        actuator: ActuatorId,
        consecutive_failures: u32,
    },
    Recovered {
        actuator: ActuatorId,
    },
}

pub struct HealthSupervisor {
    threshold: u32,
    consecutive: [u32; ActuatorId::COUNT],
    /// Latched fault bitmask.
    faults: u8,
}

impl HealthSupervisor {
    pub fn new(config: &HealthConfig) -> Self {
        Self {
            threshold: config.failure_threshold.max(1),
            consecutive: [0; ActuatorId::COUNT],
            faults: 0,
        }
    }

    /// Record the outcome of one command.  Returns a change only when the
    /// actuator's fault bit flips.
    pub fn record(&mut self, actuator: ActuatorId, ok: bool) -> Option<HealthChange> {
        let slot = &mut self.consecutive[actuator as usize];
        if ok {
            *slot = 0;
        } else {
            *slot = slot.saturating_add(1);
        }
        let failures = *slot;
        self.eval_fault(actuator, failures >= self.threshold, failures)
    }

    /// Current fault bitmask.
    pub fn faults(&self) -> u8 {
        self.faults
    }

    /// True if **any** actuator is degraded.
    pub fn has_faults(&self) -> bool {
        self.faults != 0
    }

    pub fn is_degraded(&self, actuator: ActuatorId) -> bool {
        self.faults & actuator.mask() != 0
    }

    pub fn consecutive_failures(&self, actuator: ActuatorId) -> u32 {
        self.consecutive[actuator as usize]
    }

    // ── Internal ──────────────────────────────────────────────────

    fn eval_fault(
        &mut self,
        actuator: ActuatorId,
        condition: bool,
        failures: u32,
    ) -> Option<HealthChange> {
        let latched = self.faults & actuator.mask() != 0;
        if condition {
            self.faults |= actuator.mask();
            if !latched {
                return Some(HealthChange::Degraded {
                    actuator,
                    consecutive_failures: failures,
                });
            }
        } else {
            self.faults &= !actuator.mask();
            if latched {
                return Some(HealthChange::Recovered { actuator });
            }
        }
        None
    }
}
