//! Hardware adapter — bridges the two servos to the [`ActuationPort`].
//!
//! Owns the route and sort [`ServoDriver`]s.  This is the only module in
//! the system that moves real actuators; with [`SimPwm`] channels it runs
//! the same code path entirely in memory.
//!
//! [`SimPwm`]: crate::drivers::pwm::SimPwm

use log::{debug, info};

use crate::app::ports::ActuationPort;
use crate::config::ServoConfig;
use crate::drivers::pwm::{PwmChannel, SimPwm, SysfsPwm};
use crate::drivers::servo::{ServoDriver, ServoTiming};
use crate::error::ActuationError;
use crate::pins;
use crate::routing::{ActuatorId, Position};

/// Concrete adapter that combines both servos behind the port trait.
pub struct HardwareAdapter<P: PwmChannel> {
    route: ServoDriver<P>,
    sort: ServoDriver<P>,
    acquired: bool,
}

impl<P: PwmChannel> HardwareAdapter<P> {
    pub fn new(route: ServoDriver<P>, sort: ServoDriver<P>) -> Self {
        Self {
            route,
            sort,
            acquired: false,
        }
    }

    fn servo(&mut self, id: ActuatorId) -> &mut ServoDriver<P> {
        match id {
            ActuatorId::Route => &mut self.route,
            ActuatorId::Sort => &mut self.sort,
        }
    }

    pub fn route(&self) -> &ServoDriver<P> {
        &self.route
    }

    pub fn sort(&self) -> &ServoDriver<P> {
        &self.sort
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired
    }
}

impl HardwareAdapter<SysfsPwm> {
    /// Servos on the Linux PWM channels named in `cfg`.
    pub fn sysfs(cfg: &ServoConfig) -> Self {
        let timing = ServoTiming::from_config(cfg);
        let chan = |c: crate::config::PwmChannelConfig| {
            ServoDriver::new(SysfsPwm::new(c.chip, c.channel, cfg.frequency_hz), timing)
        };
        Self::new(chan(cfg.route), chan(cfg.sort))
    }
}

impl HardwareAdapter<SimPwm> {
    /// Servos on in-memory channels.
    pub fn simulated(cfg: &ServoConfig) -> Self {
        let timing = ServoTiming::from_config(cfg);
        Self::new(
            ServoDriver::new(SimPwm::new(), timing),
            ServoDriver::new(SimPwm::new(), timing),
        )
    }
}

// ── ActuationPort implementation ──────────────────────────────

impl<P: PwmChannel> ActuationPort for HardwareAdapter<P> {
    fn acquire(&mut self) -> Result<(), ActuationError> {
        self.route.enable()?;
        if let Err(e) = self.sort.enable() {
            self.route.release();
            return Err(e);
        }
        self.acquired = true;
        info!(
            "ACTUATION | servos acquired (route GPIO{}, sort GPIO{})",
            pins::ROUTE_SERVO_GPIO,
            pins::SORT_SERVO_GPIO
        );
        Ok(())
    }

    fn move_to(&mut self, actuator: ActuatorId, target: Position) -> Result<(), ActuationError> {
        if !self.acquired {
            return Err(ActuationError::NotAcquired);
        }
        self.servo(actuator).move_to(target)?;
        debug!("ACTUATION | {actuator} -> {target}");
        Ok(())
    }

    fn release(&mut self) {
        if !self.acquired {
            return;
        }
        self.route.release();
        self.sort.release();
        self.acquired = false;
        info!("ACTUATION | servos released");
    }
}
