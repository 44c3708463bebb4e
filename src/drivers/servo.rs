//! Hobby servo driver.
//!
//! Angle → pulse width → duty cycle on a 50 Hz [`PwmChannel`].  After each
//! move the driver holds the pulse for the settle time, then drops the duty
//! to zero so the servo does not jitter while idle.

use std::time::Duration;

use log::warn;

use crate::config::ServoConfig;
use crate::drivers::pwm::PwmChannel;
use crate::error::ActuationError;
use crate::routing::Position;

/// Pulse geometry and settle time, shared by both servos.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServoTiming {
    pub period_us: u32,
    pub min_pulse_us: u32,
    pub max_pulse_us: u32,
    pub max_angle_deg: f32,
    pub settle: Duration,
}

impl ServoTiming {
    pub fn from_config(cfg: &ServoConfig) -> Self {
        Self {
            period_us: 1_000_000 / cfg.frequency_hz.max(1),
            min_pulse_us: cfg.min_pulse_us,
            max_pulse_us: cfg.max_pulse_us,
            max_angle_deg: cfg.max_angle_deg,
            settle: Duration::from_millis(cfg.settle_ms),
        }
    }

    /// Pulse width for `pos`, or `None` outside `0..=max_angle_deg`.
    pub fn pulse_us(&self, pos: Position) -> Option<u32> {
        let deg = pos.degrees();
        if !(0.0..=self.max_angle_deg).contains(&deg) {
            return None;
        }
        let span = (self.max_pulse_us - self.min_pulse_us) as f32;
        Some(self.min_pulse_us + (span * deg / self.max_angle_deg).round() as u32)
    }

    /// Duty value on a `0..=max_duty` scale for the given pulse width.
    pub fn duty_for(&self, pulse_us: u32, max_duty: u16) -> u16 {
        let duty = u64::from(pulse_us) * u64::from(max_duty) / u64::from(self.period_us);
        duty.min(u64::from(max_duty)) as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServoState {
    Released,
    Holding { last: Option<Position> },
}

pub struct ServoDriver<P: PwmChannel> {
    pwm: P,
    timing: ServoTiming,
    state: ServoState,
}

impl<P: PwmChannel> ServoDriver<P> {
    pub fn new(pwm: P, timing: ServoTiming) -> Self {
        Self {
            pwm,
            timing,
            state: ServoState::Released,
        }
    }

    /// Enable the channel with the output low.
    pub fn enable(&mut self) -> Result<(), ActuationError> {
        self.pwm.enable().map_err(|_| ActuationError::Unavailable)?;
        self.state = ServoState::Holding { last: None };
        Ok(())
    }

    /// Drive to `pos`, hold for the settle time, then de-energise.
    pub fn move_to(&mut self, pos: Position) -> Result<(), ActuationError> {
        if self.state == ServoState::Released {
            return Err(ActuationError::NotAcquired);
        }
        let pulse = self.timing.pulse_us(pos).ok_or(ActuationError::OutOfRange)?;
        let duty = self.timing.duty_for(pulse, self.pwm.max_duty_cycle());

        self.pwm
            .set_duty_cycle(duty)
            .map_err(|_| ActuationError::PwmWriteFailed)?;
        if !self.timing.settle.is_zero() {
            std::thread::sleep(self.timing.settle);
        }
        self.pwm
            .set_duty_cycle_fully_off()
            .map_err(|_| ActuationError::PwmWriteFailed)?;

        self.state = ServoState::Holding { last: Some(pos) };
        Ok(())
    }

    /// Duty to zero and disable the channel.  Errors are logged only.
    pub fn release(&mut self) {
        if self.state == ServoState::Released {
            return;
        }
        let off = self.pwm.set_duty_cycle_fully_off();
        let disabled = self.pwm.disable();
        if off.is_err() || disabled.is_err() {
            warn!("ACTUATION | PWM channel did not disable cleanly");
        }
        self.state = ServoState::Released;
    }

    pub fn state(&self) -> ServoState {
        self.state
    }

    pub fn channel(&self) -> &P {
        &self.pwm
    }
}
