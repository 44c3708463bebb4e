//! PWM channels behind `embedded-hal` 1.0 [`SetDutyCycle`].
//!
//! ## Dual-target design
//!
//! - [`SysfsPwm`] drives a Linux PWM channel through
//!   `/sys/class/pwm/pwmchip<N>/pwm<M>/{period,duty_cycle,enable}`.
//! - [`SimPwm`] tracks state in memory only (bench runs and tests).
//!
//! Duty cycle is expressed on the `embedded-hal` scale `0..=u16::MAX`;
//! the sysfs channel converts it to nanoseconds of the configured period.

use core::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use embedded_hal::pwm::{self, ErrorKind, ErrorType, SetDutyCycle};
use log::debug;

// ---------------------------------------------------------------------------
// Channel trait
// ---------------------------------------------------------------------------

/// A PWM output that can be switched on and off as a whole.
pub trait PwmChannel: SetDutyCycle {
    /// Claim and configure the channel, output low.
    fn enable(&mut self) -> Result<(), Self::Error>;

    /// Stop the output entirely.
    fn disable(&mut self) -> Result<(), Self::Error>;
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmError {
    /// The sysfs node could not be written.
    Io(io::ErrorKind),
    /// Write attempted on a disabled channel.
    Disabled,
}

impl fmt::Display for PwmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(kind) => write!(f, "sysfs PWM I/O: {kind}"),
            Self::Disabled => write!(f, "PWM channel disabled"),
        }
    }
}

impl pwm::Error for PwmError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl From<io::Error> for PwmError {
    fn from(e: io::Error) -> Self {
        Self::Io(e.kind())
    }
}

// ---------------------------------------------------------------------------
// Linux sysfs channel
// ---------------------------------------------------------------------------

pub struct SysfsPwm {
    chip_dir: PathBuf,
    channel: u32,
    period_ns: u64,
    enabled: bool,
}

impl SysfsPwm {
    /// Describe a channel.  Nothing is touched until [`PwmChannel::enable`].
    pub fn new(chip: u32, channel: u32, frequency_hz: u32) -> Self {
        Self::with_root("/sys/class/pwm", chip, channel, frequency_hz)
    }

    /// Same as [`SysfsPwm::new`] with a different sysfs root.
    pub fn with_root(root: impl Into<PathBuf>, chip: u32, channel: u32, frequency_hz: u32) -> Self {
        Self {
            chip_dir: root.into().join(format!("pwmchip{chip}")),
            channel,
            period_ns: 1_000_000_000 / u64::from(frequency_hz.max(1)),
            enabled: false,
        }
    }

    fn channel_dir(&self) -> PathBuf {
        self.chip_dir.join(format!("pwm{}", self.channel))
    }

    fn write_attr(&self, attr: &str, value: impl fmt::Display) -> Result<(), PwmError> {
        fs::write(self.channel_dir().join(attr), value.to_string())?;
        Ok(())
    }

    fn export(&self) -> Result<(), PwmError> {
        if self.channel_dir().exists() {
            return Ok(());
        }
        fs::write(self.chip_dir.join("export"), self.channel.to_string())?;
        // udev needs a moment to hand the new node to the gpio group.
        for _ in 0..10 {
            if self.channel_dir().join("period").exists() {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        Err(PwmError::Io(io::ErrorKind::NotFound))
    }
}

impl ErrorType for SysfsPwm {
    type Error = PwmError;
}

impl SetDutyCycle for SysfsPwm {
    fn max_duty_cycle(&self) -> u16 {
        u16::MAX
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        if !self.enabled {
            return Err(PwmError::Disabled);
        }
        let ns = self.period_ns * u64::from(duty) / u64::from(u16::MAX);
        self.write_attr("duty_cycle", ns)
    }
}

impl PwmChannel for SysfsPwm {
    fn enable(&mut self) -> Result<(), Self::Error> {
        self.export()?;
        // duty_cycle must never exceed period, so clear it first.
        self.write_attr("duty_cycle", 0)?;
        self.write_attr("period", self.period_ns)?;
        self.write_attr("enable", 1)?;
        self.enabled = true;
        debug!(
            "PWM | {} enabled, period {}ns",
            self.channel_dir().display(),
            self.period_ns
        );
        Ok(())
    }

    /// Both writes are attempted; the first failure is reported.
    fn disable(&mut self) -> Result<(), Self::Error> {
        self.enabled = false;
        let duty = self.write_attr("duty_cycle", 0);
        let enable = self.write_attr("enable", 0);
        duty.and(enable)
    }
}

// ---------------------------------------------------------------------------
// Simulated channel
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SimPwm {
    enabled: bool,
    duty: u16,
    /// Every duty value written, in order.
    history: Vec<u16>,
}

impl SimPwm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn duty(&self) -> u16 {
        self.duty
    }

    pub fn history(&self) -> &[u16] {
        &self.history
    }
}

impl ErrorType for SimPwm {
    type Error = PwmError;
}

impl SetDutyCycle for SimPwm {
    fn max_duty_cycle(&self) -> u16 {
        u16::MAX
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        if !self.enabled {
            return Err(PwmError::Disabled);
        }
        self.duty = duty;
        self.history.push(duty);
        Ok(())
    }
}

impl PwmChannel for SimPwm {
    fn enable(&mut self) -> Result<(), Self::Error> {
        self.enabled = true;
        self.duty = 0;
        Ok(())
    }

    fn disable(&mut self) -> Result<(), Self::Error> {
        self.enabled = false;
        self.duty = 0;
        Ok(())
    }
}
