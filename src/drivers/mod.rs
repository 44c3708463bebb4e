//! Actuator drivers: PWM channels and the servos on top of them.

pub mod pwm;
pub mod servo;
