//! GPIO / PWM assignments for the sorter carrier board.
//!
//! Single source of truth for the wiring.  The servos are driven through
//! Linux PWM channels; on a Raspberry Pi the two BCM pins below are exposed
//! as `pwmchip` channels by a `pwm-gpio` overlay, and the chip/channel
//! numbers are set in [`ServoConfig`](crate::config::ServoConfig).

// ---------------------------------------------------------------------------
// Route servo (moves the object off the belt or lets it pass)
// ---------------------------------------------------------------------------

/// BCM pin of the route servo signal line.
pub const ROUTE_SERVO_GPIO: u32 = 25;

// ---------------------------------------------------------------------------
// Sort servo (flips between the accept and reject bins)
// ---------------------------------------------------------------------------

/// BCM pin of the sort servo signal line.
pub const SORT_SERVO_GPIO: u32 = 17;

// ---------------------------------------------------------------------------
// Servo timing
// ---------------------------------------------------------------------------

/// Standard hobby-servo frame rate.
pub const SERVO_PWM_HZ: u32 = 50;
