//! Sorter configuration parameters.
//!
//! All tunable parameters for the sorter.  Loaded from a JSON file through
//! [`ConfigPort`](crate::app::ports::ConfigPort); every section falls back to
//! its defaults when missing, so a partial file is valid.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SorterConfig {
    /// Reported as `deviceType` when telemetry connects.
    pub device_name: String,
    pub control: ControlConfig,
    pub routing: RoutingConfig,
    pub servo: ServoConfig,
    pub health: HealthConfig,
    pub persistence: PersistenceConfig,
    pub camera: CameraConfig,
    pub classifier: ClassifierConfig,
    pub telemetry: TelemetryConfig,
}

impl Default for SorterConfig {
    fn default() -> Self {
        Self {
            device_name: "Smart Sorter".into(),
            control: ControlConfig::default(),
            routing: RoutingConfig::default(),
            servo: ServoConfig::default(),
            health: HealthConfig::default(),
            persistence: PersistenceConfig::default(),
            camera: CameraConfig::default(),
            classifier: ClassifierConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

// --- Control loop ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Pause between cycles (milliseconds).
    pub cycle_interval_ms: u64,
    /// Stop after this many cycles.  `None` = run until interrupted.
    pub max_cycles: Option<u64>,
    /// Stop after this many seconds.  `None` = run until interrupted.
    pub max_duration_secs: Option<u64>,
    /// How long `Draining` waits for the telemetry task (milliseconds).
    pub shutdown_grace_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            cycle_interval_ms: 500,
            max_cycles: None,
            max_duration_secs: None,
            shutdown_grace_ms: 6000,
        }
    }
}

// --- Routing setpoints ---

/// Actuator setpoints in degrees.  The decision table is built from these.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// P1: route servo position that passes an accepted object on.
    pub route_accept_deg: f32,
    /// P2: route servo position that ejects the object.
    pub route_eject_deg: f32,
    /// S1: sort servo position for the accept bin.
    pub sort_accept_deg: f32,
    /// S2: sort servo position for the reject bin.
    pub sort_reject_deg: f32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            route_accept_deg: 90.0,
            route_eject_deg: 180.0,
            sort_accept_deg: 90.0,
            sort_reject_deg: 180.0,
        }
    }
}

// --- Servos ---

/// One Linux PWM channel (`/sys/class/pwm/pwmchip<chip>/pwm<channel>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PwmChannelConfig {
    pub chip: u32,
    pub channel: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    pub route: PwmChannelConfig,
    pub sort: PwmChannelConfig,
    /// Servo frame rate.  Hobby servos expect 50 Hz.
    pub frequency_hz: u32,
    /// Pulse width at 0 degrees (microseconds).
    pub min_pulse_us: u32,
    /// Pulse width at `max_angle_deg` (microseconds).
    pub max_pulse_us: u32,
    pub max_angle_deg: f32,
    /// Hold time after a move before the channel is de-energised.
    pub settle_ms: u64,
    /// Drive in-memory channels instead of sysfs.
    pub simulate: bool,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            route: PwmChannelConfig { chip: 0, channel: 0 },
            sort: PwmChannelConfig { chip: 0, channel: 1 },
            frequency_hz: crate::pins::SERVO_PWM_HZ,
            min_pulse_us: 500,
            max_pulse_us: 2500,
            max_angle_deg: 180.0,
            settle_ms: 500,
            simulate: false,
        }
    }
}

// --- Actuator health ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Consecutive failures on one actuator before it is reported degraded.
    pub failure_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
        }
    }
}

// --- Persistence ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub csv_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("data/sorting_counts.csv"),
        }
    }
}

// --- Camera ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

// --- Classifier ---

/// One scripted classifier response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Top detection of the model.
    Predict { class: String, confidence: f32 },
    /// Nothing detected in frame.
    Nothing,
    /// Backend did not answer in time.
    Timeout,
    /// Backend returned an error.
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierBackend {
    /// Replay `steps` in order; wrap around when `repeat` is set, otherwise
    /// report `Nothing` once exhausted.
    Scripted { steps: Vec<ScriptStep>, repeat: bool },
    /// Always report the same detection.
    Fixed { class: String, confidence: f32 },
}

impl Default for ClassifierBackend {
    fn default() -> Self {
        Self::Scripted {
            steps: vec![
                ScriptStep::Predict {
                    class: "fresh".into(),
                    confidence: 0.92,
                },
                ScriptStep::Predict {
                    class: "rotten".into(),
                    confidence: 0.81,
                },
                ScriptStep::Predict {
                    class: "fresh".into(),
                    confidence: 0.31,
                },
            ],
            repeat: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub backend: ClassifierBackend,
    /// Detections at or below this confidence fold into `Uncertain`.
    pub confidence_threshold: f32,
    /// Case-insensitive substring of the class name that means `Accept`.
    pub accept_keyword: String,
    /// Case-insensitive substring of the class name that means `Reject-A`.
    pub reject_keyword: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            backend: ClassifierBackend::default(),
            confidence_threshold: 0.5,
            accept_keyword: "fresh".into(),
            reject_keyword: "rotten".into(),
        }
    }
}

// --- Telemetry ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryBackend {
    /// Log-only; nothing leaves the device.
    Disabled,
    /// ThingsBoard device API: the access token is the MQTT username.
    #[serde(rename = "thingsboard")]
    ThingsBoard {
        host: String,
        port: u16,
        access_token: String,
    },
    /// Any MQTT 3.1.1 broker.
    Mqtt {
        host: String,
        port: u16,
        client_id: String,
        username: Option<String>,
        password: Option<String>,
        telemetry_topic: String,
        attributes_topic: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub backend: TelemetryBackend,
    /// Publish period (seconds).  Independent of the cycle rate.
    pub interval_secs: u64,
    /// MQTT QoS for publishes (0 or 1).
    pub qos: u8,
    pub keepalive_secs: u16,
    /// Connect / acknowledgement timeout (milliseconds).
    pub io_timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            backend: TelemetryBackend::Disabled,
            interval_secs: 5,
            qos: 1,
            keepalive_secs: 60,
            io_timeout_ms: 2000,
        }
    }
}

impl TelemetryBackend {
    /// ThingsBoard cloud endpoint with the given device token.
    pub fn thingsboard(access_token: impl Into<String>) -> Self {
        Self::ThingsBoard {
            host: "thingsboard.cloud".into(),
            port: 1883,
            access_token: access_token.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl SorterConfig {
    /// Range-check every field.  Returns the first violation found.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.device_name.is_empty() {
            return Err("device_name must not be empty");
        }
        if self.control.shutdown_grace_ms == 0 {
            return Err("shutdown_grace_ms must be > 0");
        }

        let s = &self.servo;
        if s.frequency_hz == 0 {
            return Err("servo frequency_hz must be > 0");
        }
        if s.min_pulse_us >= s.max_pulse_us {
            return Err("servo min_pulse_us must be below max_pulse_us");
        }
        if u64::from(s.max_pulse_us) * u64::from(s.frequency_hz) >= 1_000_000 {
            return Err("servo max_pulse_us must fit inside one PWM period");
        }
        if s.max_angle_deg.is_nan() || s.max_angle_deg <= 0.0 {
            return Err("servo max_angle_deg must be > 0");
        }
        let r = &self.routing;
        for angle in [
            r.route_accept_deg,
            r.route_eject_deg,
            r.sort_accept_deg,
            r.sort_reject_deg,
        ] {
            if !(0.0..=s.max_angle_deg).contains(&angle) {
                return Err("routing setpoint outside servo travel");
            }
        }

        if self.health.failure_threshold == 0 {
            return Err("health failure_threshold must be >= 1");
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err("camera resolution must be non-zero");
        }

        let c = &self.classifier;
        if !(0.0..=1.0).contains(&c.confidence_threshold) {
            return Err("confidence_threshold must be within 0..=1");
        }
        if c.accept_keyword.is_empty() || c.reject_keyword.is_empty() {
            return Err("classifier keywords must not be empty");
        }

        let t = &self.telemetry;
        if t.interval_secs == 0 {
            return Err("telemetry interval_secs must be > 0");
        }
        if t.qos > 1 {
            return Err("telemetry qos must be 0 or 1");
        }
        if t.keepalive_secs != 0 && t.interval_secs >= u64::from(t.keepalive_secs) {
            return Err("telemetry interval must be shorter than keepalive");
        }
        if t.io_timeout_ms == 0 {
            return Err("telemetry io_timeout_ms must be > 0");
        }
        match &t.backend {
            TelemetryBackend::Disabled => {}
            TelemetryBackend::ThingsBoard {
                host, access_token, ..
            } => {
                if host.is_empty() {
                    return Err("thingsboard host must not be empty");
                }
                if access_token.is_empty() {
                    return Err("thingsboard access_token must not be empty");
                }
            }
            TelemetryBackend::Mqtt {
                host,
                telemetry_topic,
                attributes_topic,
                ..
            } => {
                if host.is_empty() {
                    return Err("mqtt host must not be empty");
                }
                if telemetry_topic.is_empty() || attributes_topic.is_empty() {
                    return Err("mqtt topics must not be empty");
                }
            }
        }
        Ok(())
    }
}
