//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter         | Implements         | Connects to                    |
//! |-----------------|--------------------|--------------------------------|
//! | `camera`        | CameraPort         | Simulated frame source         |
//! | `classifier`    | ClassificationPort | Scripted / fixed predictions   |
//! | `hardware`      | ActuationPort      | Route + sort servos (PWM)      |
//! | `csv_log`       | PersistencePort    | Append-only CSV file           |
//! | `mqtt`          | TelemetryPort      | ThingsBoard / MQTT 3.1.1 broker|
//! | `log_telemetry` | TelemetryPort      | Log output (no broker)         |
//! | `log_sink`      | EventSink          | Log output                     |
//! | `config_file`   | ConfigPort         | JSON config file               |

pub mod camera;
pub mod classifier;
pub mod config_file;
pub mod csv_log;
pub mod hardware;
pub mod log_sink;
pub mod log_telemetry;
pub mod mqtt;
