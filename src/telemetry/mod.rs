//! Telemetry: record shapes, MQTT wire codec, and the background publisher.

pub mod codec;
pub mod payload;
pub mod publisher;
