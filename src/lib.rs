//! Closed-loop sorter library.
//!
//! Capture, classify, route, count, persist, and publish, one object per
//! cycle.  The binary wires the simulated or sysfs-backed adapters; tests
//! wire mocks against the same ports.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod diagnostics;
pub mod drivers;
pub mod error;
pub mod fsm;
pub mod health;
pub mod pins;
pub mod routing;
pub mod tally;
pub mod telemetry;
