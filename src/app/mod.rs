//! Application core — the sorting domain, with no direct I/O.
//!
//! The control loop, its events, the stop token, and the port traits the
//! adapters implement.  Everything here runs against mocks in tests.

pub mod events;
pub mod ports;
pub mod service;
pub mod stop;
