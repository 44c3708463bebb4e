//! Decision table: outcome label → actuator commands.
//!
//! ```text
//!   Label      │ route       │ sort        │ counter
//!  ────────────┼─────────────┼─────────────┼──────────
//!   Accept     │ P1 (pass)   │ S1 (accept) │ Accept
//!   Reject-A   │ P2 (eject)  │ S2 (reject) │ Reject-A
//!   Uncertain  │ P2 (eject)  │ -           │ Uncertain
//! ```
//!
//! The table is plain data built once from [`RoutingConfig`]; a cycle does a
//! single indexed lookup.  Commands are stored in issue order: route
//! actuator first, then sort actuator.

use core::fmt;

use heapless::Vec;

use crate::config::RoutingConfig;
use crate::tally::Label;

// ---------------------------------------------------------------------------
// Actuator identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ActuatorId {
    /// Diverts the object (pass / eject).
    Route = 0,
    /// Selects the bin (accept / reject).
    Sort = 1,
}

impl ActuatorId {
    pub const COUNT: usize = 2;

    pub const ALL: [ActuatorId; ActuatorId::COUNT] = [ActuatorId::Route, ActuatorId::Sort];

    /// Bit used in the health fault mask.
    pub const fn mask(self) -> u8 {
        1 << (self as u8)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Route => "route",
            Self::Sort => "sort",
        }
    }
}

impl fmt::Display for ActuatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Target position in degrees of servo travel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position(pub f32);

impl Position {
    pub fn degrees(self) -> f32 {
        self.0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}\u{00b0}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuationCommand {
    pub actuator: ActuatorId,
    pub target: Position,
}

/// At most one command per actuator.
pub const MAX_COMMANDS: usize = ActuatorId::COUNT;

/// One row of the decision table.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRule {
    pub label: Label,
    pub commands: Vec<ActuationCommand, MAX_COMMANDS>,
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

pub struct DecisionTable {
    /// Indexed by `Label as usize`.
    rules: [RouteRule; Label::COUNT],
}

impl DecisionTable {
    pub fn from_config(cfg: &RoutingConfig) -> Self {
        let route_pass = cmd(ActuatorId::Route, cfg.route_accept_deg);
        let route_eject = cmd(ActuatorId::Route, cfg.route_eject_deg);
        let sort_accept = cmd(ActuatorId::Sort, cfg.sort_accept_deg);
        let sort_reject = cmd(ActuatorId::Sort, cfg.sort_reject_deg);

        Self {
            rules: [
                rule(Label::Accept, &[route_pass, sort_accept]),
                rule(Label::RejectA, &[route_eject, sort_reject]),
                rule(Label::Uncertain, &[route_eject]),
            ],
        }
    }

    pub fn lookup(&self, label: Label) -> &RouteRule {
        &self.rules[label as usize]
    }
}

impl Default for DecisionTable {
    fn default() -> Self {
        Self::from_config(&RoutingConfig::default())
    }
}

fn cmd(actuator: ActuatorId, degrees: f32) -> ActuationCommand {
    ActuationCommand {
        actuator,
        target: Position(degrees),
    }
}

fn rule(label: Label, commands: &[ActuationCommand]) -> RouteRule {
    let mut v = Vec::new();
    for c in commands {
        // Capacity is one slot per actuator; every row fits.
        let _ = v.push(*c);
    }
    RouteRule { label, commands: v }
}
