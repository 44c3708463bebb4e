//! Concrete state handler functions and table builder.
//!
//! ```text
//!  STARTING ──[startup done]──▶ RUNNING ──[stop / limit]──▶ DRAINING ──[drained]──▶ STOPPED
//!      │                                                       ▲
//!      └──────────────[stop / limit before first cycle]────────┘
//! ```

use super::context::LoopContext;
use super::{LoopState, StateDescriptor};
use log::info;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once per loop.
pub fn build_state_table() -> [StateDescriptor; LoopState::COUNT] {
    [
        StateDescriptor {
            id: LoopState::Starting,
            name: "Starting",
            on_enter: Some(starting_enter),
            on_exit: None,
            on_update: starting_update,
        },
        StateDescriptor {
            id: LoopState::Running,
            name: "Running",
            on_enter: Some(running_enter),
            on_exit: None,
            on_update: running_update,
        },
        StateDescriptor {
            id: LoopState::Draining,
            name: "Draining",
            on_enter: Some(draining_enter),
            on_exit: None,
            on_update: draining_update,
        },
        StateDescriptor {
            id: LoopState::Stopped,
            name: "Stopped",
            on_enter: Some(stopped_enter),
            on_exit: None,
            on_update: stopped_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  STARTING
// ═══════════════════════════════════════════════════════════════════════════

fn starting_enter(ctx: &mut LoopContext) {
    ctx.startup_complete = false;
    ctx.drained = false;
    ctx.stop_reason = None;
}

fn starting_update(ctx: &mut LoopContext) -> Option<LoopState> {
    if !ctx.startup_complete {
        return None;
    }
    if let Some(reason) = ctx.stop_condition() {
        ctx.stop_reason = Some(reason);
        return Some(LoopState::Draining);
    }
    Some(LoopState::Running)
}

// ═══════════════════════════════════════════════════════════════════════════
//  RUNNING
// ═══════════════════════════════════════════════════════════════════════════

fn running_enter(ctx: &mut LoopContext) {
    info!(
        "STATE | running (max_cycles={:?}, max_duration={:?})",
        ctx.limits.max_cycles, ctx.limits.max_duration
    );
}

fn running_update(ctx: &mut LoopContext) -> Option<LoopState> {
    let reason = ctx.stop_condition()?;
    ctx.stop_reason = Some(reason);
    Some(LoopState::Draining)
}

// ═══════════════════════════════════════════════════════════════════════════
//  DRAINING
// ═══════════════════════════════════════════════════════════════════════════

fn draining_enter(ctx: &mut LoopContext) {
    info!(
        "STATE | draining after {} cycles ({})",
        ctx.cycles_completed,
        ctx.stop_reason
            .map_or_else(|| "unknown".to_string(), |r| r.to_string())
    );
}

fn draining_update(ctx: &mut LoopContext) -> Option<LoopState> {
    ctx.drained.then_some(LoopState::Stopped)
}

// ═══════════════════════════════════════════════════════════════════════════
//  STOPPED (terminal)
// ═══════════════════════════════════════════════════════════════════════════

fn stopped_enter(_ctx: &mut LoopContext) {
    info!("STATE | stopped");
}

fn stopped_update(_ctx: &mut LoopContext) -> Option<LoopState> {
    None
}
