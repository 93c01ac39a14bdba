//! State table and handler functions for the door cycle.
//!
//! Stable states (`Open`, `Closed`) hold both control lines released and
//! carry no deadlines.  Transient states (`Opening`, `Closing`) assert the
//! line for their direction on entry, arm the pulse and settle deadlines,
//! release the line when the pulse deadline fires, and settle into the
//! stable form of the *current* target when the settle deadline fires.
//! Settling on `ctx.target` rather than a fixed successor is what lets an
//! override command redirect an in-flight transition without restarting it.

use log::debug;

use super::context::DoorContext;
use super::{DoorState, StateDescriptor};

/// Build the complete state table.
/// Array index MUST match `DoorState as usize`.
pub fn build_state_table() -> [StateDescriptor; DoorState::COUNT] {
    [
        StateDescriptor {
            id: DoorState::Open,
            name: "Open",
            on_enter: Some(stable_enter),
            on_exit: None,
            on_update: stable_update,
        },
        StateDescriptor {
            id: DoorState::Closed,
            name: "Closed",
            on_enter: Some(stable_enter),
            on_exit: None,
            on_update: stable_update,
        },
        StateDescriptor {
            id: DoorState::Opening,
            name: "Opening",
            on_enter: Some(transient_enter),
            on_exit: Some(transient_exit),
            on_update: transient_update,
        },
        StateDescriptor {
            id: DoorState::Closing,
            name: "Closing",
            on_enter: Some(transient_enter),
            on_exit: Some(transient_exit),
            on_update: transient_update,
        },
    ]
}

// ---------------------------------------------------------------------------
// Stable states (Open, Closed)
// ---------------------------------------------------------------------------

fn stable_enter(ctx: &mut DoorContext) {
    ctx.lines.clear();
    ctx.clear_deadlines();
}

fn stable_update(_ctx: &mut DoorContext) -> Option<DoorState> {
    // At rest the FSM never self-transitions; commands and external reports
    // move it via forced transitions from the door service.
    None
}

// ---------------------------------------------------------------------------
// Transient states (Opening, Closing)
// ---------------------------------------------------------------------------

fn transient_enter(ctx: &mut DoorContext) {
    // Assert only the line for the direction of travel.  On single-button
    // operators both GPIOs alias the same pin and this still produces one
    // clean pulse.
    let line = ctx.target.control_line();
    ctx.lines.clear();
    match line {
        super::ControlLine::Open => ctx.lines.open = true,
        super::ControlLine::Close => ctx.lines.close = true,
    }
    ctx.arm_deadlines();
    debug!(
        "trigger pulse armed: release at {:?}, settle at {:?}",
        ctx.pulse_due, ctx.settle_due
    );
}

fn transient_exit(ctx: &mut DoorContext) {
    // A collapsed or redirected transition must never leave a line held
    // or a stale deadline ticking.
    ctx.lines.clear();
    ctx.clear_deadlines();
}

fn transient_update(ctx: &mut DoorContext) -> Option<DoorState> {
    if let Some(due) = ctx.pulse_due {
        if ctx.now_ms >= due {
            ctx.lines.clear();
            ctx.pulse_due = None;
        }
    }

    if let Some(due) = ctx.settle_due {
        if ctx.now_ms >= due {
            ctx.settle_due = None;
            return Some(ctx.target.stable_state());
        }
    }

    None
}
