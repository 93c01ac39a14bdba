//! Function-pointer finite state machine engine for the door cycle.
//!
//! Classic embedded FSM pattern:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  StateTable                                              │
//! │  ┌─────────┬───────────┬──────────┬───────────────────┐  │
//! │  │ DoorState│ on_enter  │ on_exit  │ on_update         │  │
//! │  ├─────────┼───────────┼──────────┼───────────────────┤  │
//! │  │ Open     │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │  │
//! │  │ Closed   │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │  │
//! │  │ Opening  │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │  │
//! │  │ Closing  │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │  │
//! │  └─────────┴───────────┴──────────┴───────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Each poll the engine calls `on_update` for the **current** state.  If it
//! returns `Some(next)`, the engine runs `on_exit` for the current state,
//! then `on_enter` for the next, and updates the current pointer.  All
//! functions receive `&mut DoorContext`, which carries the monotonic clock,
//! line assertion commands, the pulse/settle deadlines, and configuration.

pub mod context;
pub mod states;

use context::DoorContext;
use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Believed real-world door position, including transient phases.
///
/// Tag values match the HomeKit current-door-state vocabulary so the
/// persisted form is directly exchangeable with the exposure layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DoorState {
    Open = 0,
    Closed = 1,
    Opening = 2,
    Closing = 3,
}

impl DoorState {
    /// Total number of states — used to size the table array.
    pub const COUNT: usize = 4;

    /// Convert a `u8` index back to `DoorState`.  Panics on out-of-range in
    /// debug builds; returns `Closed` in release (safe fallback).
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Open,
            1 => Self::Closed,
            2 => Self::Opening,
            3 => Self::Closing,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Closed
            }
        }
    }

    /// Persisted integer tag.
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Decode a persisted tag.  Unknown tags read back as `None` so a
    /// corrupt store falls through to the default state.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Open),
            1 => Some(Self::Closed),
            2 => Some(Self::Opening),
            3 => Some(Self::Closing),
            _ => None,
        }
    }

    /// `Open` and `Closed` are stable; `Opening`/`Closing` are transient.
    pub const fn is_stable(self) -> bool {
        matches!(self, Self::Open | Self::Closed)
    }

    /// The intent this state corresponds to once at rest.
    pub const fn as_target(self) -> TargetState {
        match self {
            Self::Open | Self::Opening => TargetState::Open,
            Self::Closed | Self::Closing => TargetState::Closed,
        }
    }
}

/// Last commanded intent — always one of the two stable values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TargetState {
    Open = 0,
    Closed = 1,
}

impl TargetState {
    /// Persisted integer tag.
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Decode a persisted tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Open),
            1 => Some(Self::Closed),
            _ => None,
        }
    }

    /// The stable door state this intent resolves to.
    pub const fn stable_state(self) -> DoorState {
        match self {
            Self::Open => DoorState::Open,
            Self::Closed => DoorState::Closed,
        }
    }

    /// The transient door state entered while moving toward this intent.
    pub const fn transient_state(self) -> DoorState {
        match self {
            Self::Open => DoorState::Opening,
            Self::Closed => DoorState::Closing,
        }
    }

    /// The control line that drives the operator toward this intent.
    pub const fn control_line(self) -> ControlLine {
        match self {
            Self::Open => ControlLine::Open,
            Self::Closed => ControlLine::Close,
        }
    }
}

/// The two momentary trigger lines on the door operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlLine {
    Open,
    Close,
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
/// These run exactly once on each state transition.
pub type StateActionFn = fn(&mut DoorContext);

/// Signature for the per-poll update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut DoorContext) -> Option<DoorState>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single FSM state.
/// Stored in a fixed-size array — no heap, no `dyn`.
pub struct StateDescriptor {
    pub id: DoorState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The finite state machine engine.
///
/// Owns the state table (array of [`StateDescriptor`]); the mutable
/// [`DoorContext`] is threaded through every handler call.
pub struct DoorFsm {
    /// Fixed-size table indexed by `DoorState as usize`.
    table: [StateDescriptor; DoorState::COUNT],
    /// Index of the currently active state.
    current: usize,
}

impl DoorFsm {
    /// Construct a new FSM with the given state table, starting in `initial`.
    pub fn new(table: [StateDescriptor; DoorState::COUNT], initial: DoorState) -> Self {
        Self {
            table,
            current: initial as usize,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut DoorContext) {
        info!("FSM starting in state: {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one poll.
    ///
    /// 1. Call `on_update` for the current state.
    /// 2. If it returns `Some(next)`, execute the transition:
    ///    `on_exit(current)` → update pointer → `on_enter(next)`.
    pub fn tick(&mut self, ctx: &mut DoorContext) {
        let next = (self.table[self.current].on_update)(ctx);

        if let Some(next_id) = next {
            self.transition(next_id, ctx);
        }
    }

    /// Force an immediate transition, bypassing `on_update`.
    ///
    /// Unlike a guarded transition, re-entering the current state re-runs
    /// its `on_exit`/`on_enter` pair.  The door service relies on this to
    /// re-arm the pulse and settle deadlines when a command re-issues the
    /// same direction, and to collapse deadlines when an external report
    /// confirms the state the FSM already believed.
    pub fn force_transition(&mut self, next: DoorState, ctx: &mut DoorContext) {
        self.transition(next, ctx);
    }

    /// The current state's identity.
    pub fn current_state(&self) -> DoorState {
        DoorState::from_index(self.current)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: DoorState, ctx: &mut DoorContext) {
        let next_idx = next_id as usize;

        info!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        // Exit current state
        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        // Update pointer
        self.current = next_idx;

        // Enter new state
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::context::DoorContext;
    use super::*;
    use crate::config::SystemConfig;

    fn make_ctx() -> DoorContext {
        DoorContext::new(&SystemConfig::default(), TargetState::Closed)
    }

    fn make_fsm(initial: DoorState) -> DoorFsm {
        DoorFsm::new(states::build_state_table(), initial)
    }

    #[test]
    fn starts_in_given_state() {
        let fsm = make_fsm(DoorState::Closed);
        assert_eq!(fsm.current_state(), DoorState::Closed);
    }

    #[test]
    fn start_clears_lines_in_stable_state() {
        let mut fsm = make_fsm(DoorState::Closed);
        let mut ctx = make_ctx();
        ctx.lines.open = true;
        ctx.lines.close = true;
        fsm.start(&mut ctx);
        assert!(!ctx.lines.open);
        assert!(!ctx.lines.close);
        assert!(ctx.pulse_due.is_none());
        assert!(ctx.settle_due.is_none());
    }

    #[test]
    fn opening_asserts_open_line_and_arms_deadlines() {
        let mut fsm = make_fsm(DoorState::Closed);
        let mut ctx = make_ctx();
        fsm.start(&mut ctx);

        ctx.now_ms = 1_000;
        ctx.target = TargetState::Open;
        fsm.force_transition(DoorState::Opening, &mut ctx);

        assert!(ctx.lines.open);
        assert!(!ctx.lines.close);
        assert_eq!(ctx.pulse_due, Some(1_000 + u64::from(ctx.pulse_duration_ms)));
        assert_eq!(ctx.settle_due, Some(1_000 + ctx.travel_duration_ms));
    }

    #[test]
    fn pulse_deadline_releases_line_without_transition() {
        let mut fsm = make_fsm(DoorState::Closed);
        let mut ctx = make_ctx();
        fsm.start(&mut ctx);

        ctx.now_ms = 0;
        ctx.target = TargetState::Open;
        fsm.force_transition(DoorState::Opening, &mut ctx);

        ctx.now_ms = u64::from(ctx.pulse_duration_ms);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), DoorState::Opening);
        assert!(!ctx.lines.open, "line must release at the pulse deadline");
        assert!(ctx.pulse_due.is_none());
        assert!(ctx.settle_due.is_some(), "settle still pending");
    }

    #[test]
    fn settle_deadline_completes_transition() {
        let mut fsm = make_fsm(DoorState::Closed);
        let mut ctx = make_ctx();
        fsm.start(&mut ctx);

        ctx.now_ms = 0;
        ctx.target = TargetState::Open;
        fsm.force_transition(DoorState::Opening, &mut ctx);

        ctx.now_ms = ctx.travel_duration_ms;
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), DoorState::Open);
        assert!(ctx.settle_due.is_none());
        assert!(!ctx.lines.open);
    }

    #[test]
    fn closing_mirrors_opening_on_the_close_line() {
        let mut fsm = make_fsm(DoorState::Open);
        let mut ctx = make_ctx();
        fsm.start(&mut ctx);

        ctx.now_ms = 500;
        ctx.target = TargetState::Closed;
        fsm.force_transition(DoorState::Closing, &mut ctx);
        assert!(ctx.lines.close);
        assert!(!ctx.lines.open);

        ctx.now_ms = 500 + ctx.travel_duration_ms;
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), DoorState::Closed);
    }

    #[test]
    fn stable_states_never_self_transition() {
        for initial in [DoorState::Open, DoorState::Closed] {
            let mut fsm = make_fsm(initial);
            let mut ctx = make_ctx();
            fsm.start(&mut ctx);
            ctx.now_ms = 1_000_000;
            for _ in 0..10 {
                fsm.tick(&mut ctx);
            }
            assert_eq!(fsm.current_state(), initial);
        }
    }

    #[test]
    fn reentering_transient_rearms_deadlines() {
        let mut fsm = make_fsm(DoorState::Closed);
        let mut ctx = make_ctx();
        fsm.start(&mut ctx);

        ctx.now_ms = 0;
        ctx.target = TargetState::Open;
        fsm.force_transition(DoorState::Opening, &mut ctx);
        let first_settle = ctx.settle_due;

        ctx.now_ms = 3_000;
        fsm.force_transition(DoorState::Opening, &mut ctx);
        assert_ne!(ctx.settle_due, first_settle, "deadlines must re-arm");
        assert!(ctx.lines.open, "line re-asserted for the fresh pulse");
    }

    #[test]
    fn state_tag_roundtrip() {
        for i in 0..DoorState::COUNT {
            let id = DoorState::from_index(i);
            assert_eq!(id as usize, i);
            assert_eq!(DoorState::from_tag(id.tag()), Some(id));
        }
        assert_eq!(DoorState::from_tag(9), None);
        for t in [TargetState::Open, TargetState::Closed] {
            assert_eq!(TargetState::from_tag(t.tag()), Some(t));
        }
        assert_eq!(TargetState::from_tag(7), None);
    }

    #[test]
    fn target_state_conversions() {
        assert_eq!(TargetState::Open.stable_state(), DoorState::Open);
        assert_eq!(TargetState::Open.transient_state(), DoorState::Opening);
        assert_eq!(TargetState::Closed.stable_state(), DoorState::Closed);
        assert_eq!(TargetState::Closed.transient_state(), DoorState::Closing);
        assert_eq!(DoorState::Opening.as_target(), TargetState::Open);
        assert_eq!(DoorState::Closing.as_target(), TargetState::Closed);
    }
}
