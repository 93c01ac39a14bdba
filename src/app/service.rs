//! Door service — the hexagonal core.
//!
//! [`DoorService`] owns the FSM and shared context and exposes a clean,
//! hardware-agnostic API.  All I/O flows through port traits injected at
//! call sites, making the entire service testable with mock adapters.
//!
//! ```text
//!  commands ──▶ ┌────────────────────────┐ ──▶ EventSink
//!  reports  ──▶ │       DoorService       │ ──▶ ActuatorPort
//!  poll     ──▶ │   FSM · deadlines       │ ──▶ DurableStore
//!               └────────────────────────┘
//! ```
//!
//! Ordering rules the service enforces:
//!
//! - State is persisted **before** the trigger pulse reaches the relay, so
//!   a power loss mid-pulse restores into the transient state and resumes.
//! - An external truth report always wins: it collapses any in-flight
//!   transition, redefines the target, and is persisted immediately.
//! - A refused command emits [`AppEvent::CommandRejected`] carrying the
//!   unchanged target so the exposure layer can re-publish it.

use log::{info, warn};

use crate::config::SystemConfig;
use crate::error::CommandRejected;
use crate::fsm::context::{DoorContext, LineCommands};
use crate::fsm::states::build_state_table;
use crate::fsm::{ControlLine, DoorFsm, DoorState, TargetState};

use super::events::AppEvent;
use super::ports::{
    ActuatorPort, DurableStore, EventSink, KEY_CURRENT_DOOR_STATE, KEY_TARGET_DOOR_STATE,
};

// ───────────────────────────────────────────────────────────────
// DoorService
// ───────────────────────────────────────────────────────────────

/// Orchestrates the door state machine against the injected ports.
pub struct DoorService {
    fsm: DoorFsm,
    ctx: DoorContext,
    /// Line levels last successfully written to the actuator port.
    applied: LineCommands,
    allow_command_override: bool,
    sensor_input_enabled: bool,
    sensor_input_reverse: bool,
}

impl DoorService {
    /// Construct the service with an explicit starting state.
    ///
    /// Does **not** run the FSM's entry action — call [`start`](Self::start)
    /// next, after the actuator port is ready.
    pub fn new(config: &SystemConfig, current: DoorState, target: TargetState) -> Self {
        let ctx = DoorContext::new(config, target);
        let fsm = DoorFsm::new(build_state_table(), current);
        Self {
            fsm,
            ctx,
            applied: LineCommands::default(),
            allow_command_override: config.allow_command_override,
            sensor_input_enabled: config.sensor_input_enabled,
            sensor_input_reverse: config.sensor_input_reverse,
        }
    }

    /// Recover the last persisted state pair from the store.
    ///
    /// Fallback chain when keys are missing or corrupt: the current state
    /// defaults to the stable form of the stored target, then to `Closed`;
    /// the target defaults to whatever intent the current state implies.
    pub fn restore(store: &impl DurableStore) -> (DoorState, TargetState) {
        let stored_target = match store.get(KEY_TARGET_DOOR_STATE) {
            Ok(tag) => tag.and_then(TargetState::from_tag),
            Err(e) => {
                warn!("target state restore failed: {e}");
                None
            }
        };
        let stored_current = match store.get(KEY_CURRENT_DOOR_STATE) {
            Ok(tag) => tag.and_then(DoorState::from_tag),
            Err(e) => {
                warn!("current state restore failed: {e}");
                None
            }
        };

        let current = stored_current
            .or(stored_target.map(TargetState::stable_state))
            .unwrap_or(DoorState::Closed);
        let target = stored_target.unwrap_or(current.as_target());

        info!("restored state: current={current:?} target={target:?}");
        (current, target)
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Run the FSM's initial entry action and resume any interrupted move.
    ///
    /// Starting in a transient state re-issues the trigger pulse for it.
    /// Starting in a stable state that disagrees with the restored target
    /// begins a fresh transition toward that target.
    pub fn start(
        &mut self,
        now_ms: u64,
        hw: &mut impl ActuatorPort,
        store: &mut impl DurableStore,
        sink: &mut impl EventSink,
    ) {
        self.ctx.now_ms = now_ms;
        self.fsm.start(&mut self.ctx);
        let current = self.fsm.current_state();
        sink.emit(&AppEvent::Started {
            current,
            target: self.ctx.target,
        });

        if current.is_stable() && current != self.ctx.target.stable_state() {
            info!(
                "resuming interrupted move: {current:?} -> {:?}",
                self.ctx.target
            );
            self.fsm
                .force_transition(self.ctx.target.transient_state(), &mut self.ctx);
            sink.emit(&AppEvent::StateChanged {
                from: current,
                to: self.fsm.current_state(),
            });
        }

        self.persist(store);
        self.apply_lines(hw);
    }

    // ── Commands ──────────────────────────────────────────────

    /// Handle a target-state command from the exposure layer.
    ///
    /// While a transition is in flight and override is disabled, the
    /// command is refused and the unchanged target re-published via
    /// [`AppEvent::CommandRejected`].  Otherwise the target is redefined
    /// and a fresh trigger pulse issued — including when the door already
    /// rests at the requested position, since some operators interpret
    /// the pulse (stop, re-latch) even then.
    pub fn request_target(
        &mut self,
        target: TargetState,
        now_ms: u64,
        hw: &mut impl ActuatorPort,
        store: &mut impl DurableStore,
        sink: &mut impl EventSink,
    ) -> Result<(), CommandRejected> {
        self.ctx.now_ms = now_ms;
        let prev = self.fsm.current_state();

        if !prev.is_stable() && !self.allow_command_override {
            warn!("command {target:?} refused: door is moving");
            sink.emit(&AppEvent::CommandRejected(self.ctx.target));
            return Err(CommandRejected::Busy);
        }

        info!("target command accepted: {target:?}");
        self.ctx.target = target;
        self.fsm
            .force_transition(target.transient_state(), &mut self.ctx);

        // Persist before the pulse reaches the relay.
        self.persist(store);

        sink.emit(&AppEvent::TargetRequested(target));
        let now = self.fsm.current_state();
        if now != prev {
            sink.emit(&AppEvent::StateChanged { from: prev, to: now });
        }

        self.apply_lines(hw);
        Ok(())
    }

    // ── External truth sources ────────────────────────────────

    /// Accept an authoritative observation of the real door position.
    ///
    /// Only stable observations are meaningful; transient values are
    /// dropped with a warning.  An accepted report collapses any in-flight
    /// transition, redefines the target to match, and persists.
    pub fn on_external_report(
        &mut self,
        observed: DoorState,
        now_ms: u64,
        hw: &mut impl ActuatorPort,
        store: &mut impl DurableStore,
        sink: &mut impl EventSink,
    ) {
        self.ctx.now_ms = now_ms;
        if !observed.is_stable() {
            warn!("ignoring transient external report: {observed:?}");
            return;
        }

        let prev = self.fsm.current_state();
        info!("external report: door is {observed:?}");

        self.ctx.target = observed.as_target();
        self.fsm.force_transition(observed, &mut self.ctx);
        self.persist(store);

        sink.emit(&AppEvent::ExternalReport(observed));
        if prev != observed {
            sink.emit(&AppEvent::StateChanged {
                from: prev,
                to: observed,
            });
        }

        self.apply_lines(hw);
    }

    /// Handle a debounced position-sensor edge.
    ///
    /// The raw level maps to a stable observation (`high` means closed
    /// unless `sensor_input_reverse` flips it) and feeds the same path as
    /// any other external report.
    pub fn on_sensor_edge(
        &mut self,
        level: bool,
        now_ms: u64,
        hw: &mut impl ActuatorPort,
        store: &mut impl DurableStore,
        sink: &mut impl EventSink,
    ) {
        if !self.sensor_input_enabled {
            return;
        }
        let effective = level != self.sensor_input_reverse;
        let observed = if effective {
            DoorState::Closed
        } else {
            DoorState::Open
        };
        self.on_external_report(observed, now_ms, hw, store, sink);
    }

    // ── Per-poll orchestration ────────────────────────────────

    /// Advance time and fire any due deadlines.
    ///
    /// `now_ms` is the monotonic clock; deadlines resolve on the first
    /// poll at or after their due time.
    pub fn poll(
        &mut self,
        now_ms: u64,
        hw: &mut impl ActuatorPort,
        store: &mut impl DurableStore,
        sink: &mut impl EventSink,
    ) {
        self.ctx.now_ms = now_ms;
        let prev = self.fsm.current_state();

        self.fsm.tick(&mut self.ctx);

        let now = self.fsm.current_state();
        if now != prev {
            self.persist(store);
            sink.emit(&AppEvent::StateChanged { from: prev, to: now });
        }

        self.apply_lines(hw);
    }

    // ── Queries ───────────────────────────────────────────────

    /// Believed door state.
    pub fn current_state(&self) -> DoorState {
        self.fsm.current_state()
    }

    /// Last commanded intent.
    pub fn target_state(&self) -> TargetState {
        self.ctx.target
    }

    /// Whether a transition is currently in flight.
    pub fn is_moving(&self) -> bool {
        !self.fsm.current_state().is_stable()
    }

    /// Obstruction is not sensed by this hardware; always `false`.
    /// Exposed because the host protocol requires the characteristic.
    pub fn obstruction_detected(&self) -> bool {
        false
    }

    // ── Internal ──────────────────────────────────────────────

    /// Push the FSM's requested line levels out through the actuator port.
    ///
    /// Only changed lines are written.  A failed write is logged and left
    /// pending so the next poll retries it; the believed state is not
    /// rolled back.
    fn apply_lines(&mut self, hw: &mut impl ActuatorPort) {
        let wanted = self.ctx.lines;

        if wanted.open != self.applied.open {
            match hw.write_line(ControlLine::Open, wanted.open) {
                Ok(()) => self.applied.open = wanted.open,
                Err(e) => warn!("open line write failed: {e}"),
            }
        }
        if wanted.close != self.applied.close {
            match hw.write_line(ControlLine::Close, wanted.close) {
                Ok(()) => self.applied.close = wanted.close,
                Err(e) => warn!("close line write failed: {e}"),
            }
        }
    }

    /// Best-effort persistence of the state pair.  A store failure is
    /// logged and operation continues with the in-memory state.
    fn persist(&self, store: &mut impl DurableStore) {
        let current = self.fsm.current_state();
        if let Err(e) = store.set(KEY_CURRENT_DOOR_STATE, current.tag()) {
            warn!("persisting current state failed: {e}");
        }
        if let Err(e) = store.set(KEY_TARGET_DOOR_STATE, self.ctx.target.tag()) {
            warn!("persisting target state failed: {e}");
        }
    }
}
