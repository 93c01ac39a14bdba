//! Shared mutable context (blackboard) threaded through every FSM handler.
//!
//! The context is plain data: the engine and the state handlers read and
//! write it, the door service copies the relevant outputs (line commands)
//! to the actuator port after each poll.  No I/O happens inside handlers.

use super::TargetState;
use crate::config::SystemConfig;

/// Desired assertion level of each control line.
///
/// `true` means "asserted" in the logical sense; the actuator adapter maps
/// this to an electrical level according to `reverse_output`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineCommands {
    pub open: bool,
    pub close: bool,
}

impl LineCommands {
    /// Release both lines.
    pub fn clear(&mut self) {
        self.open = false;
        self.close = false;
    }
}

/// Blackboard shared by all state handlers.
pub struct DoorContext {
    /// Monotonic time of the current poll, in milliseconds.
    pub now_ms: u64,

    /// Last commanded intent.  Transient states settle into
    /// `target.stable_state()`, so redefining this mid-travel redirects
    /// where the in-flight transition lands.
    pub target: TargetState,

    /// Line assertions requested by the FSM this poll.
    pub lines: LineCommands,

    /// When the trigger pulse must be released, if one is in flight.
    pub pulse_due: Option<u64>,
    /// When the current transient state settles, if one is in flight.
    pub settle_due: Option<u64>,

    // Timing parameters, copied out of config at startup.
    pub pulse_duration_ms: u32,
    pub travel_duration_ms: u64,
}

impl DoorContext {
    pub fn new(config: &SystemConfig, target: TargetState) -> Self {
        Self {
            now_ms: 0,
            target,
            lines: LineCommands::default(),
            pulse_due: None,
            settle_due: None,
            pulse_duration_ms: config.pulse_duration_ms,
            travel_duration_ms: config.travel_duration_ms(),
        }
    }

    /// Cancel any in-flight pulse and settle deadlines.
    pub fn clear_deadlines(&mut self) {
        self.pulse_due = None;
        self.settle_due = None;
    }

    /// Arm a fresh pulse/settle pair starting at the current poll time.
    pub fn arm_deadlines(&mut self) {
        self.pulse_due = Some(self.now_ms + u64::from(self.pulse_duration_ms));
        self.settle_due = Some(self.now_ms + self.travel_duration_ms);
    }
}
