//! System configuration parameters
//!
//! All tunable parameters for the DoorPilot controller.
//! Values can be overridden via NVS (non-volatile storage); everything is
//! read once at startup and treated as immutable for the process lifetime.

use serde::{Deserialize, Serialize};

/// Maximum length of the webhook JSON path expression.
pub const JSON_PATH_MAX: usize = 64;

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Control lines ---
    /// GPIO driving the "open" trigger relay.
    pub open_line_gpio: i32,
    /// GPIO driving the "close" trigger relay.  May alias `open_line_gpio`
    /// on single-button operators that toggle on every pulse.
    pub close_line_gpio: i32,
    /// Invert the electrical sense of "asserted" (active-low relay boards).
    pub reverse_output: bool,

    // --- Timing ---
    /// Relay trigger pulse width (milliseconds).
    pub pulse_duration_ms: u32,
    /// Full door travel time from commanded to settled (seconds).
    pub travel_duration_secs: u16,
    /// Main loop poll interval (milliseconds).
    pub control_loop_interval_ms: u32,

    // --- Command policy ---
    /// Accept a new target while the door is still moving.
    pub allow_command_override: bool,

    // --- Position sensor ---
    /// Enable the reed-switch position sensor input.
    pub sensor_input_enabled: bool,
    /// GPIO the position sensor is attached to.
    pub sensor_gpio: i32,
    /// Invert the sensor level (normally-open switches).
    pub sensor_input_reverse: bool,

    // --- Webhook ---
    /// Dotted path to the boolean door-state field in the webhook body,
    /// e.g. `"garage.door_open"`.
    pub webhook_json_path: heapless::String<JSON_PATH_MAX>,
    /// Invert the webhook boolean (true means closed instead of open).
    pub webhook_reverse: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Control lines
            open_line_gpio: 25,
            close_line_gpio: 26,
            reverse_output: false,

            // Timing
            pulse_duration_ms: 200,
            travel_duration_secs: 10,
            control_loop_interval_ms: 50,

            // Command policy
            allow_command_override: false,

            // Position sensor
            sensor_input_enabled: false,
            sensor_gpio: 27,
            sensor_input_reverse: false,

            // Webhook
            webhook_json_path: heapless::String::try_from("door_open")
                .unwrap_or_default(),
            webhook_reverse: false,
        }
    }
}

impl SystemConfig {
    /// Travel duration in milliseconds (the unit the FSM deadlines use).
    pub fn travel_duration_ms(&self) -> u64 {
        u64::from(self.travel_duration_secs) * 1000
    }
}
