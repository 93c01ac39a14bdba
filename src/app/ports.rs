//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ DoorService (domain)
//! ```
//!
//! Driven adapters (relay board, NVS, event sinks) implement these traits.
//! The [`DoorService`](super::service::DoorService) consumes them via
//! generics, so the domain core never touches hardware directly and the
//! whole service runs under test with mock adapters.

use crate::config::SystemConfig;
use crate::error::{Error, PortError, StoreError};
use crate::fsm::ControlLine;

// ───────────────────────────────────────────────────────────────
// Persisted state keys
// ───────────────────────────────────────────────────────────────

/// Store key for the believed door state (may be a transient tag if power
/// was lost mid-travel).
pub const KEY_CURRENT_DOOR_STATE: &str = "current_door_state";
/// Store key for the last commanded target.
pub const KEY_TARGET_DOOR_STATE: &str = "target_door_state";

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port: the domain calls this to drive the operator's
/// momentary trigger inputs and read the position sensor.
///
/// `asserted` is the logical level; implementations map it to an
/// electrical level according to `reverse_output`.
pub trait ActuatorPort {
    /// Set a control line's logical assertion.
    fn write_line(&mut self, line: ControlLine, asserted: bool) -> Result<(), PortError>;

    /// Read the raw position-sensor level.
    fn read_sensor(&mut self) -> Result<bool, PortError>;
}

// ───────────────────────────────────────────────────────────────
// Durable store port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Single-byte key-value persistence for door state tags.
///
/// Writes MUST be atomic — no partial writes on power loss.  The ESP-IDF
/// NVS API guarantees this natively; in-memory simulation achieves it
/// trivially.
pub trait DurableStore {
    /// Read a tag.  `Ok(None)` means the key has never been written.
    fn get(&self, key: &str) -> Result<Option<u8>, StoreError>;

    /// Write a tag atomically.
    fn set(&mut self, key: &str, value: u8) -> Result<(), StoreError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / exposure)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go (serial log, the
/// HomeKit exposure characteristic, telemetry).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate values before persisting — a nonsense
/// pulse width or GPIO number is rejected, not clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, Error>;

    /// Validate and persist configuration.  Validation failures surface
    /// as [`Error::Config`], storage faults as [`Error::Store`].
    fn save(&self, config: &SystemConfig) -> Result<(), Error>;
}
