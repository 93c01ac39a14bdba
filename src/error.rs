//! Unified error types for the DoorPilot firmware.
//!
//! Follows embedded best practice: a single `Error` enum that every subsystem
//! can convert into, keeping the top-level control loop's error handling uniform.
//! All variants are `Copy` so they can be cheaply passed through the door
//! service and FSM without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Actuator or sensor line I/O failed.
    Port(PortError),
    /// Persistence read/write failed.
    Store(StoreError),
    /// An inbound state report could not be parsed.
    Report(ReportError),
    /// Peripheral initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Port(e) => write!(f, "port: {e}"),
            Self::Store(e) => write!(f, "store: {e}"),
            Self::Report(e) => write!(f, "report: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Command rejection
// ---------------------------------------------------------------------------

/// A target-state command was refused by the door service.
///
/// This is not a fault: the caller is expected to re-publish the unchanged
/// target so the host's displayed intent stays in sync with reality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandRejected {
    /// The door is moving and command override is disabled.
    Busy,
}

impl fmt::Display for CommandRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "door is moving, command override disabled"),
        }
    }
}

// ---------------------------------------------------------------------------
// Actuator port errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortError {
    /// A control line GPIO write failed.
    LineWriteFailed,
    /// The position sensor GPIO read failed.
    SensorReadFailed,
    /// The pin could not be claimed or configured.
    PinUnavailable,
}

impl fmt::Display for PortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LineWriteFailed => write!(f, "control line write failed"),
            Self::SensorReadFailed => write!(f, "sensor read failed"),
            Self::PinUnavailable => write!(f, "pin unavailable"),
        }
    }
}

impl From<PortError> for Error {
    fn from(e: PortError) -> Self {
        Self::Port(e)
    }
}

// ---------------------------------------------------------------------------
// Durable store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
    /// Stored blob failed deserialization.
    Corrupted,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::Corrupted => write!(f, "stored data corrupted"),
        }
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

// ---------------------------------------------------------------------------
// External report errors
// ---------------------------------------------------------------------------

/// Rejection reasons for inbound webhook state reports.  These never reach
/// the door service — malformed reports are dropped at the adapter boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportError {
    /// Body is not valid JSON.
    NotJson,
    /// The configured JSON path does not exist in the body.
    PathMissing,
    /// The value at the path is not a boolean.
    NotBoolean,
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotJson => write!(f, "body is not valid JSON"),
            Self::PathMissing => write!(f, "JSON path not found"),
            Self::NotBoolean => write!(f, "value at path is not a boolean"),
        }
    }
}

impl From<ReportError> for Error {
    fn from(e: ReportError) -> Self {
        Self::Report(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
