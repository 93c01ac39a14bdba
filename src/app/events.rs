//! Structured events emitted by the door service.
//!
//! Events flow out through the [`EventSink`](super::ports::EventSink) port;
//! adapters decide where they go (serial log, HomeKit exposure, telemetry).

use crate::fsm::{DoorState, TargetState};

/// Domain events emitted by [`DoorService`](super::service::DoorService).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    /// Service started; carries the restored state pair so the exposure
    /// layer publishes the actual intent, not one inferred from position.
    Started {
        current: DoorState,
        target: TargetState,
    },
    /// The believed door state changed.
    StateChanged { from: DoorState, to: DoorState },
    /// A target command was accepted and a trigger pulse issued.
    TargetRequested(TargetState),
    /// A target command was refused; the carried value is the still-valid
    /// target the exposure layer must re-publish.
    CommandRejected(TargetState),
    /// An external truth source redefined the door state.
    ExternalReport(DoorState),
}
