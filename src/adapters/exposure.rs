//! Capability exposure adapter — publishes controller state to the host.
//!
//! The host (HomeKit bridge or similar) mirrors two characteristics:
//! the current door state and the target door state, using the standard
//! tag vocabulary (`Open=0, Closed=1, Opening=2, Closing=3` and
//! `Open=0, Closed=1`).  [`HostPort`] is the outbound half of that
//! surface; the inbound half (set-target, webhook) arrives through the
//! event queue.
//!
//! The adapter is an [`EventSink`]: it watches the domain event stream
//! and pushes characteristic updates.  A rejected command re-publishes
//! the unchanged target immediately so the host UI snaps back instead of
//! showing an intent the controller refused.

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::fsm::{DoorState, TargetState};

/// Outbound characteristic publication surface.
pub trait HostPort {
    fn publish_current(&mut self, state: DoorState);
    fn publish_target(&mut self, target: TargetState);
    fn publish_obstruction(&mut self, obstructed: bool);
}

/// Translates domain events into characteristic updates.
pub struct ExposureAdapter<P: HostPort> {
    port: P,
    last_current: Option<DoorState>,
    last_target: Option<TargetState>,
}

impl<P: HostPort> ExposureAdapter<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            last_current: None,
            last_target: None,
        }
    }

    /// Last published current state (for read-back by the host glue).
    pub fn last_current(&self) -> Option<DoorState> {
        self.last_current
    }

    /// Last published target (for read-back by the host glue).
    pub fn last_target(&self) -> Option<TargetState> {
        self.last_target
    }
}

impl<P: HostPort> EventSink for ExposureAdapter<P> {
    fn emit(&mut self, event: &AppEvent) {
        match *event {
            AppEvent::Started { current, target } => {
                self.port.publish_current(current);
                self.port.publish_target(target);
                self.port.publish_obstruction(false);
                self.last_current = Some(current);
                self.last_target = Some(target);
            }
            AppEvent::StateChanged { to, .. } => {
                self.port.publish_current(to);
                self.last_current = Some(to);
            }
            AppEvent::TargetRequested(target) | AppEvent::CommandRejected(target) => {
                // Publishing on rejection is deliberate even when the value
                // is unchanged: the host UI already flipped optimistically
                // and needs the snap-back.
                self.port.publish_target(target);
                self.last_target = Some(target);
            }
            AppEvent::ExternalReport(observed) => {
                self.port.publish_current(observed);
                self.port.publish_target(observed.as_target());
                self.last_current = Some(observed);
                self.last_target = Some(observed.as_target());
            }
        }
    }
}

/// Inbound set-target from the host, by wire tag.
///
/// Pushed onto the event queue rather than applied directly — the main
/// loop is the only mutator of the door service.  Returns `false` when
/// the tag is invalid or the queue is full.
pub fn accept_target_tag(tag: u8) -> bool {
    match TargetState::from_tag(tag) {
        Some(target) => crate::events::push_event(crate::events::Event::TargetCommand(target)),
        None => {
            log::warn!("invalid target tag from host: {tag}");
            false
        }
    }
}

/// Host port that logs characteristic updates with their wire tags.
pub struct LogHostPort;

impl HostPort for LogHostPort {
    fn publish_current(&mut self, state: DoorState) {
        log::info!("HOST  | current={:?} (tag {})", state, state.tag());
    }

    fn publish_target(&mut self, target: TargetState) {
        log::info!("HOST  | target={:?} (tag {})", target, target.tag());
    }

    fn publish_obstruction(&mut self, obstructed: bool) {
        log::info!("HOST  | obstruction={}", obstructed);
    }
}
