//! Application layer — hexagonal core of the door controller.
//!
//! [`service::DoorService`] owns the FSM and context; [`ports`] defines the
//! traits the outside world plugs into; [`events`] is the structured event
//! vocabulary the service emits.

pub mod events;
pub mod ports;
pub mod service;
