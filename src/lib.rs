//! DoorPilot firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod fsm;

// The adapter/driver modules carry cfg-gated hardware code with host
// simulation fallbacks, so they compile on every target.
pub mod adapters;
pub mod drivers;
