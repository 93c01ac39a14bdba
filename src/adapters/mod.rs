//! Driven adapters — concrete implementations of the port traits.

pub mod exposure;
pub mod log_sink;
pub mod nvs;
pub mod relay;
pub mod time;
pub mod webhook;
