//! Hardware drivers (GPIO init, position sensor).

pub mod hw_init;
pub mod sensor_input;
