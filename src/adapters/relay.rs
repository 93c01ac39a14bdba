//! Relay adapter — bridges the operator's trigger inputs to [`ActuatorPort`].
//!
//! Owns the two control-line output GPIOs and the optional position-sensor
//! input.  This is the only module that translates logical line assertion
//! into electrical levels: with `reverse_output` the board is active-low
//! and "asserted" drives the pin low.
//!
//! On non-espidf targets the writes go nowhere but the last electrical
//! levels are recorded, which the simulation loop and tests read back.

use log::debug;

use crate::app::ports::ActuatorPort;
use crate::config::SystemConfig;
use crate::drivers::hw_init;
use crate::error::PortError;
use crate::fsm::ControlLine;

/// Concrete actuator adapter over raw GPIO.
pub struct RelayAdapter {
    open_gpio: i32,
    close_gpio: i32,
    sensor_gpio: i32,
    /// Electrical level that means "asserted".
    active_level: bool,
    /// Last electrical level driven on each line (open, close).
    levels: [bool; 2],
}

impl RelayAdapter {
    pub fn new(config: &SystemConfig) -> Self {
        let active_level = !config.reverse_output;
        Self {
            open_gpio: config.open_line_gpio,
            close_gpio: config.close_line_gpio,
            sensor_gpio: config.sensor_gpio,
            active_level,
            // init_peripherals drives both pins to the released level.
            levels: [!active_level; 2],
        }
    }

    /// Last electrical level driven on a line (for the simulation loop).
    pub fn line_level(&self, line: ControlLine) -> bool {
        self.levels[Self::index(line)]
    }

    /// Whether a line is logically asserted right now.
    pub fn line_asserted(&self, line: ControlLine) -> bool {
        self.line_level(line) == self.active_level
    }

    fn index(line: ControlLine) -> usize {
        match line {
            ControlLine::Open => 0,
            ControlLine::Close => 1,
        }
    }

    fn pin(&self, line: ControlLine) -> i32 {
        match line {
            ControlLine::Open => self.open_gpio,
            ControlLine::Close => self.close_gpio,
        }
    }
}

impl ActuatorPort for RelayAdapter {
    fn write_line(&mut self, line: ControlLine, asserted: bool) -> Result<(), PortError> {
        let level = if asserted {
            self.active_level
        } else {
            !self.active_level
        };
        hw_init::gpio_write(self.pin(line), level);
        self.levels[Self::index(line)] = level;
        debug!(
            "relay: {:?} line {} (gpio {} = {})",
            line,
            if asserted { "asserted" } else { "released" },
            self.pin(line),
            u8::from(level),
        );
        Ok(())
    }

    fn read_sensor(&mut self) -> Result<bool, PortError> {
        Ok(hw_init::gpio_read(self.sensor_gpio))
    }
}
