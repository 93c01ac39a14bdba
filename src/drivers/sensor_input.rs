//! ISR-debounced position-sensor (reed contact) driver.
//!
//! ## Hardware
//!
//! Magnetic reed switch at the closed position, input with internal
//! pull-up.  GPIO fires on any edge; the ISR records the raw level and
//! timestamp into atomics, and the `tick()` method (called from the main
//! loop at control-tick rate) runs the debounce state machine.
//!
//! A mechanical contact near a moving door bounces badly; every new edge
//! inside the debounce window restarts it, so a level is only reported
//! once the contact has been quiet for the full window.

use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

const DEBOUNCE_MS: u32 = 50;

/// Raw ISR timestamp (milliseconds since boot, truncated to u32).
/// Written by the ISR, read by the main loop.
static SENSOR_ISR_TIMESTAMP: AtomicU32 = AtomicU32::new(0);
/// Raw level at the last ISR edge (0/1).
static SENSOR_ISR_LEVEL: AtomicU8 = AtomicU8::new(0);

/// Internal debounce state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DebounceState {
    Idle,
    Settling { since_ms: u32 },
}

pub struct SensorInput {
    gpio: i32,
    state: DebounceState,
    last_isr_ms: u32,
    last_reported: Option<bool>,
}

impl SensorInput {
    pub fn new(gpio: i32) -> Self {
        Self {
            gpio,
            state: DebounceState::Idle,
            last_isr_ms: 0,
            last_reported: None,
        }
    }

    /// GPIO pin this sensor is attached to.
    pub fn gpio(&self) -> i32 {
        self.gpio
    }

    /// Call from the main loop at each control tick.
    /// `now_ms` is the current monotonic time in milliseconds.
    /// Returns the debounced level when a stable edge is confirmed.
    pub fn tick(&mut self, now_ms: u32) -> Option<bool> {
        let isr_ms = SENSOR_ISR_TIMESTAMP.load(Ordering::Acquire);
        let new_edge = isr_ms != self.last_isr_ms && isr_ms != 0;

        match self.state {
            DebounceState::Idle => {
                if new_edge {
                    self.last_isr_ms = isr_ms;
                    self.state = DebounceState::Settling { since_ms: now_ms };
                }
                None
            }

            DebounceState::Settling { since_ms } => {
                if new_edge {
                    // Contact still bouncing — restart the quiet window.
                    self.last_isr_ms = isr_ms;
                    self.state = DebounceState::Settling { since_ms: now_ms };
                    return None;
                }

                if now_ms.wrapping_sub(since_ms) >= DEBOUNCE_MS {
                    self.state = DebounceState::Idle;
                    let level = SENSOR_ISR_LEVEL.load(Ordering::Acquire) != 0;
                    if self.last_reported != Some(level) {
                        self.last_reported = Some(level);
                        return Some(level);
                    }
                }
                None
            }
        }
    }
}

/// ISR handler — register this on the sensor GPIO for any edge.
/// Safe to call from interrupt context (lock-free atomic stores).
#[allow(unused)]
pub fn sensor_isr_handler(level: bool, now_ms: u32) {
    SENSOR_ISR_LEVEL.store(u8::from(level), Ordering::Relaxed);
    SENSOR_ISR_TIMESTAMP.store(now_ms, Ordering::Release);
}
