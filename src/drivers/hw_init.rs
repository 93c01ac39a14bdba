//! One-shot hardware peripheral initialization.
//!
//! Configures the control-line output GPIOs and the optional position
//! sensor input using raw ESP-IDF sys calls.  Called once from `main()`
//! before the event loop starts.  Pins come from [`SystemConfig`] rather
//! than compile-time constants so one binary serves different boards.

use crate::config::SystemConfig;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed(i32),
    IsrInstallFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
        }
    }
}

// ── GPIO init ─────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub fn init_peripherals(config: &SystemConfig) -> Result<(), HwInitError> {
    // The released (idle) electrical level: relays are wired so that the
    // non-asserted level follows reverse_output.
    let idle_level = u32::from(config.reverse_output);

    let mut output_pins = [Some(config.open_line_gpio), Some(config.close_line_gpio)];
    // Single-button operators alias both lines onto one pin.
    if config.close_line_gpio == config.open_line_gpio {
        output_pins[1] = None;
    }

    for pin in output_pins.into_iter().flatten() {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_OUTPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        // SAFETY: called once from main() before the event loop; single-threaded.
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
        unsafe {
            gpio_set_level(pin, idle_level);
        }
    }

    if config.sensor_input_enabled {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << config.sensor_gpio,
            mode: gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_ANYEDGE,
        };
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
    }

    info!(
        "hw_init: GPIO configured (open={}, close={}, sensor={})",
        config.open_line_gpio,
        config.close_line_gpio,
        if config.sensor_input_enabled {
            config.sensor_gpio
        } else {
            -1
        }
    );
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals(_config: &SystemConfig) -> Result<(), HwInitError> {
    log::info!("hw_init(sim): peripheral init skipped");
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_write(pin: i32, high: bool) {
    // SAFETY: gpio_set_level writes to an already-configured output pin;
    // pin was validated during init_peripherals(). Main-loop only.
    unsafe {
        gpio_set_level(pin, u32::from(high));
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_write(_pin: i32, _high: bool) {}

#[cfg(target_os = "espidf")]
pub fn gpio_read(pin: i32) -> bool {
    // SAFETY: gpio_get_level is a read-only register access on an
    // already-configured input pin; safe to call from main context.
    (unsafe { gpio_get_level(pin) }) != 0
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_read(_pin: i32) -> bool {
    false
}

// ── GPIO ISR Service ──────────────────────────────────────────

#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicI32, Ordering};

/// Sensor pin captured at init so the ISR can re-read its level.
#[cfg(target_os = "espidf")]
static SENSOR_GPIO_PIN: AtomicI32 = AtomicI32::new(-1);

#[cfg(target_os = "espidf")]
unsafe extern "C" fn sensor_gpio_isr(_arg: *mut core::ffi::c_void) {
    let pin = SENSOR_GPIO_PIN.load(Ordering::Relaxed);
    if pin < 0 {
        return;
    }
    // SAFETY: gpio_get_level / esp_timer_get_time are register reads;
    // safe in ISR context.
    let level = unsafe { gpio_get_level(pin) } != 0;
    let now_ms = (unsafe { esp_timer_get_time() } / 1_000) as u32;
    crate::drivers::sensor_input::sensor_isr_handler(level, now_ms);
}

/// Install the GPIO ISR service and register the sensor edge handler.
/// Call after `init_peripherals()` and before the event loop.  A no-op
/// when the sensor input is disabled.
#[cfg(target_os = "espidf")]
pub fn init_isr_service(config: &SystemConfig) -> Result<(), HwInitError> {
    if !config.sensor_input_enabled {
        return Ok(());
    }

    SENSOR_GPIO_PIN.store(config.sensor_gpio, Ordering::Relaxed);

    // SAFETY: gpio_install_isr_service is idempotent; ESP_ERR_INVALID_STATE
    // means it was already installed (acceptable).  The registered handler
    // only touches lock-free atomics.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK && ret != ESP_ERR_INVALID_STATE {
            return Err(HwInitError::IsrInstallFailed(ret));
        }

        gpio_isr_handler_add(
            config.sensor_gpio,
            Some(sensor_gpio_isr),
            core::ptr::null_mut(),
        );
        gpio_intr_enable(config.sensor_gpio);

        // Seed the level atomics with the current reading so the first
        // debounced report reflects reality even before an edge fires.
        let level = gpio_get_level(config.sensor_gpio) != 0;
        let now_ms = (esp_timer_get_time() / 1_000) as u32;
        crate::drivers::sensor_input::sensor_isr_handler(level, now_ms);

        info!("hw_init: sensor ISR installed on GPIO {}", config.sensor_gpio);
    }
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_isr_service(_config: &SystemConfig) -> Result<(), HwInitError> {
    log::info!("hw_init(sim): ISR service skipped");
    Ok(())
}
