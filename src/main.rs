//! DoorPilot Firmware — Main Entry Point
//!
//! Hexagonal architecture with event-driven execution.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Adapters (outer ring)                    │
//! │                                                              │
//! │  RelayAdapter    LogEventSink    NvsAdapter    TimeAdapter   │
//! │  (ActuatorPort)  (EventSink)     (Config+KV)   (clock)       │
//! │  ExposureAdapter (EventSink → host characteristics)          │
//! │                                                              │
//! │  ─────────────── Port Trait Boundary ────────────────────    │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────┐      │
//! │  │            DoorService (pure logic)                │      │
//! │  │  FSM · pulse/settle deadlines · reconciliation     │      │
//! │  └────────────────────────────────────────────────────┘      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::{Context, Result};
use log::{debug, info, warn};

use doorpilot::adapters::exposure::{ExposureAdapter, LogHostPort};
use doorpilot::adapters::log_sink::LogEventSink;
use doorpilot::adapters::nvs::NvsAdapter;
use doorpilot::adapters::relay::RelayAdapter;
use doorpilot::adapters::time::TimeAdapter;
use doorpilot::app::events::AppEvent;
use doorpilot::app::ports::{ConfigPort, EventSink};
use doorpilot::app::service::DoorService;
use doorpilot::config::SystemConfig;
use doorpilot::drivers::hw_init;
use doorpilot::drivers::sensor_input::SensorInput;
use doorpilot::events::{self, push_event, Event};

// ── Event sink fan-out ────────────────────────────────────────
//
// The serial log and the host exposure layer both watch the domain
// event stream; this glue forwards every event to both.

struct Sinks {
    log: LogEventSink,
    exposure: ExposureAdapter<LogHostPort>,
}

impl EventSink for Sinks {
    fn emit(&mut self, event: &AppEvent) {
        self.log.emit(event);
        self.exposure.emit(event);
    }
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_logger::init()?;
    }
    #[cfg(not(target_os = "espidf"))]
    env_logger_fallback();

    info!("DoorPilot v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let mut nvs = NvsAdapter::new().context("NVS init failed")?;
    let config = match nvs.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({e}), using defaults");
            SystemConfig::default()
        }
    };

    // ── 3. Initialise hardware peripherals ────────────────────
    if let Err(e) = hw_init::init_peripherals(&config) {
        // Peripheral init failure is critical — log and halt.
        // In production this triggers the watchdog reset after timeout.
        log::error!("GPIO init failed: {e} — halting");
        #[allow(clippy::empty_loop)]
        loop {}
    }
    if let Err(e) = hw_init::init_isr_service(&config) {
        log::error!("ISR service init failed: {e} — continuing without sensor");
    }

    // ── 4. Construct adapters ─────────────────────────────────
    let time = TimeAdapter::new();
    let mut relay = RelayAdapter::new(&config);
    let mut sensor = SensorInput::new(config.sensor_gpio);
    let mut sinks = Sinks {
        log: LogEventSink::new(),
        exposure: ExposureAdapter::new(LogHostPort),
    };

    // ── 5. Restore state and start the door service ───────────
    let (current, target) = DoorService::restore(&nvs);
    let mut service = DoorService::new(&config, current, target);
    service.start(time.uptime_ms(), &mut relay, &mut nvs, &mut sinks);

    info!("System ready. Entering event loop.");

    // ── 6. Event loop ─────────────────────────────────────────
    loop {
        #[cfg(target_os = "espidf")]
        esp_idf_hal::delay::FreeRtos::delay_ms(config.control_loop_interval_ms);
        #[cfg(not(target_os = "espidf"))]
        std::thread::sleep(std::time::Duration::from_millis(
            u64::from(config.control_loop_interval_ms),
        ));

        push_event(Event::ControlTick);

        // Sensor debounce runs outside drain_events since it reads its
        // own atomics.
        if let Some(level) = sensor.tick(time.uptime_ms() as u32) {
            push_event(Event::SensorEdge(level));
        }

        // Process all pending events.
        events::drain_events(|event| {
            let now_ms = time.uptime_ms();
            match event {
                Event::ControlTick => {
                    service.poll(now_ms, &mut relay, &mut nvs, &mut sinks);
                }
                Event::TargetCommand(t) => {
                    // A rejection is already logged and re-published by
                    // the service; nothing more to do here.
                    if let Err(e) = service.request_target(t, now_ms, &mut relay, &mut nvs, &mut sinks)
                    {
                        debug!("target command dropped: {e}");
                    }
                }
                Event::ExternalReport(observed) => {
                    service.on_external_report(observed, now_ms, &mut relay, &mut nvs, &mut sinks);
                }
                Event::SensorEdge(level) => {
                    service.on_sensor_edge(level, now_ms, &mut relay, &mut nvs, &mut sinks);
                }
            }
        });
    }
}

/// Minimal logger setup for host-side simulation runs.
#[cfg(not(target_os = "espidf"))]
fn env_logger_fallback() {
    // The log facade silently drops records without a logger; for the
    // simulation build stderr output is enough.
    struct StderrLogger;
    impl log::Log for StderrLogger {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            true
        }
        fn log(&self, record: &log::Record) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
        fn flush(&self) {}
    }
    static LOGGER: StderrLogger = StderrLogger;
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(log::LevelFilter::Info);
}
