//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).

use log::info;

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { current, target } => {
                info!("START | current={:?} target={:?}", current, target);
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            AppEvent::TargetRequested(target) => {
                info!("CMD   | target={:?}", target);
            }
            AppEvent::CommandRejected(target) => {
                info!("CMD   | rejected, holding target={:?}", target);
            }
            AppEvent::ExternalReport(observed) => {
                info!("EXT   | observed={:?}", observed);
            }
        }
    }
}
