//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (UART / USB-CDC in production).

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(phase) => {
                info!("START | phase={}", phase);
            }
            AppEvent::PhaseChanged { from, to } => {
                info!("PHASE | {} -> {}", from, to);
            }
            AppEvent::OtaStatusChanged { from, to } => {
                info!("OTA   | {:?} -> {:?}", from, to);
            }
            AppEvent::FirmwareConfirmed => {
                info!("OTA   | running image marked valid");
            }
            AppEvent::TelemetryPublished { ok: true } => {
                info!("TELEM | published");
            }
            AppEvent::TelemetryPublished { ok: false } => {
                warn!("TELEM | publish failed");
            }
        }
    }
}
