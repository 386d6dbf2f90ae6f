//! Telemetry and diagnostics payloads.
//!
//! Field names follow the broker-side schema (`analyzerId`, `freeHeap`,
//! ...), hence the camelCase renames.

use serde::Serialize;

use crate::adapters::device_id::DeviceIdString;
use crate::error::CommsError;
use crate::fsm::Phase;

/// One pass of the environment sensors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SampleBatch {
    /// Air temperature (°C).
    pub temperature: f32,
    /// Relative humidity (%).
    pub humidity: f32,
    /// Dough rise relative to the initial surface height (%).
    pub rise: f32,
}

/// Periodic measurement published from `PublishingData`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryReport<'a> {
    pub analyzer_id: &'a str,
    /// Seconds since boot.
    pub uptime: u64,
    pub temperature: f32,
    pub humidity: f32,
    pub rise: f32,
}

impl<'a> TelemetryReport<'a> {
    pub fn new(analyzer_id: &'a DeviceIdString, uptime_ms: u64, batch: &SampleBatch) -> Self {
        Self {
            analyzer_id: analyzer_id.as_str(),
            uptime: uptime_ms / 1000,
            temperature: batch.temperature,
            humidity: batch.humidity,
            rise: batch.rise,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct WifiStatus {
    pub connected: bool,
    pub rssi: i8,
}

/// Answer to a diagnostics request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsReport<'a> {
    pub analyzer_id: &'a str,
    pub uptime: u64,
    pub free_heap: u32,
    pub state: &'static str,
    pub wifi: WifiStatus,
    pub sensors: Option<SampleBatch>,
}

impl<'a> DiagnosticsReport<'a> {
    pub fn new(
        analyzer_id: &'a DeviceIdString,
        uptime_ms: u64,
        free_heap: u32,
        phase: Phase,
        rssi: Option<i8>,
        last_reading: Option<SampleBatch>,
    ) -> Self {
        Self {
            analyzer_id: analyzer_id.as_str(),
            uptime: uptime_ms / 1000,
            free_heap,
            state: phase.name(),
            wifi: WifiStatus {
                connected: rssi.is_some(),
                rssi: rssi.unwrap_or(0),
            },
            sensors: last_reading,
        }
    }
}

/// Serialise any report to a JSON byte buffer.
pub fn to_json<T: Serialize>(report: &T) -> Result<Vec<u8>, CommsError> {
    serde_json::to_vec(report).map_err(|_| CommsError::EncodeFailed)
}
