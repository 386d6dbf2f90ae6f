//! Per-device topic names.
//!
//! Every topic lives under `analyzer/{device_id}/`.

use core::fmt::Write;

pub type TopicString = heapless::String<64>;

/// All topics the device publishes to or subscribes on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub telemetry: TopicString,
    pub diagnostics_request: TopicString,
    pub diagnostics_response: TopicString,
    pub ota_start: TopicString,
    pub ota_chunk: TopicString,
    pub ota_status: TopicString,
}

impl Topics {
    pub fn new(device_id: &str) -> Self {
        Self {
            telemetry: topic(device_id, "telemetry"),
            diagnostics_request: topic(device_id, "diagnostics/request"),
            diagnostics_response: topic(device_id, "diagnostics/response"),
            ota_start: topic(device_id, "ota/start"),
            ota_chunk: topic(device_id, "ota/chunk"),
            ota_status: topic(device_id, "ota/status"),
        }
    }

    /// Topics that must be (re)subscribed after every connect.
    pub fn subscriptions(&self) -> [&str; 3] {
        [
            self.ota_start.as_str(),
            self.ota_chunk.as_str(),
            self.diagnostics_request.as_str(),
        ]
    }
}

fn topic(device_id: &str, leaf: &str) -> TopicString {
    let mut s = TopicString::new();
    // Device ids are short; a truncated topic would only fail to match.
    let _ = write!(s, "analyzer/{}/{}", device_id, leaf);
    s
}
