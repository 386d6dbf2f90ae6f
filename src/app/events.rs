//! Outbound application events.
//!
//! The [`Controller`](super::controller::Controller) emits these through
//! the [`EventSink`](super::ports::EventSink) port.

use crate::fsm::Phase;
use crate::ota::OtaStatus;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The controller has started (carries initial phase).
    Started(Phase),

    /// The lifecycle moved between phases.
    PhaseChanged { from: Phase, to: Phase },

    /// The OTA session changed status.
    OtaStatusChanged { from: OtaStatus, to: OtaStatus },

    /// The running image was confirmed to the bootloader.
    FirmwareConfirmed,

    /// A telemetry report was handed to the control channel.
    TelemetryPublished { ok: bool },
}
