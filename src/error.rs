//! Unified error types for the BrodBuddy firmware.
//!
//! `Error` is what the control loop and bootstrap see: inbound message
//! handling, sampling and configuration funnel into it with `?`.  Flash
//! and platform errors stay local; the OTA manager maps flash failures to
//! an [`OtaError`] and platform failures are handled where they happen.
//! All variants are `Copy` so they can be passed around the control loop
//! without allocation.

use core::fmt;

use crate::config::ConfigError;
use crate::ota::OtaError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Failures surfaced by the control loop and bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The OTA updater rejected or aborted an update.
    Ota(OtaError),
    /// An inbound message could not be decoded.
    Decode(DecodeError),
    /// A communication subsystem failed.
    Comms(CommsError),
    /// A sensor could not be read.
    Sensor(SensorError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ota(e) => write!(f, "ota: {e}"),
            Self::Decode(e) => write!(f, "decode: {e}"),
            Self::Comms(e) => write!(f, "comms: {e}"),
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<OtaError> for Error {
    fn from(e: OtaError) -> Self {
        Self::Ota(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Firmware store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    /// No inactive partition could be opened for writing.
    NoPartition,
    /// A write would run past the end of the partition.
    OutOfSpace,
    /// The underlying flash write failed.
    WriteFailed,
    /// The image could not be sealed (bad header or verification error).
    SealFailed,
    /// The partition table could not be updated.
    BootSetFailed,
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPartition => write!(f, "no inactive partition"),
            Self::OutOfSpace => write!(f, "write past end of partition"),
            Self::WriteFailed => write!(f, "flash write failed"),
            Self::SealFailed => write!(f, "image seal failed"),
            Self::BootSetFailed => write!(f, "set boot partition failed"),
        }
    }
}


// ---------------------------------------------------------------------------
// Decode errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Chunk frame shorter than its fixed header.
    Truncated,
    /// Announcement JSON was malformed or missing fields.
    InvalidJson,
    /// Announcement version string exceeded its fixed capacity.
    VersionTooLong,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "frame shorter than chunk header"),
            Self::InvalidJson => write!(f, "malformed announcement"),
            Self::VersionTooLong => write!(f, "version string too long"),
        }
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

// ---------------------------------------------------------------------------
// Communications errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsError {
    MqttSubscribeFailed,
    MqttPublishFailed,
    /// Outbound payload could not be serialised.
    EncodeFailed,
}

impl fmt::Display for CommsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MqttSubscribeFailed => write!(f, "MQTT subscribe failed"),
            Self::MqttPublishFailed => write!(f, "MQTT publish failed"),
            Self::EncodeFailed => write!(f, "payload encode failed"),
        }
    }
}

impl From<CommsError> for Error {
    fn from(e: CommsError) -> Self {
        Self::Comms(e)
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// The bus transaction failed or timed out.
    ReadFailed,
    /// Reading is outside the physically plausible range.
    OutOfRange,
    /// No sensor driver is fitted in this build.
    NotFitted,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed => write!(f, "sensor read failed"),
            Self::OutOfRange => write!(f, "reading out of range"),
            Self::NotFitted => write!(f, "no sensor driver fitted"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Platform errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformError {
    /// The bootloader refused the mark-valid confirmation.
    MarkValidFailed,
    /// The wake-up timer could not be armed.
    SleepFailed,
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarkValidFailed => write!(f, "mark app valid failed"),
            Self::SleepFailed => write!(f, "light sleep failed"),
        }
    }
}


// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
