//! Over-the-air firmware update over the control channel.
//!
//! Flow: announcement → N × chunk → CRC check → activate → delayed reboot
//!
//! ```text
//!            start_update            all bytes in         CRC ok
//!   Idle ───────────────▶ Downloading ───────────▶ Applying ──────▶ Complete
//!    ▲                        │                       │                │
//!    │                 timeout / size /         CRC mismatch      reboot delay
//!    │                 stall / write                  │                ▼
//!    │                        ▼                       ▼            Rebooting
//!    └─── start_update ──── Error ◀───────────────────┘
//! ```
//!
//! The inactive partition is held by the session only while Downloading or
//! Applying.  The boot selection changes in exactly one place, after the
//! CRC matched.

mod boot;
mod manager;
mod notice;
mod session;

pub use boot::BootValidation;
pub use manager::{OtaManager, OtaPoll, OtaTiming};
pub use notice::{NoticeStatus, OtaNotice};
pub use session::{OtaSession, OtaStatus, RunningCrc, crc32};

use core::fmt;

// ── Error type ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    AlreadyInProgress,
    BatteryTooLow,
    ImageTooLarge,
    EmptyImage,
    NoPartition,
    NotReady,
    ChunkTimeout,
    SizeMismatch,
    SizeOverflow,
    WriteFailed,
    ChecksumMismatch,
    ActivateFailed,
    NoChunksReceived,
    Stalled,
}

/// Where in the update an error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The update never began.
    RejectedStart,
    /// The update began and was torn down mid-transfer.
    TransferAbort,
    /// Every byte arrived but the image failed its checks.
    VerificationFailure,
}

impl OtaError {
    /// Reason string published in error notices.
    pub fn reason(self) -> &'static str {
        match self {
            Self::AlreadyInProgress => "already in progress",
            Self::BatteryTooLow => "battery too low",
            Self::ImageTooLarge => "image too large",
            Self::EmptyImage => "empty image",
            Self::NoPartition => "no partition",
            Self::NotReady => "not ready",
            Self::ChunkTimeout => "chunk timeout",
            Self::SizeMismatch => "size mismatch",
            Self::SizeOverflow => "size overflow",
            Self::WriteFailed => "write failed",
            Self::ChecksumMismatch => "checksum mismatch",
            Self::ActivateFailed => "activate failed",
            Self::NoChunksReceived => "no chunks received",
            Self::Stalled => "stalled",
        }
    }

    pub fn category(self) -> ErrorCategory {
        match self {
            Self::AlreadyInProgress
            | Self::BatteryTooLow
            | Self::ImageTooLarge
            | Self::EmptyImage
            | Self::NoPartition => ErrorCategory::RejectedStart,
            Self::NotReady
            | Self::ChunkTimeout
            | Self::SizeMismatch
            | Self::SizeOverflow
            | Self::WriteFailed
            | Self::NoChunksReceived
            | Self::Stalled => ErrorCategory::TransferAbort,
            Self::ChecksumMismatch | Self::ActivateFailed => ErrorCategory::VerificationFailure,
        }
    }
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}
