//! Session status and the running image checksum.

use crc::{CRC_32_ISO_HDLC, Crc, Digest};

/// Standard CRC-32: reflected polynomial 0xEDB88320, init/xorout 0xFFFFFFFF.
static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// One-shot CRC-32 over a complete buffer.
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// CRC-32 folded over bytes in arrival order.
#[derive(Clone)]
pub struct RunningCrc {
    digest: Digest<'static, u32>,
}

impl RunningCrc {
    pub fn new() -> Self {
        Self {
            digest: CRC32.digest(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    /// Checksum of everything folded so far (0 for no bytes).
    pub fn value(&self) -> u32 {
        self.digest.clone().finalize()
    }

    pub fn reset(&mut self) {
        self.digest = CRC32.digest();
    }
}

impl Default for RunningCrc {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for RunningCrc {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "RunningCrc({:08x})", self.value())
    }
}

// ── Status ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaStatus {
    Idle,
    Downloading,
    Applying,
    Complete,
    Rebooting,
    Error,
}

impl OtaStatus {
    /// A partition handle is held in exactly these states.
    pub fn holds_partition(self) -> bool {
        matches!(self, Self::Downloading | Self::Applying)
    }

    /// A new announcement may start a session from these states.
    pub fn accepts_announcement(self) -> bool {
        matches!(self, Self::Idle | Self::Complete | Self::Error)
    }
}

/// Read-only view of the single update session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtaSession {
    pub status: OtaStatus,
    pub total_bytes: u32,
    pub received_bytes: u32,
    pub expected_crc32: u32,
    pub running_crc32: u32,
    pub has_partition: bool,
    pub last_chunk_at_ms: u64,
}
