//! The OTA session owner.
//!
//! All entry points run on the control loop thread: `start_update` and
//! `process_chunk` are called while draining the control channel, `poll`
//! once per tick.  Nothing here blocks.

use log::{error, info, warn};

use super::notice::OtaNotice;
use super::session::{OtaSession, OtaStatus, RunningCrc};
use super::OtaError;
use crate::app::ports::{FirmwareStore, NoticeSink, PartitionWriter, PowerPort};
use crate::config::SystemConfig;
use crate::net::message::{ChunkEnvelope, UpdateAnnouncement, VersionString};

/// Log every Nth chunk.
const CHUNK_LOG_INTERVAL: u32 = 10;

// ── Timing ────────────────────────────────────────────────────

/// Thresholds the manager enforces, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtaTiming {
    pub chunk_timeout_ms: u64,
    pub initial_timeout_ms: u64,
    pub stall_warning_ms: u64,
    pub stall_timeout_ms: u64,
    pub reboot_delay_ms: u64,
    pub progress_step: u8,
}

impl From<&SystemConfig> for OtaTiming {
    fn from(c: &SystemConfig) -> Self {
        Self {
            chunk_timeout_ms: u64::from(c.ota_chunk_timeout_ms),
            initial_timeout_ms: u64::from(c.ota_initial_timeout_ms),
            stall_warning_ms: u64::from(c.ota_stall_warning_ms),
            stall_timeout_ms: u64::from(c.ota_stall_timeout_ms),
            reboot_delay_ms: u64::from(c.ota_reboot_delay_ms),
            progress_step: c.ota_progress_step_percent.max(1),
        }
    }
}

impl Default for OtaTiming {
    fn default() -> Self {
        Self::from(&SystemConfig::default())
    }
}

/// What the caller must do after [`OtaManager::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaPoll {
    Idle,
    /// The reboot delay after a completed update elapsed.
    RebootNow,
}

// ── Manager ───────────────────────────────────────────────────

pub struct OtaManager<F: FirmwareStore> {
    store: F,
    timing: OtaTiming,

    status: OtaStatus,
    version: VersionString,
    total_bytes: u32,
    received_bytes: u32,
    expected_crc32: u32,
    crc: RunningCrc,
    /// Held iff `status` is Downloading or Applying.
    writer: Option<F::Writer>,
    chunks_received: u32,

    started_at_ms: u64,
    last_chunk_at_ms: u64,
    last_progress_at_ms: u64,
    stall_warned: bool,
    last_notified_progress: u8,
    reboot_at_ms: Option<u64>,
    last_error: Option<OtaError>,
}

impl<F: FirmwareStore> OtaManager<F> {
    pub fn new(store: F, timing: OtaTiming) -> Self {
        Self {
            store,
            timing,
            status: OtaStatus::Idle,
            version: VersionString::new(),
            total_bytes: 0,
            received_bytes: 0,
            expected_crc32: 0,
            crc: RunningCrc::new(),
            writer: None,
            chunks_received: 0,
            started_at_ms: 0,
            last_chunk_at_ms: 0,
            last_progress_at_ms: 0,
            stall_warned: false,
            last_notified_progress: 0,
            reboot_at_ms: None,
            last_error: None,
        }
    }

    // ── Start ─────────────────────────────────────────────────

    /// Open a session for `ann`.  Rejections leave the current status
    /// untouched and acquire nothing.
    pub fn start_update(
        &mut self,
        ann: &UpdateAnnouncement,
        power: &impl PowerPort,
        now_ms: u64,
        sink: &mut impl NoticeSink,
    ) -> Result<(), OtaError> {
        if !self.status.accepts_announcement() || self.reboot_at_ms.is_some() {
            // Not published: it would interleave with the running session's
            // status stream.
            warn!("OTA: announcement {} ignored, {}", ann.version, OtaError::AlreadyInProgress);
            return Err(OtaError::AlreadyInProgress);
        }
        if !power.is_safe_to_flash() {
            return Err(self.reject(OtaError::BatteryTooLow, sink));
        }
        if ann.total_size == 0 {
            return Err(self.reject(OtaError::EmptyImage, sink));
        }
        let capacity = match self.store.inactive_capacity() {
            Ok(c) => c,
            Err(e) => {
                warn!("OTA: no update partition: {}", e);
                return Err(self.reject(OtaError::NoPartition, sink));
            }
        };
        if ann.total_size > capacity {
            warn!(
                "OTA: image {} bytes exceeds partition of {} bytes",
                ann.total_size, capacity
            );
            return Err(self.reject(OtaError::ImageTooLarge, sink));
        }
        let writer = match self.store.open_inactive(ann.total_size) {
            Ok(w) => w,
            Err(e) => {
                warn!("OTA: cannot open inactive partition: {}", e);
                return Err(self.reject(OtaError::NoPartition, sink));
            }
        };

        self.writer = Some(writer);
        self.status = OtaStatus::Downloading;
        self.version = ann.version.clone();
        self.total_bytes = ann.total_size;
        self.received_bytes = 0;
        self.expected_crc32 = ann.expected_crc32;
        self.crc.reset();
        self.chunks_received = 0;
        self.started_at_ms = now_ms;
        self.last_chunk_at_ms = now_ms;
        self.last_progress_at_ms = now_ms;
        self.stall_warned = false;
        self.last_notified_progress = 0;
        self.last_error = None;

        info!(
            "OTA: begin v{} ({} bytes, crc32 {:08x})",
            self.version, self.total_bytes, self.expected_crc32
        );
        sink.notify(&OtaNotice::started());
        Ok(())
    }

    // ── Chunks ────────────────────────────────────────────────

    /// Apply one chunk.  Chunks are folded in arrival order; the index is
    /// only logged.
    pub fn process_chunk(
        &mut self,
        chunk: &ChunkEnvelope<'_>,
        now_ms: u64,
        sink: &mut impl NoticeSink,
    ) -> Result<(), OtaError> {
        if self.status != OtaStatus::Downloading {
            return Err(OtaError::NotReady);
        }
        if now_ms.saturating_sub(self.last_chunk_at_ms) > self.timing.chunk_timeout_ms {
            return Err(self.fail(OtaError::ChunkTimeout, sink));
        }
        let len = chunk.payload.len() as u32;
        if chunk.payload.len() != chunk.declared_size as usize {
            warn!(
                "OTA: chunk {} declared {} bytes, carried {}",
                chunk.index, chunk.declared_size, len
            );
            return Err(self.fail(OtaError::SizeMismatch, sink));
        }
        if u64::from(self.received_bytes) + u64::from(len) > u64::from(self.total_bytes) {
            return Err(self.fail(OtaError::SizeOverflow, sink));
        }

        self.crc.update(chunk.payload);
        let written = match self.writer.as_mut() {
            Some(w) => w.write(chunk.payload),
            None => return Err(self.fail(OtaError::NotReady, sink)),
        };
        if let Err(e) = written {
            warn!("OTA: chunk {} write failed: {}", chunk.index, e);
            return Err(self.fail(OtaError::WriteFailed, sink));
        }

        self.received_bytes += len;
        self.chunks_received += 1;
        self.last_chunk_at_ms = now_ms;
        if len > 0 {
            self.last_progress_at_ms = now_ms;
            self.stall_warned = false;
        }
        if self.chunks_received % CHUNK_LOG_INTERVAL == 0 {
            info!(
                "OTA: chunk {} ({}/{} bytes)",
                chunk.index, self.received_bytes, self.total_bytes
            );
        }

        let progress = self.progress();
        if progress == 100
            || progress >= self.last_notified_progress.saturating_add(self.timing.progress_step)
        {
            self.last_notified_progress = progress;
            sink.notify(&OtaNotice::downloading(progress));
        }

        if self.received_bytes >= self.total_bytes {
            return self.finalize(now_ms, sink);
        }
        Ok(())
    }

    /// Verify, seal and switch the boot target.  The CRC comparison is the
    /// only gate in front of `activate`.
    /// The `applying` notice goes out only after activation succeeds.
    fn finalize(&mut self, now_ms: u64, sink: &mut impl NoticeSink) -> Result<(), OtaError> {
        self.status = OtaStatus::Applying;

        let actual = self.crc.value();
        if actual != self.expected_crc32 {
            error!(
                "OTA: checksum mismatch (expected {:08x}, got {:08x})",
                self.expected_crc32, actual
            );
            return Err(self.fail(OtaError::ChecksumMismatch, sink));
        }

        let Some(writer) = self.writer.take() else {
            return Err(self.fail(OtaError::NotReady, sink));
        };
        if let Err(e) = self.store.activate(writer) {
            warn!("OTA: activate failed: {}", e);
            return Err(self.fail(OtaError::ActivateFailed, sink));
        }

        sink.notify(&OtaNotice::applying());
        self.status = OtaStatus::Complete;
        self.reboot_at_ms = Some(now_ms + self.timing.reboot_delay_ms);
        info!(
            "OTA: v{} verified and activated, rebooting in {} ms",
            self.version, self.timing.reboot_delay_ms
        );
        sink.notify(&OtaNotice::complete());
        Ok(())
    }

    // ── Cancellation ──────────────────────────────────────────

    /// Tear down the session.  Safe to call from any state; only an active
    /// session publishes an error notice.
    pub fn abort(&mut self, reason: OtaError, sink: &mut impl NoticeSink) {
        let _ = self.fail(reason, sink);
    }

    /// Drop everything and return to Idle.  Any held partition is released.
    pub fn reset(&mut self) {
        self.writer = None;
        self.status = OtaStatus::Idle;
        self.total_bytes = 0;
        self.received_bytes = 0;
        self.expected_crc32 = 0;
        self.crc.reset();
        self.chunks_received = 0;
        self.reboot_at_ms = None;
        self.last_error = None;
    }

    fn fail(&mut self, reason: OtaError, sink: &mut impl NoticeSink) -> OtaError {
        if !self.status.holds_partition() {
            self.writer = None;
            return reason;
        }
        let progress = self.progress();
        self.writer = None;
        self.status = OtaStatus::Error;
        self.total_bytes = 0;
        self.received_bytes = 0;
        self.last_error = Some(reason);
        warn!("OTA: aborted at {}%: {}", progress, reason);
        sink.notify(&OtaNotice::error(reason, progress));
        reason
    }

    fn reject(&mut self, reason: OtaError, sink: &mut impl NoticeSink) -> OtaError {
        warn!("OTA: update rejected: {}", reason);
        sink.notify(&OtaNotice::error(reason, 0));
        reason
    }

    // ── Timers ────────────────────────────────────────────────

    /// Enforce the initial/stall timeouts and the reboot delay.
    pub fn poll(&mut self, now_ms: u64, sink: &mut impl NoticeSink) -> OtaPoll {
        match self.status {
            OtaStatus::Downloading => {
                if self.chunks_received == 0 {
                    if now_ms.saturating_sub(self.started_at_ms) > self.timing.initial_timeout_ms {
                        self.fail(OtaError::NoChunksReceived, sink);
                    }
                } else {
                    let idle = now_ms.saturating_sub(self.last_progress_at_ms);
                    if idle > self.timing.stall_timeout_ms {
                        self.fail(OtaError::Stalled, sink);
                    } else if idle > self.timing.stall_warning_ms && !self.stall_warned {
                        self.stall_warned = true;
                        warn!(
                            "OTA: no progress for {} ms at {}/{} bytes",
                            idle, self.received_bytes, self.total_bytes
                        );
                    }
                }
                OtaPoll::Idle
            }
            OtaStatus::Complete => match self.reboot_at_ms {
                Some(at) if now_ms >= at => {
                    self.status = OtaStatus::Rebooting;
                    self.reboot_at_ms = None;
                    info!("OTA: rebooting into new firmware");
                    OtaPoll::RebootNow
                }
                _ => OtaPoll::Idle,
            },
            _ => OtaPoll::Idle,
        }
    }

    /// The control channel came back.  A running download keeps its offset
    /// and checksum; only the per-chunk clock restarts.
    pub fn on_reconnect(&mut self, now_ms: u64, sink: &mut impl NoticeSink) {
        if self.status != OtaStatus::Downloading {
            return;
        }
        self.last_chunk_at_ms = now_ms;
        info!(
            "OTA: resuming v{} at {}/{} bytes",
            self.version, self.received_bytes, self.total_bytes
        );
        sink.notify(&OtaNotice::resumed(self.progress()));
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn status(&self) -> OtaStatus {
        self.status
    }

    /// 0..=100.
    pub fn progress(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }
        (u64::from(self.received_bytes) * 100 / u64::from(self.total_bytes)) as u8
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self.status, OtaStatus::Downloading | OtaStatus::Applying)
    }

    /// Completed and waiting for (or performing) the reboot.
    pub fn is_reboot_pending(&self) -> bool {
        self.reboot_at_ms.is_some() || self.status == OtaStatus::Rebooting
    }

    pub fn has_partition_handle(&self) -> bool {
        self.writer.is_some()
    }

    pub fn received_bytes(&self) -> u32 {
        self.received_bytes
    }

    pub fn total_bytes(&self) -> u32 {
        self.total_bytes
    }

    pub fn running_crc32(&self) -> u32 {
        self.crc.value()
    }

    pub fn last_error(&self) -> Option<OtaError> {
        self.last_error
    }

    pub fn version(&self) -> &str {
        self.version.as_str()
    }

    pub fn session(&self) -> OtaSession {
        OtaSession {
            status: self.status,
            total_bytes: self.total_bytes,
            received_bytes: self.received_bytes,
            expected_crc32: self.expected_crc32,
            running_crc32: self.crc.value(),
            has_partition: self.writer.is_some(),
            last_chunk_at_ms: self.last_chunk_at_ms,
        }
    }

    pub fn store(&self) -> &F {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut F {
        &mut self.store
    }
}

// ── Tests ─────────────────────────────────────────────────────
