//! Runtime health snapshot and panic logging.
//!
//! [`RuntimeMetrics`] is collected by the main loop and logged once per
//! [`HEALTH_LOG_INTERVAL_MS`].  The panic hook writes the panic reason and
//! the current OTA state to the console before the reset, which is all the
//! post-mortem a sleeping sensor gets.

use core::sync::atomic::{AtomicU8, Ordering};

use log::{error, info};

use crate::ota::OtaStatus;

/// Health line cadence while awake.
pub const HEALTH_LOG_INTERVAL_MS: u64 = 60_000;

/// OTA status as last seen by the main loop, for the panic hook.
static LAST_OTA_STATUS: AtomicU8 = AtomicU8::new(0);

fn status_code(s: OtaStatus) -> u8 {
    match s {
        OtaStatus::Idle => 0,
        OtaStatus::Downloading => 1,
        OtaStatus::Applying => 2,
        OtaStatus::Complete => 3,
        OtaStatus::Rebooting => 4,
        OtaStatus::Error => 5,
    }
}

fn status_name(code: u8) -> &'static str {
    match code {
        0 => "idle",
        1 => "downloading",
        2 => "applying",
        3 => "complete",
        4 => "rebooting",
        5 => "error",
        _ => "unknown",
    }
}

/// Runtime diagnostics snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeMetrics {
    pub uptime_secs: u64,
    pub control_cycles: u64,
    pub heap_free: u32,
    pub heap_min_free: u32,
    pub wifi_rssi: Option<i8>,
    pub ota_status: OtaStatus,
    pub ota_progress: u8,
}

impl RuntimeMetrics {
    pub fn collect(
        uptime_secs: u64,
        control_cycles: u64,
        wifi_rssi: Option<i8>,
        ota_status: OtaStatus,
        ota_progress: u8,
    ) -> Self {
        LAST_OTA_STATUS.store(status_code(ota_status), Ordering::Relaxed);
        let (heap_free, heap_min_free) = heap_stats(uptime_secs);
        Self {
            uptime_secs,
            control_cycles,
            heap_free,
            heap_min_free,
            wifi_rssi,
            ota_status,
            ota_progress,
        }
    }

    pub fn log(&self) {
        info!(
            "HEALTH | up={}s cycles={} heap={}/{}min rssi={:?} ota={:?}@{}%",
            self.uptime_secs,
            self.control_cycles,
            self.heap_free,
            self.heap_min_free,
            self.wifi_rssi,
            self.ota_status,
            self.ota_progress,
        );
    }
}

#[cfg(target_os = "espidf")]
fn heap_stats(_uptime_secs: u64) -> (u32, u32) {
    use esp_idf_sys::*;
    unsafe { (esp_get_free_heap_size(), esp_get_minimum_free_heap_size()) }
}

/// Simulation: heap decays slowly with uptime to model fragmentation.
#[cfg(not(target_os = "espidf"))]
fn heap_stats(uptime_secs: u64) -> (u32, u32) {
    let base_free: u32 = 204_800;
    let decay = (uptime_secs / 60) as u32 * 256;
    let free = base_free.saturating_sub(decay);
    (free, free - free / 8)
}

// ───────────────────────────────────────────────────────────────
// Panic hook
// ───────────────────────────────────────────────────────────────

/// Install a panic hook that logs the reason and the OTA state.
///
/// A panic mid-download leaves the inactive slot half written; the hook
/// only reports it.  The boot selection was not touched, so the next boot
/// runs the current image.
pub fn install_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        let reason = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            *msg
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.as_str()
        } else {
            "unknown panic"
        };
        let ota = status_name(LAST_OTA_STATUS.load(Ordering::Relaxed));
        match info.location() {
            Some(loc) => error!("PANIC: {} at {}:{} (ota={})", reason, loc.file(), loc.line(), ota),
            None => error!("PANIC: {} (ota={})", reason, ota),
        }
    }));
}
