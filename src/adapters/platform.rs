//! Chip-level services behind [`SystemPort`].
//!
//! - **`target_os = "espidf"`** - [`EspPlatform`]: restart and rollback
//!   confirmation via `esp-ota`, image state via the ESP-IDF OTA API, free
//!   heap, and timer-wakeup light sleep.
//! - **all targets** - [`SimPlatform`] records every call so tests can see
//!   restarts, confirmations and sleep windows.

use core::time::Duration;

use log::info;

use crate::app::ports::SystemPort;
use crate::error::PlatformError;

// ───────────────────────────────────────────────────────────────
// ESP-IDF platform
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp::EspPlatform;

#[cfg(target_os = "espidf")]
mod esp {
    use core::time::Duration;

    use esp_idf_sys as sys;
    use log::{info, warn};

    use crate::app::ports::SystemPort;
    use crate::error::PlatformError;

    #[derive(Default)]
    pub struct EspPlatform;

    impl EspPlatform {
        pub fn new() -> Self {
            Self
        }
    }

    impl SystemPort for EspPlatform {
        fn restart(&mut self) {
            info!("platform: restarting");
            esp_ota::restart();
        }

        fn boot_pending_verification(&self) -> bool {
            let mut state: sys::esp_ota_img_states_t = 0;
            let rc = unsafe {
                let running = sys::esp_ota_get_running_partition();
                sys::esp_ota_get_state_partition(running, &mut state)
            };
            rc == sys::ESP_OK && state == sys::esp_ota_img_states_t_ESP_OTA_IMG_PENDING_VERIFY
        }

        fn mark_running_valid(&mut self) -> Result<(), PlatformError> {
            esp_ota::mark_app_valid().map_err(|e| {
                warn!("platform: mark_app_valid failed: {:?}", e);
                PlatformError::MarkValidFailed
            })
        }

        fn free_heap_bytes(&self) -> u32 {
            unsafe { sys::esp_get_free_heap_size() }
        }

        fn sleep_for(&mut self, duration: Duration) -> Result<(), PlatformError> {
            let us = duration.as_micros() as u64;
            let rc = unsafe { sys::esp_sleep_enable_timer_wakeup(us) };
            if rc != sys::ESP_OK {
                warn!("platform: timer wakeup rejected ({})", rc);
                return Err(PlatformError::SleepFailed);
            }
            info!("platform: light sleep for {} ms", duration.as_millis());
            let rc = unsafe { sys::esp_light_sleep_start() };
            if rc != sys::ESP_OK {
                warn!("platform: light sleep failed ({})", rc);
                return Err(PlatformError::SleepFailed);
            }
            Ok(())
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Simulated platform
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SimPlatform {
    /// The image booted "pending verification".
    pub pending: bool,
    /// Make `mark_running_valid` fail.
    pub fail_mark_valid: bool,
    pub free_heap: u32,
    pub restarts: u32,
    pub confirmations: u32,
    pub sleeps: Vec<Duration>,
}

impl SimPlatform {
    pub fn new() -> Self {
        Self {
            free_heap: 180_000,
            ..Self::default()
        }
    }

    /// Booted into a freshly flashed image.
    pub fn after_update() -> Self {
        Self {
            pending: true,
            ..Self::new()
        }
    }
}

impl SystemPort for SimPlatform {
    fn restart(&mut self) {
        info!("platform(sim): restart requested");
        self.restarts += 1;
    }

    fn boot_pending_verification(&self) -> bool {
        self.pending
    }

    fn mark_running_valid(&mut self) -> Result<(), PlatformError> {
        if self.fail_mark_valid {
            return Err(PlatformError::MarkValidFailed);
        }
        self.pending = false;
        self.confirmations += 1;
        Ok(())
    }

    fn free_heap_bytes(&self) -> u32 {
        self.free_heap
    }

    fn sleep_for(&mut self, duration: Duration) -> Result<(), PlatformError> {
        self.sleeps.push(duration);
        Ok(())
    }
}
