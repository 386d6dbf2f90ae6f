//! One-shot confirmation of a freshly flashed image.
//!
//! After an update the bootloader starts the new image in a "pending
//! verification" state and keeps its rollback watchdog armed.  The image
//! is confirmed once, the first time the device reaches its control
//! channel.  Nothing here ever disarms the watchdog speculatively.

use log::{info, warn};

use crate::app::ports::SystemPort;
use crate::error::PlatformError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootValidation {
    pending: bool,
}

impl BootValidation {
    /// Read the bootloader's verdict.  Call once at process start.
    pub fn read(system: &impl SystemPort) -> Self {
        let pending = system.boot_pending_verification();
        if pending {
            info!("boot: running image pending verification");
        }
        Self { pending }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Confirm the running image if it is still pending.
    ///
    /// Returns `Ok(true)` when the confirmation was sent by this call.  On
    /// failure the flag stays set and the next call retries; the rollback
    /// watchdog remains armed in the meantime.
    pub fn confirm(&mut self, system: &mut impl SystemPort) -> Result<bool, PlatformError> {
        if !self.pending {
            return Ok(false);
        }
        match system.mark_running_valid() {
            Ok(()) => {
                self.pending = false;
                info!("boot: firmware marked valid (rollback cancelled)");
                Ok(true)
            }
            Err(e) => {
                warn!("boot: mark valid failed: {}", e);
                Err(e)
            }
        }
    }
}
