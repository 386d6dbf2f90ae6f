//! Firmware store adapters.
//!
//! - **`target_os = "espidf"`** - [`EspFirmwareStore`] wraps the `esp-ota`
//!   crate: `OtaUpdate::begin` picks the next OTA slot, dropping an
//!   unfinished `OtaUpdate` aborts it, and `set_as_boot_partition` is the
//!   only call that changes the boot selection.
//! - **all targets** - [`SimFlash`], an in-memory A/B store used by host
//!   tests and simulation.  It counts live writers and boot switches so
//!   tests can assert the partition table was never touched.

use std::cell::Cell;
use std::rc::Rc;

use log::warn;

use crate::app::ports::{FirmwareStore, PartitionWriter};
use crate::error::FlashError;

// ───────────────────────────────────────────────────────────────
// ESP-IDF store
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp::{EspFirmwareStore, EspPartitionWriter};

#[cfg(target_os = "espidf")]
mod esp {
    use log::{info, warn};

    use crate::app::ports::{FirmwareStore, PartitionWriter};
    use crate::error::FlashError;

    /// The next OTA slot, as chosen by the bootloader's partition table.
    #[derive(Default)]
    pub struct EspFirmwareStore;

    impl EspFirmwareStore {
        pub fn new() -> Self {
            Self
        }
    }

    pub struct EspPartitionWriter {
        update: esp_ota::OtaUpdate,
        written: u32,
    }

    impl PartitionWriter for EspPartitionWriter {
        fn write(&mut self, data: &[u8]) -> Result<(), FlashError> {
            self.update.write(data).map_err(|e| {
                warn!("esp-ota write failed: {:?}", e);
                FlashError::WriteFailed
            })?;
            self.written += data.len() as u32;
            Ok(())
        }

        fn position(&self) -> u32 {
            self.written
        }
    }

    impl FirmwareStore for EspFirmwareStore {
        type Writer = EspPartitionWriter;

        fn inactive_capacity(&self) -> Result<u32, FlashError> {
            // SAFETY: a null start asks for the slot after the running image;
            // the returned entry points into the static partition table.
            let next =
                unsafe { esp_idf_sys::esp_ota_get_next_update_partition(core::ptr::null()) };
            if next.is_null() {
                warn!("flash: partition table has no OTA update slot");
                return Err(FlashError::NoPartition);
            }
            Ok(unsafe { (*next).size })
        }

        fn open_inactive(&mut self, image_size: u32) -> Result<EspPartitionWriter, FlashError> {
            let update = esp_ota::OtaUpdate::begin().map_err(|e| {
                warn!("esp-ota begin failed: {:?}", e);
                FlashError::NoPartition
            })?;
            info!("flash: inactive slot opened for {} bytes", image_size);
            Ok(EspPartitionWriter { update, written: 0 })
        }

        fn activate(&mut self, writer: EspPartitionWriter) -> Result<(), FlashError> {
            let mut completed = writer.update.finalize().map_err(|e| {
                warn!("esp-ota finalize failed: {:?}", e);
                FlashError::SealFailed
            })?;
            completed.set_as_boot_partition().map_err(|e| {
                warn!("esp-ota set_as_boot_partition failed: {:?}", e);
                FlashError::BootSetFailed
            })?;
            info!("flash: new image set as boot partition");
            Ok(())
        }
    }
}

// ───────────────────────────────────────────────────────────────
// In-memory store
// ───────────────────────────────────────────────────────────────

/// In-memory A/B store with fault injection.
pub struct SimFlash {
    capacity: u32,
    live_writers: Rc<Cell<u32>>,
    opened: u32,
    boot_switches: u32,
    next_boot: Option<Vec<u8>>,
    fail_open: bool,
    has_slot: bool,
    fail_write_at: Option<u32>,
    fail_activate: bool,
}

impl SimFlash {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            live_writers: Rc::new(Cell::new(0)),
            opened: 0,
            boot_switches: 0,
            next_boot: None,
            fail_open: false,
            has_slot: true,
            fail_write_at: None,
            fail_activate: false,
        }
    }

    /// Make the next `open_inactive` calls fail.
    pub fn fail_open(&mut self, fail: bool) {
        self.fail_open = fail;
    }

    /// Model a partition table without an update slot.
    pub fn remove_slot(&mut self) {
        self.has_slot = false;
    }

    /// Fail any write that would extend the image past `offset`.
    pub fn fail_write_at(&mut self, offset: Option<u32>) {
        self.fail_write_at = offset;
    }

    /// Make `activate` fail while sealing.
    pub fn fail_activate(&mut self, fail: bool) {
        self.fail_activate = fail;
    }

    /// Writers currently holding the inactive partition.
    pub fn live_writers(&self) -> u32 {
        self.live_writers.get()
    }

    pub fn times_opened(&self) -> u32 {
        self.opened
    }

    /// How often the boot selection was changed.
    pub fn boot_switches(&self) -> u32 {
        self.boot_switches
    }

    /// Image that will run on the next boot, if one was activated.
    pub fn next_boot_image(&self) -> Option<&[u8]> {
        self.next_boot.as_deref()
    }
}

pub struct SimWriter {
    data: Vec<u8>,
    capacity: u32,
    fail_write_at: Option<u32>,
    live: Rc<Cell<u32>>,
}

impl PartitionWriter for SimWriter {
    fn write(&mut self, data: &[u8]) -> Result<(), FlashError> {
        let end = self.data.len() as u64 + data.len() as u64;
        if end > u64::from(self.capacity) {
            return Err(FlashError::OutOfSpace);
        }
        if let Some(limit) = self.fail_write_at {
            if end > u64::from(limit) {
                return Err(FlashError::WriteFailed);
            }
        }
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn position(&self) -> u32 {
        self.data.len() as u32
    }
}

impl Drop for SimWriter {
    fn drop(&mut self) {
        self.live.set(self.live.get().saturating_sub(1));
    }
}

impl FirmwareStore for SimFlash {
    type Writer = SimWriter;

    fn inactive_capacity(&self) -> Result<u32, FlashError> {
        if !self.has_slot {
            return Err(FlashError::NoPartition);
        }
        Ok(self.capacity)
    }

    fn open_inactive(&mut self, _image_size: u32) -> Result<SimWriter, FlashError> {
        if self.fail_open || !self.has_slot {
            return Err(FlashError::NoPartition);
        }
        if self.live_writers.get() > 0 {
            warn!("flash(sim): inactive partition already open");
            return Err(FlashError::NoPartition);
        }
        self.opened += 1;
        self.live_writers.set(self.live_writers.get() + 1);
        Ok(SimWriter {
            data: Vec::new(),
            capacity: self.capacity,
            fail_write_at: self.fail_write_at,
            live: Rc::clone(&self.live_writers),
        })
    }

    fn activate(&mut self, mut writer: SimWriter) -> Result<(), FlashError> {
        if self.fail_activate {
            return Err(FlashError::SealFailed);
        }
        self.next_boot = Some(core::mem::take(&mut writer.data));
        self.boot_switches += 1;
        Ok(())
    }
}
