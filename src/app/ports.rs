//! Port traits - the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Controller / OtaManager (domain)
//! ```
//!
//! Driven adapters (radio, broker, sensors, display, flash, bootloader)
//! implement these traits.  The [`Controller`](super::controller::Controller)
//! and [`OtaManager`](crate::ota::OtaManager) consume them via generics, so
//! the domain core never touches hardware directly.

use core::time::Duration;

use crate::error::{CommsError, FlashError, PlatformError, SensorError};
use crate::net::message::InboundFrame;
use crate::ota::OtaNotice;
use crate::telemetry::SampleBatch;

// ───────────────────────────────────────────────────────────────
// Clock port (driven adapter: high-resolution timer)
// ───────────────────────────────────────────────────────────────

/// Monotonic milliseconds since boot.  Keeps counting across light sleep.
pub trait ClockPort {
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Network port (driven adapter: WiFi station)
// ───────────────────────────────────────────────────────────────

/// Link-layer connectivity.
pub trait NetworkPort {
    fn is_connected(&self) -> bool;

    /// The link gave up for good (bad credentials, retry budget spent).
    fn has_fatal_error(&self) -> bool;

    /// Signal strength in dBm while associated.
    fn rssi(&self) -> Option<i8>;

    /// Drive reconnection; called once per control tick.
    fn poll(&mut self, now_ms: u64);

    /// Power the radio down ahead of a sleep window.
    fn suspend(&mut self);

    /// Power the radio back up after a sleep window.
    fn resume(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Control channel port (driven adapter: MQTT client)
// ───────────────────────────────────────────────────────────────

/// Publish/subscribe transport carrying OTA traffic and telemetry.
///
/// Delivery is at-most-once; nothing is ordered across reconnects.
/// Subscriptions do not survive a reconnect.
pub trait ControlChannel {
    fn is_connected(&self) -> bool;

    fn has_fatal_error(&self) -> bool;

    fn subscribe(&mut self, topic: &str) -> Result<(), CommsError>;

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), CommsError>;

    /// Pop the next received frame, if any.  Never blocks.
    fn next_message(&mut self) -> Option<InboundFrame>;
}

// ───────────────────────────────────────────────────────────────
// Sensor / display ports
// ───────────────────────────────────────────────────────────────

/// Read-side port: the domain calls this to obtain a sample batch.
pub trait SensorPort {
    /// `true` when the sensors are ready for a new batch.
    fn should_sample(&self, now_ms: u64) -> bool;

    fn collect_samples(&mut self, now_ms: u64) -> Result<SampleBatch, SensorError>;
}

/// Renders the latest reading on the panel.
pub trait DisplayPort {
    fn render(&mut self, batch: &SampleBatch, battery_percent: u8);
}

// ───────────────────────────────────────────────────────────────
// Power and platform ports
// ───────────────────────────────────────────────────────────────

/// Battery state as seen by the domain.
pub trait PowerPort {
    /// Safety predicate consulted before any flash write begins.
    fn is_safe_to_flash(&self) -> bool;

    fn battery_percent(&self) -> u8;
}

/// Chip-level services: reset, bootloader handshake, heap, sleep.
pub trait SystemPort {
    /// Reset the chip.  Never returns on hardware.
    fn restart(&mut self);

    /// The running image was left "pending verification" by the bootloader.
    fn boot_pending_verification(&self) -> bool;

    /// Cancel the bootloader's rollback for the running image.
    fn mark_running_valid(&mut self) -> Result<(), PlatformError>;

    fn free_heap_bytes(&self) -> u32;

    /// Suspend the whole control loop for `duration` (timer wake-up).
    fn sleep_for(&mut self, duration: Duration) -> Result<(), PlatformError>;
}

// ───────────────────────────────────────────────────────────────
// Firmware store (driven adapter: A/B OTA partitions)
// ───────────────────────────────────────────────────────────────

/// Sequential writer into the inactive partition.
///
/// Dropping a writer without passing it to [`FirmwareStore::activate`]
/// abandons the image and releases the partition.
pub trait PartitionWriter {
    fn write(&mut self, data: &[u8]) -> Result<(), FlashError>;

    /// Bytes written so far.
    fn position(&self) -> u32;
}

/// The dual-partition flash store.
pub trait FirmwareStore {
    type Writer: PartitionWriter;

    /// Size of the partition an update would be written to, read from the
    /// partition table.  `NoPartition` when the table has no update slot.
    fn inactive_capacity(&self) -> Result<u32, FlashError>;

    /// Open the inactive partition for writing.
    fn open_inactive(&mut self, image_size: u32) -> Result<Self::Writer, FlashError>;

    /// Seal the written image and make it the next boot target.
    ///
    /// This is the only operation that touches the boot selection.
    fn activate(&mut self, writer: Self::Writer) -> Result<(), FlashError>;
}

// ───────────────────────────────────────────────────────────────
// Outbound sinks
// ───────────────────────────────────────────────────────────────

/// Receives OTA status notices.  The controller forwards them to the
/// status topic; tests record them.
pub trait NoticeSink {
    fn notify(&mut self, notice: &OtaNotice);
}

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}
