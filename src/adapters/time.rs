//! Monotonic clock adapter.
//!
//! Every timestamp the controller and the OTA manager see is a `u64`
//! millisecond count from this clock.
//!
//! - **`target_os = "espidf"`** - wraps `esp_timer_get_time()` from the
//!   ESP-IDF high-resolution timer (microsecond precision, monotonic,
//!   keeps counting across light sleep).
//! - **`not(target_os = "espidf")`** - uses `std::time::Instant` for
//!   host-side simulation.

use crate::app::ports::ClockPort;

pub struct MonotonicClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Milliseconds since boot.
    #[cfg(target_os = "espidf")]
    pub fn now_ms(&self) -> u64 {
        (unsafe { esp_idf_sys::esp_timer_get_time() }) as u64 / 1_000
    }

    /// Milliseconds since the clock was created.
    #[cfg(not(target_os = "espidf"))]
    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn uptime_secs(&self) -> u64 {
        self.now_ms() / 1_000
    }
}

impl ClockPort for MonotonicClock {
    fn now_ms(&self) -> u64 {
        MonotonicClock::now_ms(self)
    }
}
