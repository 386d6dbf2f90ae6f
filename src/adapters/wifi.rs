//! WiFi station-mode adapter.
//!
//! Implements [`NetworkPort`]: the link is brought up without blocking the
//! control loop.  Every `poll` either observes the association or, once the
//! retry interval has passed, issues another connect attempt.  After
//! `max_attempts` failed attempts the adapter reports a fatal error and
//! stops retrying; only a device restart clears it.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real driver calls via `esp_idf_svc::wifi::EspWifi`.
//! - **all other targets**: a simulated access point for host-side runs.

use core::fmt;
use log::{info, warn};

use crate::app::ports::NetworkPort;

// ───────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    InvalidSsid,
    InvalidPassword,
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Connection state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Idle,
    Connecting { attempt: u32 },
    Connected,
    Suspended,
    Failed,
}

/// Gap between two connect attempts.
const RETRY_INTERVAL_MS: u64 = 1_000;

/// Attempts before the link is declared dead (30 × 1 s).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

pub fn validate_ssid(ssid: &str) -> Result<(), CredentialError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(CredentialError::InvalidSsid);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), CredentialError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(CredentialError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Platform link
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp::EspLink as Link;

#[cfg(not(target_os = "espidf"))]
pub use sim::SimLink as Link;

#[cfg(target_os = "espidf")]
mod esp {
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_hal::modem::Modem;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_sys::EspError;
    use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi};
    use log::warn;

    /// Non-blocking wrapper over the ESP-IDF station driver.
    pub struct EspLink {
        wifi: EspWifi<'static>,
    }

    impl EspLink {
        pub fn new(
            modem: Modem,
            sys_loop: EspSystemEventLoop,
            nvs: Option<EspDefaultNvsPartition>,
            ssid: &str,
            password: &str,
        ) -> Result<Self, EspError> {
            let mut wifi = EspWifi::new(modem, sys_loop, nvs)?;
            let cfg = Configuration::Client(ClientConfiguration {
                ssid: ssid.try_into().unwrap_or_default(),
                password: password.try_into().unwrap_or_default(),
                auth_method: if password.is_empty() {
                    AuthMethod::None
                } else {
                    AuthMethod::WPA2Personal
                },
                ..Default::default()
            });
            wifi.set_configuration(&cfg)?;
            wifi.start()?;
            Ok(Self { wifi })
        }

        pub(super) fn begin_connect(&mut self) -> bool {
            match self.wifi.connect() {
                Ok(()) => true,
                Err(e) => {
                    warn!("WiFi(espidf): connect request failed: {}", e);
                    false
                }
            }
        }

        pub(super) fn is_up(&self) -> bool {
            self.wifi.is_up().unwrap_or(false)
        }

        pub(super) fn rssi(&self) -> Option<i8> {
            let mut ap: esp_idf_sys::wifi_ap_record_t = unsafe { core::mem::zeroed() };
            let rc = unsafe { esp_idf_sys::esp_wifi_sta_get_ap_info(&mut ap) };
            (rc == esp_idf_sys::ESP_OK).then_some(ap.rssi)
        }

        pub(super) fn power_down(&mut self) {
            let _ = self.wifi.disconnect();
            let _ = self.wifi.stop();
        }

        pub(super) fn power_up(&mut self) {
            if let Err(e) = self.wifi.start() {
                warn!("WiFi(espidf): restart after sleep failed: {}", e);
            }
        }
    }
}

#[cfg(not(target_os = "espidf"))]
mod sim {
    /// Simulated access point.  Tests flip `reachable` to model outages.
    pub struct SimLink {
        pub reachable: bool,
        associated: bool,
        powered: bool,
        pub connect_requests: u32,
    }

    impl SimLink {
        pub fn new(reachable: bool) -> Self {
            Self {
                reachable,
                associated: false,
                powered: true,
                connect_requests: 0,
            }
        }

        pub(super) fn begin_connect(&mut self) -> bool {
            self.connect_requests += 1;
            self.associated = self.powered && self.reachable;
            true
        }

        pub(super) fn is_up(&self) -> bool {
            self.associated && self.powered && self.reachable
        }

        pub(super) fn rssi(&self) -> Option<i8> {
            self.is_up().then_some(-61)
        }

        pub(super) fn power_down(&mut self) {
            self.powered = false;
            self.associated = false;
        }

        pub(super) fn power_up(&mut self) {
            self.powered = true;
        }
    }
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    link: Link,
    state: WifiState,
    max_attempts: u32,
    last_attempt_ms: Option<u64>,
    last_rssi: Option<i8>,
}

impl WifiAdapter {
    pub fn new(link: Link, max_attempts: u32) -> Self {
        Self {
            link,
            state: WifiState::Idle,
            max_attempts: max_attempts.max(1),
            last_attempt_ms: None,
            last_rssi: None,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut Link {
        &mut self.link
    }

    fn attempt(&mut self, attempt: u32, now_ms: u64) {
        if attempt >= self.max_attempts {
            warn!("WiFi: giving up after {} attempts", attempt);
            self.state = WifiState::Failed;
            return;
        }
        info!("WiFi: connect attempt {}/{}", attempt + 1, self.max_attempts);
        self.link.begin_connect();
        self.last_attempt_ms = Some(now_ms);
        self.state = WifiState::Connecting { attempt: attempt + 1 };
    }
}

// ───────────────────────────────────────────────────────────────
// NetworkPort
// ───────────────────────────────────────────────────────────────

impl NetworkPort for WifiAdapter {
    fn is_connected(&self) -> bool {
        self.state == WifiState::Connected
    }

    fn has_fatal_error(&self) -> bool {
        self.state == WifiState::Failed
    }

    fn rssi(&self) -> Option<i8> {
        self.last_rssi
    }

    fn poll(&mut self, now_ms: u64) {
        match self.state {
            WifiState::Idle => self.attempt(0, now_ms),
            WifiState::Connecting { attempt } => {
                if self.link.is_up() {
                    self.state = WifiState::Connected;
                    self.last_rssi = self.link.rssi();
                    info!("WiFi: connected (RSSI={:?}, attempt {})", self.last_rssi, attempt);
                    return;
                }
                let due = self
                    .last_attempt_ms
                    .is_none_or(|t| now_ms.saturating_sub(t) >= RETRY_INTERVAL_MS);
                if due {
                    self.attempt(attempt, now_ms);
                }
            }
            WifiState::Connected => {
                if self.link.is_up() {
                    self.last_rssi = self.link.rssi();
                } else {
                    warn!("WiFi: connection lost, reconnecting");
                    self.last_rssi = None;
                    self.attempt(0, now_ms);
                }
            }
            WifiState::Suspended | WifiState::Failed => {}
        }
    }

    fn suspend(&mut self) {
        if self.state == WifiState::Failed {
            return;
        }
        self.link.power_down();
        self.state = WifiState::Suspended;
        self.last_rssi = None;
        info!("WiFi: radio suspended");
    }

    fn resume(&mut self) {
        if self.state != WifiState::Suspended {
            return;
        }
        self.link.power_up();
        self.state = WifiState::Idle;
        self.last_attempt_ms = None;
        info!("WiFi: radio resumed");
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
