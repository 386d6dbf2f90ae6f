//! System configuration parameters
//!
//! All tunable timing thresholds for the BrodBuddy controller and the
//! OTA updater. Connection settings (WiFi, broker) live in
//! [`ConnectionConfig`] and are baked in at build time.

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Control loop ---
    /// Orchestration tick period (milliseconds)
    pub tick_interval_ms: u32,
    /// Delay in the Error phase before the device restarts (milliseconds)
    pub error_restart_delay_ms: u32,
    /// Budget for bringing the network up before giving up (milliseconds)
    pub network_connect_timeout_ms: u32,

    // --- Sensing cycle ---
    /// Time between sensing passes when staying awake (milliseconds)
    pub sensing_interval_ms: u32,
    /// Length of one light-sleep window (milliseconds)
    pub sleep_window_ms: u32,
    /// Suspend the radio and sleep between passes
    pub low_power_mode: bool,

    // --- OTA ---
    /// Maximum gap between two consecutive chunks (milliseconds)
    pub ota_chunk_timeout_ms: u32,
    /// Window for the first chunk after an announcement (milliseconds)
    pub ota_initial_timeout_ms: u32,
    /// No-progress gap that logs a warning (milliseconds)
    pub ota_stall_warning_ms: u32,
    /// No-progress gap that aborts the transfer (milliseconds)
    pub ota_stall_timeout_ms: u32,
    /// Grace period between completion and restart (milliseconds)
    pub ota_reboot_delay_ms: u32,
    /// Minimum progress advance between two downloading notices (percent)
    pub ota_progress_step_percent: u8,
    /// Battery level below which flashing is refused (percent)
    pub min_battery_percent: u8,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Control loop
            tick_interval_ms: 100,
            error_restart_delay_ms: 5_000,
            network_connect_timeout_ms: 30_000, // 30 attempts × 1 s

            // Sensing cycle
            sensing_interval_ms: 300_000, // 5 min
            sleep_window_ms: 300_000,
            low_power_mode: true,

            // OTA
            ota_chunk_timeout_ms: 30_000,
            ota_initial_timeout_ms: 60_000,
            ota_stall_warning_ms: 45_000,
            ota_stall_timeout_ms: 120_000,
            ota_reboot_delay_ms: 3_000,
            ota_progress_step_percent: 5,
            min_battery_percent: 20,
        }
    }
}

impl SystemConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.tick_interval_ms))
    }

    pub fn sensing_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.sensing_interval_ms))
    }

    pub fn sleep_window(&self) -> Duration {
        Duration::from_millis(u64::from(self.sleep_window_ms))
    }

    pub fn error_restart_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.error_restart_delay_ms))
    }

    pub fn network_connect_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.network_connect_timeout_ms))
    }

    /// Reject threshold combinations the controller cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be > 0"));
        }
        if self.ota_chunk_timeout_ms == 0 || self.ota_initial_timeout_ms == 0 {
            return Err(ConfigError::Invalid("OTA timeouts must be > 0"));
        }
        if self.ota_stall_warning_ms >= self.ota_stall_timeout_ms {
            return Err(ConfigError::Invalid(
                "ota_stall_warning_ms must be below ota_stall_timeout_ms",
            ));
        }
        if self.ota_progress_step_percent == 0 || self.ota_progress_step_percent > 100 {
            return Err(ConfigError::Invalid("ota_progress_step_percent must be 1-100"));
        }
        if self.min_battery_percent > 100 {
            return Err(ConfigError::Invalid("min_battery_percent must be 0-100"));
        }
        if self.low_power_mode && self.sleep_window_ms == 0 {
            return Err(ConfigError::Invalid("sleep_window_ms must be > 0 in low-power mode"));
        }
        Ok(())
    }
}

/// Errors from [`SystemConfig::validate`] and JSON loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A field failed range validation.
    Invalid(&'static str),
    /// The stored document could not be parsed.
    Corrupted,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(msg) => write!(f, "validation failed: {}", msg),
            Self::Corrupted => write!(f, "config corrupted"),
        }
    }
}

/// Parse and validate a JSON config document.
pub fn from_json(raw: &[u8]) -> Result<SystemConfig, ConfigError> {
    let config: SystemConfig =
        serde_json::from_slice(raw).map_err(|_| ConfigError::Corrupted)?;
    config.validate()?;
    Ok(config)
}

// ───────────────────────────────────────────────────────────────
// Connection settings (build-time)
// ───────────────────────────────────────────────────────────────

/// WiFi and broker settings, provisioned at build time through env vars.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    pub wifi_ssid: &'static str,
    pub wifi_password: &'static str,
    pub mqtt_url: &'static str,
    pub mqtt_username: Option<&'static str>,
    pub mqtt_password: Option<&'static str>,
    /// Backend-assigned analyzer GUID; the MAC-derived id is used without it.
    pub analyzer_id: Option<&'static str>,
}

impl ConnectionConfig {
    pub fn from_build_env() -> Self {
        Self {
            wifi_ssid: option_env!("BRODBUDDY_WIFI_SSID").unwrap_or(""),
            wifi_password: option_env!("BRODBUDDY_WIFI_PASSWORD").unwrap_or(""),
            mqtt_url: option_env!("BRODBUDDY_MQTT_URL").unwrap_or("mqtt://192.168.1.10:1883"),
            mqtt_username: option_env!("BRODBUDDY_MQTT_USERNAME"),
            mqtt_password: option_env!("BRODBUDDY_MQTT_PASSWORD"),
            analyzer_id: option_env!("BRODBUDDY_ANALYZER_ID"),
        }
    }
}
