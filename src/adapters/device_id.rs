//! Analyzer identity.
//!
//! The backend registers every analyzer under a GUID and addresses it as
//! `analyzer/{id}/...`.  A provisioned id is baked in at build time; a
//! board flashed without one falls back to `BB-XXYYZZ`, the tail of its
//! factory MAC, so it can still be enrolled by hand.

use log::warn;

use crate::config::ConfigError;

/// Large enough for a hyphenated GUID (36 chars).
pub type DeviceIdString = heapless::String<40>;

pub type MacAddress = [u8; 6];

const FALLBACK_PREFIX: &str = "BB-";
const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Factory MAC from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    let rc = unsafe { esp_idf_sys::esp_efuse_mac_get_default(mac.as_mut_ptr()) };
    if rc != esp_idf_sys::ESP_OK {
        warn!("device id: eFuse MAC read failed ({})", rc);
    }
    mac
}

#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0x24, 0x6F, 0x28, 0x5B, 0x10, 0xD4]
}

/// Check a provisioned id.  It becomes a topic level, so MQTT wildcards,
/// separators and whitespace are refused.
pub fn parse(raw: &str) -> Result<DeviceIdString, ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::Invalid("analyzer id is empty"));
    }
    if raw
        .bytes()
        .any(|b| matches!(b, b'/' | b'+' | b'#') || !b.is_ascii_graphic())
    {
        return Err(ConfigError::Invalid("analyzer id is not a valid topic level"));
    }
    let mut id = DeviceIdString::new();
    id.push_str(raw)
        .map_err(|_| ConfigError::Invalid("analyzer id longer than 40 bytes"))?;
    Ok(id)
}

/// `BB-` followed by the last three MAC bytes in upper-case hex.
pub fn from_mac(mac: &MacAddress) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    // 3 + 6 bytes always fit in 40.
    let _ = id.push_str(FALLBACK_PREFIX);
    for byte in &mac[3..] {
        let _ = id.push(char::from(HEX[usize::from(byte >> 4)]));
        let _ = id.push(char::from(HEX[usize::from(byte & 0x0F)]));
    }
    id
}

/// Provisioned id when it is usable, otherwise the MAC-derived one.
pub fn resolve(provisioned: Option<&str>, mac: &MacAddress) -> DeviceIdString {
    match provisioned.map(parse) {
        Some(Ok(id)) => id,
        Some(Err(e)) => {
            let fallback = from_mac(mac);
            warn!("device id: provisioned id rejected ({}), using {}", e, fallback);
            fallback
        }
        None => from_mac(mac),
    }
}
