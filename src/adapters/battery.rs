//! LiPo battery gauge behind [`PowerPort`].
//!
//! The cell voltage reaches the ADC through a 1:2 divider.  Percent is a
//! linear map between the empty and full voltages; flashing is allowed at
//! or above `min_percent`.
//!
//! On ESP-IDF the raw value comes from an ADC1 oneshot channel.  On host
//! builds [`FixedVoltage`] stands in.

use log::{debug, warn};

use crate::app::ports::PowerPort;

/// Cell voltage at 0 %.
pub const EMPTY_MV: u32 = 3_300;
/// Cell voltage at 100 %.
pub const FULL_MV: u32 = 4_200;

const ADC_REF_MV: u32 = 3_300;
const ADC_MAX: u32 = 4_095;
const DIVIDER_RATIO: u32 = 2;
/// Samples averaged per measurement.
const SAMPLE_COUNT: u32 = 8;
/// Re-measure at most this often.
const REFRESH_INTERVAL_MS: u64 = 30_000;

/// Raw 12-bit ADC reading of the divided cell voltage.
pub trait VoltageSource {
    fn read_raw(&mut self) -> Option<u16>;
}

pub fn raw_to_millivolts(raw: u16) -> u32 {
    u32::from(raw) * ADC_REF_MV / ADC_MAX * DIVIDER_RATIO
}

pub fn millivolts_to_percent(mv: u32) -> u8 {
    if mv >= FULL_MV {
        return 100;
    }
    if mv <= EMPTY_MV {
        return 0;
    }
    ((mv - EMPTY_MV) * 100 / (FULL_MV - EMPTY_MV)) as u8
}

// ── Gauge ─────────────────────────────────────────────────────

pub struct BatteryGauge<S: VoltageSource> {
    source: S,
    min_percent: u8,
    millivolts: Option<u32>,
    last_refresh_ms: Option<u64>,
}

impl<S: VoltageSource> BatteryGauge<S> {
    pub fn new(source: S, min_percent: u8) -> Self {
        Self {
            source,
            min_percent,
            millivolts: None,
            last_refresh_ms: None,
        }
    }

    /// Take a fresh measurement if the last one is older than the refresh
    /// interval.  Called once per control tick.
    pub fn poll(&mut self, now_ms: u64) {
        let due = self
            .last_refresh_ms
            .is_none_or(|t| now_ms.saturating_sub(t) >= REFRESH_INTERVAL_MS);
        if due {
            self.refresh();
            self.last_refresh_ms = Some(now_ms);
        }
    }

    pub fn refresh(&mut self) {
        let mut sum = 0u32;
        let mut n = 0u32;
        for _ in 0..SAMPLE_COUNT {
            if let Some(raw) = self.source.read_raw() {
                sum += u32::from(raw);
                n += 1;
            }
        }
        if n == 0 {
            warn!("battery: ADC read failed");
            self.millivolts = None;
            return;
        }
        let mv = raw_to_millivolts((sum / n) as u16);
        debug!("battery: {} mV ({}%)", mv, millivolts_to_percent(mv));
        self.millivolts = Some(mv);
    }

    pub fn millivolts(&self) -> Option<u32> {
        self.millivolts
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S: VoltageSource> PowerPort for BatteryGauge<S> {
    /// An unknown level is never safe.
    fn is_safe_to_flash(&self) -> bool {
        self.millivolts.is_some() && self.battery_percent() >= self.min_percent
    }

    fn battery_percent(&self) -> u8 {
        self.millivolts.map_or(0, millivolts_to_percent)
    }
}

// ── Sources ───────────────────────────────────────────────────

/// Constant reading for host runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedVoltage {
    pub raw: Option<u16>,
}

impl FixedVoltage {
    /// Source that reads back as `mv` at the cell.
    pub fn millivolts(mv: u32) -> Self {
        let raw = (mv / DIVIDER_RATIO * ADC_MAX).div_ceil(ADC_REF_MV);
        Self {
            raw: Some(raw.min(ADC_MAX) as u16),
        }
    }
}

impl VoltageSource for FixedVoltage {
    fn read_raw(&mut self) -> Option<u16> {
        self.raw
    }
}

#[cfg(target_os = "espidf")]
pub use esp::AdcVoltage;

#[cfg(target_os = "espidf")]
mod esp {
    use esp_idf_sys::*;
    use log::info;

    use super::VoltageSource;

    /// ADC1 oneshot channel wired to the battery divider.
    pub struct AdcVoltage {
        handle: adc_oneshot_unit_handle_t,
        channel: adc_channel_t,
    }

    impl AdcVoltage {
        pub fn new(channel: adc_channel_t) -> Result<Self, i32> {
            let init_cfg = adc_oneshot_unit_init_cfg_t {
                unit_id: adc_unit_t_ADC_UNIT_1,
                ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
                ..Default::default()
            };
            let mut handle: adc_oneshot_unit_handle_t = core::ptr::null_mut();
            let ret = unsafe { adc_oneshot_new_unit(&init_cfg, &mut handle) };
            if ret != ESP_OK as i32 {
                return Err(ret);
            }
            let chan_cfg = adc_oneshot_chan_cfg_t {
                atten: adc_atten_t_ADC_ATTEN_DB_12,
                bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
            };
            let ret = unsafe { adc_oneshot_config_channel(handle, channel, &chan_cfg) };
            if ret != ESP_OK as i32 {
                return Err(ret);
            }
            info!("battery: ADC1 channel {} configured", channel);
            Ok(Self { handle, channel })
        }
    }

    impl VoltageSource for AdcVoltage {
        fn read_raw(&mut self) -> Option<u16> {
            let mut raw: i32 = 0;
            let ret = unsafe { adc_oneshot_read(self.handle, self.channel, &mut raw) };
            (ret == ESP_OK as i32).then_some(raw.max(0) as u16)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_clamped_and_linear() {
        assert_eq!(millivolts_to_percent(3_000), 0);
        assert_eq!(millivolts_to_percent(EMPTY_MV), 0);
        assert_eq!(millivolts_to_percent(3_750), 50);
        assert_eq!(millivolts_to_percent(FULL_MV), 100);
        assert_eq!(millivolts_to_percent(4_500), 100);
    }

    #[test]
    fn unknown_level_blocks_flashing() {
        let gauge = BatteryGauge::new(FixedVoltage { raw: None }, 20);
        assert!(!gauge.is_safe_to_flash());
        assert_eq!(gauge.battery_percent(), 0);
    }

    #[test]
    fn threshold_gates_flashing() {
        let mut full = BatteryGauge::new(FixedVoltage::millivolts(4_100), 20);
        full.poll(0);
        assert!(full.is_safe_to_flash());

        let mut low = BatteryGauge::new(FixedVoltage::millivolts(3_400), 20);
        low.poll(0);
        assert!(low.battery_percent() < 20);
        assert!(!low.is_safe_to_flash());
    }

    #[test]
    fn refresh_is_rate_limited() {
        let mut gauge = BatteryGauge::new(FixedVoltage::millivolts(4_000), 20);
        gauge.poll(0);
        let first = gauge.millivolts();
        gauge.source_mut().raw = None;
        gauge.poll(10_000);
        assert_eq!(gauge.millivolts(), first);
        gauge.poll(30_000);
        assert_eq!(gauge.millivolts(), None);
    }
}
