//! Environment sensors behind [`SensorPort`].
//!
//! [`SensorHub`] gates sampling on an interval, averages several raw reads
//! into one [`SampleBatch`], drops physically implausible values and
//! derives the dough rise from the time-of-flight distance: the first
//! valid distance is the baseline, later ones are reported as percent
//! rise relative to it.

use log::{debug, warn};

use crate::app::ports::SensorPort;
use crate::error::SensorError;
use crate::telemetry::SampleBatch;

const TEMP_RANGE_C: core::ops::RangeInclusive<f32> = -40.0..=85.0;
const HUMIDITY_RANGE: core::ops::RangeInclusive<f32> = 0.0..=100.0;
/// Valid ToF window (mm), exclusive at both ends.
const TOF_MIN_MM: u16 = 20;
const TOF_MAX_MM: u16 = 2_000;

/// Raw reads averaged into one batch.
pub const READS_PER_BATCH: usize = 5;

/// One raw read of the climate sensor and the distance sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub temperature: f32,
    pub humidity: f32,
    /// `None` when the ToF sensor timed out.
    pub distance_mm: Option<u16>,
}

pub trait SampleSource {
    fn read(&mut self) -> Result<RawSample, SensorError>;
}

fn climate_valid(s: &RawSample) -> bool {
    TEMP_RANGE_C.contains(&s.temperature) && HUMIDITY_RANGE.contains(&s.humidity)
}

fn distance_valid(mm: u16) -> bool {
    mm > TOF_MIN_MM && mm < TOF_MAX_MM
}

// ── Hub ───────────────────────────────────────────────────────

pub struct SensorHub<S: SampleSource> {
    source: S,
    interval_ms: u64,
    last_sample_ms: Option<u64>,
    baseline_mm: Option<u16>,
    failed_reads: u32,
}

impl<S: SampleSource> SensorHub<S> {
    pub fn new(source: S, interval_ms: u64) -> Self {
        Self {
            source,
            interval_ms,
            last_sample_ms: None,
            baseline_mm: None,
            failed_reads: 0,
        }
    }

    pub fn failed_reads(&self) -> u32 {
        self.failed_reads
    }

    pub fn baseline_mm(&self) -> Option<u16> {
        self.baseline_mm
    }

    /// Start a new rise measurement on the next sample.
    pub fn reset_baseline(&mut self) {
        self.baseline_mm = None;
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    fn rise_percent(&mut self, mm: u16) -> f32 {
        match self.baseline_mm {
            Some(base) => (f32::from(base) - f32::from(mm)) / f32::from(base) * 100.0,
            None => {
                self.baseline_mm = Some(mm);
                0.0
            }
        }
    }
}

impl<S: SampleSource> SensorPort for SensorHub<S> {
    fn should_sample(&self, now_ms: u64) -> bool {
        self.last_sample_ms
            .is_none_or(|t| now_ms.saturating_sub(t) >= self.interval_ms)
    }

    fn collect_samples(&mut self, now_ms: u64) -> Result<SampleBatch, SensorError> {
        let mut temp = 0.0f32;
        let mut hum = 0.0f32;
        let mut climate_n = 0u32;
        let mut dist_sum = 0u32;
        let mut dist_n = 0u32;
        let mut last_err = SensorError::ReadFailed;

        for _ in 0..READS_PER_BATCH {
            let s = match self.source.read() {
                Ok(s) => s,
                Err(e) => {
                    self.failed_reads += 1;
                    last_err = e;
                    continue;
                }
            };
            if climate_valid(&s) {
                temp += s.temperature;
                hum += s.humidity;
                climate_n += 1;
            } else {
                self.failed_reads += 1;
                last_err = SensorError::OutOfRange;
            }
            match s.distance_mm {
                Some(mm) if distance_valid(mm) => {
                    dist_sum += u32::from(mm);
                    dist_n += 1;
                }
                _ => self.failed_reads += 1,
            }
        }

        // A failed pass also waits out the interval before retrying.
        self.last_sample_ms = Some(now_ms);
        if climate_n == 0 {
            warn!("sensors: no valid climate reading ({})", last_err);
            return Err(last_err);
        }

        let rise = if dist_n > 0 {
            self.rise_percent((dist_sum / dist_n) as u16)
        } else {
            warn!("sensors: no valid distance, rise reported as 0");
            0.0
        };
        let batch = SampleBatch {
            temperature: temp / climate_n as f32,
            humidity: hum / climate_n as f32,
            rise,
        };
        debug!(
            "sensors: T={:.1}C RH={:.1}% rise={:.1}%",
            batch.temperature, batch.humidity, batch.rise
        );
        Ok(batch)
    }
}

// ── Unfitted source ───────────────────────────────────────────

/// Source for builds without a sensor driver.  Every read fails, so no
/// telemetry is published; the control channel and updates keep working.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnfittedSource;

impl SampleSource for UnfittedSource {
    fn read(&mut self) -> Result<RawSample, SensorError> {
        Err(SensorError::NotFitted)
    }
}

// ── Synthetic source ──────────────────────────────────────────

/// Deterministic stand-in: a starter warming slowly while the dough rises.
pub struct SyntheticSource {
    step: u32,
    pub temperature: f32,
    pub humidity: f32,
    pub distance_mm: u16,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self {
            step: 0,
            temperature: 22.0,
            humidity: 65.0,
            distance_mm: 500,
        }
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for SyntheticSource {
    fn read(&mut self) -> Result<RawSample, SensorError> {
        self.step = self.step.wrapping_add(1);
        // Dough surface creeps towards the sensor, one mm per 50 reads.
        let creep = (self.step / 50) as u16;
        Ok(RawSample {
            temperature: self.temperature,
            humidity: self.humidity,
            distance_mm: Some(self.distance_mm.saturating_sub(creep).max(TOF_MIN_MM + 1)),
        })
    }
}
