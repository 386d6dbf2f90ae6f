//! Panel adapter.
//!
//! [`LogDisplay`] writes the frame that would be drawn to the log.  The
//! e-paper driver implements the same [`DisplayPort`].

use log::info;

use crate::app::ports::DisplayPort;
use crate::telemetry::SampleBatch;

#[derive(Debug, Default)]
pub struct LogDisplay {
    frames: u32,
    last: Option<(SampleBatch, u8)>,
}

impl LogDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn last_frame(&self) -> Option<(SampleBatch, u8)> {
        self.last
    }
}

impl DisplayPort for LogDisplay {
    fn render(&mut self, batch: &SampleBatch, battery_percent: u8) {
        self.frames += 1;
        self.last = Some((*batch, battery_percent));
        info!(
            "DISPLAY | {:.1}\u{00b0}C {:.0}%RH rise={:.1}% bat={}%",
            batch.temperature, batch.humidity, batch.rise, battery_percent
        );
    }
}
