//! Device lifecycle state machine.
//!
//! ```text
//!  Boot ─▶ ConnectingNetwork ─▶ ConnectingControlChannel ─▶ Sensing
//!               │  ▲                                         │
//!               ▼  │                                         ▼
//!             Error│                                  UpdatingDisplay
//!                  │                                         │
//!                  │                                         ▼
//!                  └──────── Sleeping ◀──────────────── PublishingData
//!                              │  ▲                          │
//!                              ▼  │                          ▼
//!                            Sensing └──────────────── ApplyingUpdate
//! ```
//!
//! The machine only tracks *where* the device is and *since when*.  The
//! decision of where to go next lives in the phase handlers of
//! [`Controller`](crate::app::controller::Controller); every move goes
//! through [`Lifecycle::transition_to`] so it is logged exactly once.

use core::time::Duration;

use log::info;

// ---------------------------------------------------------------------------
// Phase identity
// ---------------------------------------------------------------------------

/// Top-level lifecycle phase.  Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Phase {
    Boot = 0,
    ConnectingNetwork = 1,
    ConnectingControlChannel = 2,
    Sensing = 3,
    UpdatingDisplay = 4,
    PublishingData = 5,
    Sleeping = 6,
    ApplyingUpdate = 7,
    Error = 8,
}

/// Display names, indexed by `Phase as usize`.
const PHASE_NAMES: [&str; Phase::COUNT] = [
    "BOOT",
    "CONNECTING_NETWORK",
    "CONNECTING_CONTROL_CHANNEL",
    "SENSING",
    "UPDATING_DISPLAY",
    "PUBLISHING_DATA",
    "SLEEPING",
    "APPLYING_UPDATE",
    "ERROR",
];

impl Phase {
    /// Total number of phases.
    pub const COUNT: usize = 9;

    /// Convert an index back to `Phase`.  Out-of-range maps to `Error`.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Boot,
            1 => Self::ConnectingNetwork,
            2 => Self::ConnectingControlChannel,
            3 => Self::Sensing,
            4 => Self::UpdatingDisplay,
            5 => Self::PublishingData,
            6 => Self::Sleeping,
            7 => Self::ApplyingUpdate,
            8 => Self::Error,
            _ => {
                debug_assert!(false, "invalid phase index: {idx}");
                Self::Error
            }
        }
    }

    /// Upper-snake name used in logs and the diagnostics report.
    pub fn name(self) -> &'static str {
        PHASE_NAMES[self as usize]
    }
}

impl core::fmt::Display for Phase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Lifecycle tracker
// ---------------------------------------------------------------------------

/// Current phase, the phase before it, and when the current one began.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    current: Phase,
    previous: Phase,
    /// Monotonic milliseconds at which `current` was entered.
    entered_at_ms: u64,
}

impl Lifecycle {
    /// Start in `Boot`, with `previous == current`.
    pub fn new(now_ms: u64) -> Self {
        Self {
            current: Phase::Boot,
            previous: Phase::Boot,
            entered_at_ms: now_ms,
        }
    }

    /// Move to `next`.  Transitioning to the current phase is a no-op and
    /// does not reset the phase timer.  Returns `true` if the phase changed.
    pub fn transition_to(&mut self, next: Phase, now_ms: u64) -> bool {
        if next == self.current {
            return false;
        }
        info!("transition: {} -> {}", self.current, next);
        self.previous = self.current;
        self.current = next;
        self.entered_at_ms = now_ms;
        true
    }

    pub fn current(&self) -> Phase {
        self.current
    }

    pub fn previous(&self) -> Phase {
        self.previous
    }

    pub fn entered_at_ms(&self) -> u64 {
        self.entered_at_ms
    }

    /// Time spent in the current phase.  A clock reading older than the
    /// entry stamp yields zero.
    pub fn time_in_current_state(&self, now_ms: u64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.entered_at_ms))
    }

    /// `true` once the current phase has lasted at least `threshold`.
    pub fn should_transition(&self, threshold: Duration, now_ms: u64) -> bool {
        self.time_in_current_state(now_ms) >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_boot() {
        let lc = Lifecycle::new(0);
        assert_eq!(lc.current(), Phase::Boot);
        assert_eq!(lc.previous(), Phase::Boot);
    }

    #[test]
    fn transition_records_previous_and_stamp() {
        let mut lc = Lifecycle::new(10);
        assert!(lc.transition_to(Phase::ConnectingNetwork, 250));
        assert_eq!(lc.current(), Phase::ConnectingNetwork);
        assert_eq!(lc.previous(), Phase::Boot);
        assert_eq!(lc.entered_at_ms(), 250);
    }

    #[test]
    fn self_transition_is_noop() {
        let mut lc = Lifecycle::new(0);
        lc.transition_to(Phase::Sensing, 100);
        assert!(!lc.transition_to(Phase::Sensing, 900));
        assert_eq!(lc.entered_at_ms(), 100);
        assert_eq!(lc.previous(), Phase::Boot);
    }

    #[test]
    fn time_in_state_measures_from_entry() {
        let mut lc = Lifecycle::new(0);
        lc.transition_to(Phase::Sleeping, 1_000);
        assert_eq!(lc.time_in_current_state(3_500), Duration::from_millis(2_500));
    }

    #[test]
    fn time_in_state_saturates_on_clock_skew() {
        let lc = Lifecycle::new(5_000);
        assert_eq!(lc.time_in_current_state(1_000), Duration::ZERO);
    }

    #[test]
    fn should_transition_is_inclusive() {
        let mut lc = Lifecycle::new(0);
        lc.transition_to(Phase::Error, 1_000);
        let delay = Duration::from_secs(5);
        assert!(!lc.should_transition(delay, 5_999));
        assert!(lc.should_transition(delay, 6_000));
    }

    #[test]
    fn phase_from_index_roundtrip() {
        for i in 0..Phase::COUNT {
            assert_eq!(Phase::from_index(i) as usize, i);
        }
    }

    #[test]
    fn phase_names_are_distinct() {
        for i in 0..Phase::COUNT {
            for j in (i + 1)..Phase::COUNT {
                assert_ne!(Phase::from_index(i).name(), Phase::from_index(j).name());
            }
        }
    }
}
