//! TTL sync clock. Runs inside the generator loop and is timed in sample
//! numbers, the same time base that paces the samples themselves.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::buffer::SYNC_LINE_BIT;

pub const DEFAULT_CLOCK_FREQ_HZ: u32 = 1;

/// Settings shared between the control thread and one generator thread.
#[derive(Debug)]
pub struct ClockControl {
    enabled: AtomicBool,
    frequency_hz: AtomicU32,
    tolerance_hz: AtomicU32,
    toggles: AtomicU64,
}

impl ClockControl {
    pub fn new() -> ClockControl {
        ClockControl {
            enabled: AtomicBool::new(true),
            frequency_hz: AtomicU32::new(DEFAULT_CLOCK_FREQ_HZ),
            tolerance_hz: AtomicU32::new(0f32.to_bits()),
            toggles: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn frequency_hz(&self) -> u32 {
        self.frequency_hz.load(Ordering::Acquire)
    }

    pub fn tolerance_hz(&self) -> f32 {
        f32::from_bits(self.tolerance_hz.load(Ordering::Acquire))
    }

    pub fn set_frequency(&self, frequency_hz: u32, tolerance_hz: f32) {
        self.tolerance_hz.store(tolerance_hz.abs().to_bits(), Ordering::Release);
        self.frequency_hz.store(frequency_hz, Ordering::Release);
    }

    /// Line transitions emitted so far.
    pub fn toggles(&self) -> u64 {
        self.toggles.load(Ordering::Relaxed)
    }
}

impl Default for ClockControl {
    fn default() -> ClockControl {
        ClockControl::new()
    }
}

pub(crate) struct SyncClock {
    control: Arc<ClockControl>,
    sample_rate_hz: f64,
    rng: StdRng,
    enabled: bool,
    level: bool,
    next_toggle: Option<i64>,
}

impl SyncClock {
    pub fn new(control: Arc<ClockControl>, sample_rate_hz: f64, seed: u64) -> SyncClock {
        SyncClock {
            control,
            sample_rate_hz,
            rng: StdRng::seed_from_u64(seed),
            enabled: false,
            level: false,
            next_toggle: None,
        }
    }

    /// Picks up enable/disable from the control side. Called once per block.
    pub fn refresh(&mut self) {
        let enabled = self.control.is_enabled() && self.control.frequency_hz() > 0;
        if !enabled {
            self.level = false;
            self.next_toggle = None;
        }
        self.enabled = enabled;
    }

    /// Event word for `sample_number`, toggling the line when it is due.
    pub fn advance(&mut self, sample_number: i64) -> u64 {
        if !self.enabled {
            return 0;
        }

        let next = match self.next_toggle {
            Some(next) => next,
            None => match self.half_period() {
                Some(half) => {
                    let next = sample_number.saturating_add(half);
                    self.next_toggle = Some(next);
                    next
                }
                None => return self.halt(),
            },
        };

        if sample_number >= next {
            let half = match self.half_period() {
                Some(half) => half,
                None => return self.halt(),
            };
            self.level = !self.level;
            self.control.toggles.fetch_add(1, Ordering::Relaxed);
            self.next_toggle = Some(next.saturating_add(half));
        }

        if self.level {
            SYNC_LINE_BIT
        } else {
            0
        }
    }

    /// Drops the line and idles until the next `refresh` re-enables it.
    fn halt(&mut self) -> u64 {
        if self.level {
            self.control.toggles.fetch_add(1, Ordering::Relaxed);
        }
        self.enabled = false;
        self.level = false;
        self.next_toggle = None;
        0
    }

    /// Samples until the next edge, with the frequency drawn from
    /// `frequency ± tolerance` for every half cycle. `None` at 0 Hz.
    fn half_period(&mut self) -> Option<i64> {
        let freq = f64::from(self.control.frequency_hz());
        if freq <= 0.0 {
            return None;
        }
        // never slower than half the nominal rate
        let tolerance = f64::from(self.control.tolerance_hz()).min(freq / 2.0);
        let actual = if tolerance > 0.0 {
            self.rng.gen_range(freq - tolerance..=freq + tolerance)
        } else {
            freq
        };

        Some(((self.sample_rate_hz / (2.0 * actual)).round() as i64).max(1))
    }
}
