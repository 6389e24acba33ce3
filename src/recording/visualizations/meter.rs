//! Input level metering.
//!
//! Converts the RMS of the most recent samples to dBFS and maps it onto a
//! 0-100% scale whose top is the configured reference level. The highest
//! reading of the last few seconds is held for the peak indicator.

use std::time::{Duration, Instant};

const PEAK_HOLD: Duration = Duration::from_secs(3);
/// Dynamic range shown below the reference level.
const RANGE_DB: f32 = 40.0;
/// Floor so the meter never disappears completely while recording.
const MIN_LEVEL: f32 = 4.0;

pub struct LevelMeter {
    reference_level_db: i8,
    last_level: u8,
    peak_hold: u8,
    peak_hold_time: Instant,
}

impl LevelMeter {
    pub fn new(reference_level_db: i8) -> Self {
        Self {
            reference_level_db,
            last_level: 0,
            peak_hold: 0,
            peak_hold_time: Instant::now(),
        }
    }

    /// Measures `samples` and updates the peak hold. Returns the level in percent.
    pub fn measure(&mut self, samples: &[i16]) -> u8 {
        let level = level_percent(samples, self.reference_level_db);
        self.last_level = level;

        if level > self.peak_hold || self.peak_hold_time.elapsed() >= PEAK_HOLD {
            self.peak_hold = level;
            self.peak_hold_time = Instant::now();
        }
        level
    }

    pub fn level(&self) -> u8 {
        self.last_level
    }

    pub fn peak(&self) -> u8 {
        self.peak_hold
    }

    pub fn reset(&mut self) {
        self.last_level = 0;
        self.peak_hold = 0;
    }
}

/// RMS level of `samples` relative to `reference_level_db`, in percent.
pub fn level_percent(samples: &[i16], reference_level_db: i8) -> u8 {
    if samples.is_empty() {
        return 0;
    }

    let sum_of_squares: i64 = samples.iter().map(|&x| (x as i64).pow(2)).sum();
    let mean_square = sum_of_squares / samples.len() as i64;
    let rms = (mean_square as f32).sqrt();

    let db_fs = if rms > 0.0 {
        20.0 * (rms / i16::MAX as f32).log10()
    } else {
        -160.0
    };

    let min_db = reference_level_db as f32 - RANGE_DB;
    ((db_fs - min_db) / RANGE_DB * 100.0).clamp(MIN_LEVEL, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(level_percent(&[], -20), 0);
    }

    #[test]
    fn test_silence_hits_floor() {
        assert_eq!(level_percent(&[0; 64], -20), MIN_LEVEL as u8);
    }

    #[test]
    fn test_full_scale_is_clamped() {
        assert_eq!(level_percent(&[i16::MAX; 64], -20), 100);
    }

    #[test]
    fn test_reference_level_maps_to_top() {
        // -20 dBFS is a tenth of full scale.
        let amplitude = (i16::MAX as f32 / 10.0) as i16;
        let level = level_percent(&[amplitude, -amplitude].repeat(32), -20);
        assert!(level >= 99, "got {level}");
    }

    #[test]
    fn test_peak_hold_keeps_maximum() {
        let mut meter = LevelMeter::new(-20);
        let loud = meter.measure(&[i16::MAX; 16]);
        meter.measure(&[0; 16]);
        assert_eq!(meter.peak(), loud);
        assert_eq!(meter.level(), MIN_LEVEL as u8);

        meter.reset();
        assert_eq!(meter.peak(), 0);
    }
}
