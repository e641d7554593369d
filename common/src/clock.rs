//! LTE Downlink Frame Clock
//!
//! Pure arithmetic over system frame numbers (mod 1024), subframe indices
//! (mod 10) and split whole/fractional radio timestamps.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of radio frames before the system frame number wraps
pub const SFN_PERIOD: u32 = 1024;

/// Number of 1 ms subframes in a 10 ms radio frame
pub const SUBFRAMES_PER_FRAME: u32 = 10;

/// Number of frames a broadcast (MIB) codeword is repeated over
pub const BCH_REPETITION_FRAMES: u32 = 4;

/// Subframe carrying PBCH (and PSS/SSS) in FDD
pub const BROADCAST_SUBFRAME: u32 = 0;

/// Duration of one subframe in seconds
pub const SUBFRAME_DURATION_S: f64 = 1e-3;

/// Duration of one radio frame in seconds
pub const FRAME_DURATION_S: f64 = 1e-2;

/// Advance a system frame number by one, wrapping at 1024
pub fn advance_frame(frame_number: u32) -> u32 {
    advance_frame_by(frame_number, 1)
}

/// Advance a system frame number by `frames`, wrapping at 1024
pub fn advance_frame_by(frame_number: u32, frames: u32) -> u32 {
    ((frame_number % SFN_PERIOD) + (frames % SFN_PERIOD)) % SFN_PERIOD
}

/// Frames from `current` forward to `reference`, modulo 1024
///
/// Computed with signed intermediates so that `reference < current`
/// never underflows.
pub fn phase_offset(reference: u32, current: u32) -> u32 {
    let period = SFN_PERIOD as i64;
    let diff = reference as i64 % period - current as i64 % period + period;
    (diff % period) as u32
}

/// Position of `current` inside the 4-frame broadcast repetition cycle
/// anchored at `reference`
pub fn repetition_phase(reference: u32, current: u32) -> u32 {
    phase_offset(reference, current) % BCH_REPETITION_FRAMES
}

/// Frames elapsed going forward from `earlier` to `later`, modulo 1024
pub fn frames_between(earlier: u32, later: u32) -> u32 {
    phase_offset(later, earlier)
}

/// Carry a fractional-second part into whole seconds
///
/// Accepts any finite `frac_secs` (negative or `>= 1.0`) and returns a pair
/// whose fractional part lies in `[0, 1)`.
pub fn normalize_timestamp(full_secs: i64, frac_secs: f64) -> (i64, f64) {
    let carry = frac_secs.floor();
    let mut full = full_secs + carry as i64;
    let mut frac = frac_secs - carry;

    // floor() of a tiny negative value leaves 1.0 - epsilon, which rounds to 1.0
    if frac >= 1.0 {
        full += 1;
        frac = 0.0;
    }
    if frac < 0.0 {
        frac = 0.0;
    }

    (full, frac)
}

/// Radio timestamp split into whole and fractional seconds
///
/// This is the clock domain of the front end: receive timestamps and timed
/// transmissions both use it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RadioTimestamp {
    /// Whole seconds
    pub full_secs: i64,
    /// Fractional seconds, always in `[0, 1)`
    pub frac_secs: f64,
}

impl RadioTimestamp {
    /// Create a normalized timestamp
    pub fn new(full_secs: i64, frac_secs: f64) -> Self {
        let (full_secs, frac_secs) = normalize_timestamp(full_secs, frac_secs);
        Self { full_secs, frac_secs }
    }

    /// Create from a floating-point second count
    pub fn from_secs_f64(secs: f64) -> Self {
        Self::new(0, secs)
    }

    /// Timestamp of sample `index` at `sample_rate` Hz, counted from zero
    pub fn from_sample_index(index: u64, sample_rate: f64) -> Self {
        let rate = sample_rate as u64;
        if rate > 0 && (rate as f64 - sample_rate).abs() < f64::EPSILON {
            // Integer rates keep full precision for long runs
            let full = (index / rate) as i64;
            let frac = (index % rate) as f64 / sample_rate;
            Self::new(full, frac)
        } else {
            Self::from_secs_f64(index as f64 / sample_rate)
        }
    }

    /// Re-normalize in place
    pub fn normalize(&mut self) {
        let (full, frac) = normalize_timestamp(self.full_secs, self.frac_secs);
        self.full_secs = full;
        self.frac_secs = frac;
    }

    /// Add a (possibly negative) second offset and normalize
    pub fn add_offset(&self, offset_secs: f64) -> Self {
        Self::new(self.full_secs, self.frac_secs + offset_secs)
    }

    /// Seconds from `earlier` to `self`
    pub fn secs_since(&self, earlier: &RadioTimestamp) -> f64 {
        (self.full_secs - earlier.full_secs) as f64 + (self.frac_secs - earlier.frac_secs)
    }

    /// Lossy conversion to a single float
    pub fn as_secs_f64(&self) -> f64 {
        self.full_secs as f64 + self.frac_secs
    }
}

impl fmt::Display for RadioTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{:.6}s", self.full_secs, self.frac_secs)
    }
}

/// Absolute downlink timing: frame number, subframe index and radio time
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameClock {
    /// System frame number, `[0, 1024)`
    pub frame_number: u32,
    /// Subframe index within the frame, `[0, 10)`
    pub subframe_index: u32,
    /// Radio timestamp of the first sample of this subframe
    pub timestamp: RadioTimestamp,
}

impl FrameClock {
    /// Create a clock value, wrapping counters into their periods
    pub fn new(frame_number: u32, subframe_index: u32, timestamp: RadioTimestamp) -> Self {
        Self {
            frame_number: frame_number % SFN_PERIOD,
            subframe_index: subframe_index % SUBFRAMES_PER_FRAME,
            timestamp,
        }
    }

    /// Whether this subframe carries the broadcast channel
    pub fn is_broadcast_subframe(&self) -> bool {
        self.subframe_index == BROADCAST_SUBFRAME
    }

    /// Whether this subframe opens a new radio frame
    pub fn is_frame_start(&self) -> bool {
        self.subframe_index % SUBFRAMES_PER_FRAME == 0
    }
}

impl fmt::Display for FrameClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sfn={} sf={} t={}", self.frame_number, self.subframe_index, self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_advance_frame_wraps() {
        assert_eq!(advance_frame(0), 1);
        assert_eq!(advance_frame(1022), 1023);
        assert_eq!(advance_frame(1023), 0);
        assert_eq!(advance_frame_by(1020, 4), 0);
        assert_eq!(advance_frame_by(10, 1024 + 3), 13);
    }

    #[test]
    fn test_phase_offset_sequence() {
        // Reference 10, current 11..14 counts down through the repetition cycle
        let phases: Vec<u32> = (11..=14).map(|cur| repetition_phase(10, cur)).collect();
        assert_eq!(phases, vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_phase_offset_across_wrap() {
        assert_eq!(phase_offset(2, 1020), 6);
        assert_eq!(phase_offset(1020, 2), 1018);
        assert_eq!(frames_between(1022, 1), 3);
    }

    #[test]
    fn test_add_offset_carries_into_seconds() {
        let ts = RadioTimestamp::new(5, 0.95).add_offset(0.1);
        assert_eq!(ts.full_secs, 6);
        assert!((ts.frac_secs - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_add_negative_offset_borrows() {
        let ts = RadioTimestamp::new(3, 0.01).add_offset(-0.02);
        assert_eq!(ts.full_secs, 2);
        assert!((ts.frac_secs - 0.99).abs() < 1e-9);
    }

    #[test]
    fn test_tiny_negative_fraction_does_not_round_to_one() {
        let (full, frac) = normalize_timestamp(7, -1e-18);
        assert!((0.0..1.0).contains(&frac));
        assert!(full == 6 || full == 7);
    }

    #[test]
    fn test_from_sample_index() {
        let ts = RadioTimestamp::from_sample_index(5_760_000 * 2 + 5_760, 5.76e6);
        assert_eq!(ts.full_secs, 2);
        assert!((ts.frac_secs - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_frame_clock_wraps_counters() {
        let clock = FrameClock::new(1030, 12, RadioTimestamp::default());
        assert_eq!(clock.frame_number, 6);
        assert_eq!(clock.subframe_index, 2);
        assert!(!clock.is_broadcast_subframe());
    }

    proptest! {
        #[test]
        fn prop_advance_frame_is_cyclic(fn0 in 0u32..SFN_PERIOD) {
            let mut f = fn0;
            for _ in 0..SFN_PERIOD {
                f = advance_frame(f);
            }
            prop_assert_eq!(f, fn0);
        }

        #[test]
        fn prop_phase_offset_in_range(reference in 0u32..SFN_PERIOD, current in 0u32..SFN_PERIOD) {
            let offset = phase_offset(reference, current);
            prop_assert!(offset < SFN_PERIOD);
            prop_assert_eq!(phase_offset(reference, reference), 0);
            prop_assert_eq!(advance_frame_by(current, offset), reference);
        }

        #[test]
        fn prop_normalize_range_and_idempotent(full in -1_000_000i64..1_000_000, frac in -50.0f64..50.0) {
            let (f1, r1) = normalize_timestamp(full, frac);
            prop_assert!((0.0..1.0).contains(&r1));
            let (f2, r2) = normalize_timestamp(f1, r1);
            prop_assert_eq!(f1, f2);
            prop_assert_eq!(r1, r2);
        }
    }
}
