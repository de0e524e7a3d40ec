//! # Wire Time Conversion
//!
//! Conversion between absolute timestamps and the protocol's (second-of-century,
//! fraction-of-second) pair. The fraction counts ticks of a timebase, always 2^24 for
//! this protocol, and shares its 32-bit word with the time quality byte.
//!
//! All arithmetic is integer with a half-unit rounding bias so encode followed by decode
//! lands within one timebase tick of the original instant.

use chrono::{DateTime, Utc};

use super::common::{TimeQualityFlags, TimeQualityIndicatorCode, TIME_QUALITY_FLAGS_MASK};

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// A timestamp split the way it travels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WireTime {
    pub second_of_century: u32,
    /// Ticks of the timebase, always below the timebase.
    pub fraction: u32,
}

impl WireTime {
    /// Packs the fraction with the time quality byte into one word.
    pub fn fraction_word(
        &self,
        flags: TimeQualityFlags,
        indicator: TimeQualityIndicatorCode,
    ) -> u32 {
        (self.fraction & !TIME_QUALITY_FLAGS_MASK)
            | (flags.0 & TIME_QUALITY_FLAGS_MASK)
            | indicator.to_fraction_bits()
    }

    /// SOC followed by the fraction word, as in a plain header.
    pub fn to_hex(&self, quality: u8) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[0..4].copy_from_slice(&self.second_of_century.to_be_bytes());
        let word = (self.fraction & !TIME_QUALITY_FLAGS_MASK) | ((quality as u32) << 24);
        buf[4..8].copy_from_slice(&word.to_be_bytes());
        buf
    }
}

// Instants before 1970 or past 2106 cannot be represented and are clamped.
fn split(timestamp: &DateTime<Utc>) -> (u32, u64) {
    let seconds = timestamp.timestamp().clamp(0, u32::MAX as i64) as u32;
    // chrono reports a leap second as nanos >= 1e9
    let nanos = (timestamp.timestamp_subsec_nanos() as u64).min(NANOS_PER_SECOND - 1);
    (seconds, nanos)
}

fn carry(seconds: u32, fraction: u64, timebase: u64) -> WireTime {
    if fraction >= timebase {
        WireTime {
            second_of_century: seconds.saturating_add(1),
            fraction: (fraction - timebase) as u32,
        }
    } else {
        WireTime {
            second_of_century: seconds,
            fraction: fraction as u32,
        }
    }
}

/// Converts a timestamp to wire time, rounding the fraction to the nearest tick.
pub fn to_wire_time(timestamp: &DateTime<Utc>, timebase: u32) -> WireTime {
    let (seconds, nanos) = split(timestamp);
    let timebase = timebase as u64;
    let fraction = (nanos * timebase + NANOS_PER_SECOND / 2) / NANOS_PER_SECOND;
    carry(seconds, fraction, timebase)
}

/// Converts a timestamp to wire time quantised to the nearest frame boundary.
///
/// Used when a configuration frame supplies the frame rate: the fraction is derived
/// from the frame index rather than the raw sub-second part, which removes jitter
/// from publishers whose clocks sample slightly off the frame boundary.
pub fn to_wire_time_high_precision(
    timestamp: &DateTime<Utc>,
    timebase: u32,
    frames_per_second: u16,
) -> WireTime {
    if frames_per_second == 0 {
        return to_wire_time(timestamp, timebase);
    }

    let (seconds, nanos) = split(timestamp);
    let timebase = timebase as u64;
    let fps = frames_per_second as u64;

    let frame_index = (nanos * fps + NANOS_PER_SECOND / 2) / NANOS_PER_SECOND;
    let fraction = (timebase * frame_index + fps / 2) / fps;
    carry(seconds, fraction, timebase)
}

/// Rebuilds a timestamp from wire time. Quality bits in the fraction word are ignored.
pub fn from_wire_time(second_of_century: u32, fraction_word: u32, timebase: u32) -> DateTime<Utc> {
    let fraction = (fraction_word & !TIME_QUALITY_FLAGS_MASK) as u64;
    let timebase = (timebase as u64).max(1);
    let nanos = (fraction * NANOS_PER_SECOND + timebase / 2) / timebase;
    let total = second_of_century as i64 * NANOS_PER_SECOND as i64 + nanos as i64;
    DateTime::from_timestamp_nanos(total)
}

/// Current wall clock time in wire form.
pub fn now_wire_time(timebase: u32) -> WireTime {
    to_wire_time(&Utc::now(), timebase)
}
