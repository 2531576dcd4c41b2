//! Timestamp and duration conversions.

use std::time::{SystemTime, UNIX_EPOCH};

use prost_types::{Duration, Timestamp};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Nanoseconds since the Unix epoch. Times before the epoch map to 0.
pub fn to_nanos(time: SystemTime) -> u64 {
    let nanos = time.duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    u64::try_from(nanos).unwrap_or(u64::MAX)
}

/// Split epoch nanoseconds into whole seconds and the nanosecond remainder.
pub fn timestamp_from_epoch_nanos(nanos: u64) -> Timestamp {
    Timestamp {
        seconds: (nanos / NANOS_PER_SECOND as u64) as i64,
        nanos: (nanos % NANOS_PER_SECOND as u64) as i32,
    }
}

/// Elapsed time from `start` to `end`.
///
/// The nanosecond component is kept within `[0, 1e9)`. A negative interval is
/// represented with negative seconds, it is not clamped to zero.
pub fn duration_between(start: &Timestamp, end: &Timestamp) -> Duration {
    let nanos = i64::from(end.nanos) - i64::from(start.nanos);
    Duration {
        seconds: end
            .seconds
            .saturating_sub(start.seconds)
            .saturating_add(nanos.div_euclid(NANOS_PER_SECOND)),
        nanos: nanos.rem_euclid(NANOS_PER_SECOND) as i32,
    }
}

/// Convert nanoseconds to microseconds, rounding halves up.
pub fn nsec_to_usec_round(nanos: u64) -> u64 {
    nanos / 1000 + u64::from(nanos % 1000 >= 500)
}
