//! Time base conversion.
//!
//! A time base is the number of ticks per second of a stream.

use core::cmp::Ordering;

/// Convert a timestamp from one time base to another.
///
/// The whole seconds and the fractional remainder are scaled separately,
/// so that large tick counts do not accumulate rounding error.
/// The result is rounded to the nearest tick (ties to even).
///
/// The conversion is monotonic in `time`,
/// so applying it to every event of a stream preserves their order.
///
/// # Panics
///
/// Panics if `src_time_base` is zero.
pub fn convert_time_base(time: u64, src_time_base: u32, dst_time_base: u32) -> u64 {
    let src = u128::from(src_time_base);
    let dst = u128::from(dst_time_base);
    let time = u128::from(time);

    let seconds = time / src;
    let scaled_fraction = (time % src) * dst;

    let whole = seconds * dst + scaled_fraction / src;
    let remainder = scaled_fraction % src;

    let rounded = match (remainder * 2).cmp(&src) {
        Ordering::Less => whole,
        Ordering::Greater => whole + 1,
        Ordering::Equal => whole + (whole & 1),
    };
    u64::try_from(rounded).unwrap_or(u64::MAX)
}

/// Convert a duration in seconds to ticks of the given time base,
/// truncating any fractional tick.
///
/// Negative or non-finite values yield 0.
pub fn seconds_to_ticks(seconds: f64, time_base: u32) -> u64 {
    let ticks = seconds * f64::from(time_base);
    if ticks.is_finite() && ticks > 0. {
        ticks as u64
    } else {
        0
    }
}
