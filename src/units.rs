//! Simulation time base.
//!
//! One tick is five seconds of wall time, so an hour of carbon data
//! stretches to [`TICKS_PER_HOUR`] samples.

/// Seconds represented by one simulation tick.
pub const SECONDS_PER_TICK: u64 = 5;

/// Ticks per simulated hour.
pub const TICKS_PER_HOUR: usize = 3600 / SECONDS_PER_TICK as usize;

/// Hours in a day; the threshold suspend mode looks this far ahead.
pub const HOURS_PER_DAY: usize = 24;

/// Absolute simulation time, in ticks.
pub type Tick = usize;

/// Converts a tick count to hours for a given tick resolution.
pub fn ticks_to_hours(ticks: u64, ticks_per_hour: usize) -> f64 {
    ticks as f64 / ticks_per_hour as f64
}

/// Converts seconds to whole ticks, rounding up so short jobs never vanish.
pub fn seconds_to_ticks(seconds: u64) -> usize {
    seconds.div_ceil(SECONDS_PER_TICK) as usize
}
