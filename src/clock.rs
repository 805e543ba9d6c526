//! Kernel time base
//!
//! `lbolt` counts ticks of 2^23 ns since the process first asked for the
//! time, which comes out at roughly [`HZ`] ticks per second.

use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Tick count, as returned by [`lbolt`]
pub type Clock = i64;

/// Ticks per second when one tick is 2^23 ns
pub const HZ: Clock = 119;

const TICK_SHIFT: u32 = 23;

static EPOCH: OnceLock<Instant> = OnceLock::new();

fn epoch() -> Instant {
    *EPOCH.get_or_init(Instant::now)
}

/// Monotonic high-resolution time in nanoseconds
pub fn gethrtime() -> u64 {
    u64::try_from(epoch().elapsed().as_nanos()).unwrap_or(u64::MAX)
}

/// Current tick count
pub fn lbolt() -> Clock {
    (gethrtime() >> TICK_SHIFT) as Clock
}

/// Wall-clock seconds since the Unix epoch
pub fn gethrestime_sec() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Length of `ticks` ticks; non-positive counts are zero
pub fn ticks_to_duration(ticks: Clock) -> Duration {
    match u64::try_from(ticks) {
        Ok(ticks) => Duration::from_nanos(ticks.saturating_mul(1 << TICK_SHIFT)),
        Err(_) => Duration::ZERO,
    }
}

/// Whole ticks in `duration`, saturating
pub fn duration_to_ticks(duration: Duration) -> Clock {
    Clock::try_from(duration.as_nanos() >> TICK_SHIFT).unwrap_or(Clock::MAX)
}

/// The instant an absolute tick count refers to
pub fn lbolt_to_instant(abstime: Clock) -> Instant {
    let offset = ticks_to_duration(abstime);
    epoch().checked_add(offset).unwrap_or_else(|| epoch() + Duration::from_secs(u32::MAX as u64))
}

/// Sleep for `ticks` ticks
pub fn delay(ticks: Clock) {
    let duration = ticks_to_duration(ticks);
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}
