//! Monotonic clock gate used to pace frame delivery.
//!
//! Pacing is expressed as absolute [`Instant`] targets rather than relative
//! durations, so a late wake-up on one frame does not shift the schedule of
//! the frames that follow. `Instant` is backed by the OS monotonic clock and
//! is not affected by wall-clock adjustments.
use std::time::{Duration, Instant};

/// Block the calling thread until the monotonic clock reaches `target`.
///
/// Returns immediately when `target` is already in the past. The remaining
/// time is re-checked after every wake-up, so an early return from the
/// underlying sleep never releases the caller before `target`.
pub fn sleep_until(target: Instant) {
    loop {
        let now = Instant::now();
        if now >= target {
            return;
        }
        std::thread::sleep(target - now);
    }
}

/// Delivery instant for a frame `delta_ns` after the pacing base, scaled by `speed`.
///
/// `speed` divides the source delta: 2.0 replays twice as fast as captured.
/// Returns `None` if the target cannot be represented as an `Instant`.
pub fn scaled_target(anchor: Instant, delta_ns: u64, speed: f64) -> Option<Instant> {
    let scaled = (delta_ns as f64 / speed) as u64; // saturating cast
    anchor.checked_add(Duration::from_nanos(scaled))
}
