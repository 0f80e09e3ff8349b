use std::path::{Path, PathBuf};

use crate::error::ReplayError;

/// Per-run replay options.
///
/// Built once and copied into a session; the session never mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOptions {
    /// Log file to replay (required).
    pub source: PathBuf,
    /// Speed factor: 1.0 = captured pace, 2.0 = twice as fast.
    pub speed: f64,
    /// Skip frames earlier than this many seconds after the first frame of a pass.
    pub start_offset_s: f64,
    /// Rewind and replay again at end of stream.
    pub looping: bool,
    /// Deliver as fast as possible, ignoring timestamps.
    pub no_sleep: bool,
    /// Only lines containing this literal substring are eligible.
    pub filter: Option<String>,
    /// Stop a pass after this many delivered frames (0 = unlimited).
    pub hard_stop: u64,
    /// Stop a looping run after this many passes (0 = unlimited).
    pub max_passes: u64,
    /// Log per-pass summaries at info level.
    pub verbose: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            speed: 1.0,
            start_offset_s: 0.0,
            looping: false,
            no_sleep: false,
            filter: None,
            hard_stop: 0,
            max_passes: 0,
            verbose: false,
        }
    }
}

impl ReplayOptions {
    pub fn new(source: impl AsRef<Path>) -> Self {
        Self { source: source.as_ref().to_path_buf(), ..Self::default() }
    }

    pub fn speed(mut self, speed: f64) -> Self { self.speed = speed; self }
    pub fn start_offset_s(mut self, secs: f64) -> Self { self.start_offset_s = secs; self }
    pub fn looping(mut self, on: bool) -> Self { self.looping = on; self }
    pub fn no_sleep(mut self, on: bool) -> Self { self.no_sleep = on; self }
    pub fn filter(mut self, filter: impl Into<String>) -> Self { self.filter = Some(filter.into()); self }
    pub fn hard_stop(mut self, n: u64) -> Self { self.hard_stop = n; self }
    pub fn max_passes(mut self, n: u64) -> Self { self.max_passes = n; self }
    pub fn verbose(mut self, on: bool) -> Self { self.verbose = on; self }

    /// Check required fields and normalize the rest.
    ///
    /// A non-positive (or NaN) speed falls back to 1.0, so `speed > 0` holds
    /// for every validated option set.
    pub fn validated(mut self) -> Result<Self, ReplayError> {
        if self.source.as_os_str().is_empty() {
            return Err(ReplayError::MissingSource);
        }
        if !(self.speed > 0.0) {
            self.speed = 1.0;
        }
        if self.filter.as_deref() == Some("") {
            self.filter = None;
        }
        Ok(self)
    }

    /// Start offset in whole nanoseconds, rounded to nearest.
    pub fn start_offset_ns(&self) -> i64 {
        (self.start_offset_s * 1e9).round() as i64 // saturating cast, NaN -> 0
    }

    /// Number of passes a run may make; `None` means unbounded.
    pub fn pass_limit(&self) -> Option<u64> {
        match (self.looping, self.max_passes) {
            (false, _) => Some(1),
            (true, 0) => None,
            (true, n) => Some(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_source_is_rejected() {
        assert!(matches!(ReplayOptions::default().validated(), Err(ReplayError::MissingSource)));
    }

    #[test]
    fn speed_is_normalized() {
        for bad in [0.0, -2.5, f64::NAN] {
            let o = ReplayOptions::new("x.log").speed(bad).validated().unwrap();
            assert_eq!(o.speed, 1.0);
        }
        let o = ReplayOptions::new("x.log").speed(4.0).validated().unwrap();
        assert_eq!(o.speed, 4.0);
    }

    #[test]
    fn empty_filter_means_none() {
        let o = ReplayOptions::new("x.log").filter("").validated().unwrap();
        assert_eq!(o.filter, None);
    }

    #[test]
    fn offset_rounds_to_nanoseconds() {
        assert_eq!(ReplayOptions::new("x").start_offset_s(1.5).start_offset_ns(), 1_500_000_000);
        assert_eq!(ReplayOptions::new("x").start_offset_s(2.4e-9).start_offset_ns(), 2);
        assert_eq!(ReplayOptions::new("x").start_offset_s(-1.0).start_offset_ns(), -1_000_000_000);
    }

    #[test]
    fn pass_limit_follows_loop_flag() {
        assert_eq!(ReplayOptions::new("x").max_passes(5).pass_limit(), Some(1));
        assert_eq!(ReplayOptions::new("x").looping(true).pass_limit(), None);
        assert_eq!(ReplayOptions::new("x").looping(true).max_passes(3).pass_limit(), Some(3));
    }
}
