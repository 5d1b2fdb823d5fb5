//! Time representation for sample-accurate mixing
//!
//! Times are seconds as `f64`; sample positions are `i64` counts at a
//! track's native rate. Conversions round to the nearest sample so that
//! a time computed from a position maps back to the same position.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Convert a time in seconds to the nearest sample index at `rate`.
///
/// Saturates at the `i64` range for unbounded windows.
#[inline]
pub fn time_to_samples(time: f64, rate: f64) -> i64 {
    (time * rate + 0.5).floor() as i64
}

/// Convert a sample index at `rate` to seconds.
#[inline]
pub fn samples_to_time(samples: i64, rate: f64) -> f64 {
    samples as f64 / rate
}

/// Clip a buffer size to a (possibly negative or huge) sample count limit.
#[inline]
pub fn limit_sample_buffer_size(buffer_size: usize, limit: i64) -> usize {
    if limit <= 0 {
        0
    } else {
        usize::try_from(limit).map_or(buffer_size, |limit| buffer_size.min(limit))
    }
}

/// A play window from `t0` to `t1`.
///
/// `t1 < t0` denotes reverse playback: mixing starts at `t0` and runs
/// backwards until `t1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayRange {
    /// Time where playback starts
    pub t0: f64,
    /// Time where playback stops (exclusive)
    pub t1: f64,
}

impl PlayRange {
    /// Create a new play window.
    #[inline]
    pub const fn new(t0: f64, t1: f64) -> Self {
        Self { t0, t1 }
    }

    /// Forward window with no practical upper bound.
    pub const FORWARD_UNBOUNDED: Self = Self::new(0.0, f64::MAX);

    /// Reverse window with no practical upper bound.
    pub const BACKWARD_UNBOUNDED: Self = Self::new(f64::MAX, 0.0);

    /// Whether playback runs backwards.
    #[inline]
    pub fn is_backwards(self) -> bool {
        self.t1 < self.t0
    }

    /// `-1.0` for reverse playback, `1.0` otherwise.
    #[inline]
    pub fn direction(self) -> f64 {
        if self.is_backwards() {
            -1.0
        } else {
            1.0
        }
    }

    /// Earlier bound of the window.
    #[inline]
    pub fn lower(self) -> f64 {
        self.t0.min(self.t1)
    }

    /// Later bound of the window.
    #[inline]
    pub fn upper(self) -> f64 {
        self.t0.max(self.t1)
    }

    /// Clamp a time into the window.
    #[inline]
    pub fn clamp(self, time: f64) -> f64 {
        time.max(self.lower()).min(self.upper())
    }

    /// Where reading stops for a track spanning `[start, end)`.
    ///
    /// Forward playback stops at the earlier of track end and `t1`,
    /// reverse playback at the later of track start and `t1`.
    #[inline]
    pub fn active_end(self, start: f64, end: f64) -> f64 {
        if self.is_backwards() {
            start.max(self.t1)
        } else {
            end.min(self.t1)
        }
    }

    /// Whether `time` has reached `end` in the playback direction.
    #[inline]
    pub fn is_exhausted(self, time: f64, end: f64) -> bool {
        if self.is_backwards() {
            time <= end
        } else {
            time >= end
        }
    }
}

impl Default for PlayRange {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl fmt::Display for PlayRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s -> {:.3}s", self.t0, self.t1)
    }
}
