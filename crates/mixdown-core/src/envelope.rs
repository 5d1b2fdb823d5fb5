//! Piecewise envelopes for gain curves and speed warps.
//!
//! An envelope is a sorted list of control points. Between points the
//! value is either held or linearly interpolated; outside the points it
//! is held at the nearest point's value. Values are clamped into the
//! envelope's `[range_lower, range_upper]` bounds, which the warp
//! calculator relies on to size resamplers.

use serde::{Deserialize, Serialize};
use std::fmt;

// ── Interpolation ───────────────────────────────────────────────

/// How to get from one control point to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolation {
    /// Hold the value until the next point.
    Hold,
    /// Straight line to the next point.
    #[default]
    Linear,
}

// ── Control point ───────────────────────────────────────────────

/// A single envelope point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    /// Time in seconds (track time).
    pub time: f64,
    /// Value at this point.
    pub value: f64,
    /// Interpolation used when moving TO the next point.
    pub interpolation: Interpolation,
}

impl ControlPoint {
    pub fn new(time: f64, value: f64) -> Self {
        Self {
            time,
            value,
            interpolation: Interpolation::Linear,
        }
    }
}

// ── Envelope ────────────────────────────────────────────────────

/// A bounded piecewise envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sorted control points.
    points: Vec<ControlPoint>,
    /// Value when there are no points.
    default_value: f64,
    range_lower: f64,
    range_upper: f64,
}

impl Envelope {
    /// Create an empty envelope with the given default value and bounds.
    ///
    /// Bounds given out of order are swapped.
    pub fn new(default_value: f64, range_lower: f64, range_upper: f64) -> Self {
        let (range_lower, range_upper) = if range_lower <= range_upper {
            (range_lower, range_upper)
        } else {
            (range_upper, range_lower)
        };
        Self {
            points: Vec::new(),
            default_value: default_value.clamp(range_lower, range_upper),
            range_lower,
            range_upper,
        }
    }

    /// An envelope fixed at `value`.
    pub fn constant(value: f64) -> Self {
        Self::new(value, value, value)
    }

    /// Insert or update a point. Keeps points sorted by time.
    pub fn set(&mut self, time: f64, value: f64, interpolation: Interpolation) {
        let value = value.clamp(self.range_lower, self.range_upper);
        if let Some(point) = self.points.iter_mut().find(|p| p.time == time) {
            point.value = value;
            point.interpolation = interpolation;
            return;
        }
        let pos = self.points.partition_point(|p| p.time < time);
        self.points.insert(
            pos,
            ControlPoint {
                time,
                value,
                interpolation,
            },
        );
    }

    /// Builder-style `set` with linear interpolation.
    pub fn with_point(mut self, time: f64, value: f64) -> Self {
        self.set(time, value, Interpolation::Linear);
        self
    }

    /// Remove the point at `time`.
    pub fn remove(&mut self, time: f64) -> bool {
        if let Some(pos) = self.points.iter().position(|p| p.time == time) {
            self.points.remove(pos);
            true
        } else {
            false
        }
    }

    /// Lowest value the envelope can take.
    pub fn range_lower(&self) -> f64 {
        self.range_lower
    }

    /// Highest value the envelope can take.
    pub fn range_upper(&self) -> f64 {
        self.range_upper
    }

    pub fn points(&self) -> &[ControlPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Index of the point starting the segment containing `time`, or
    /// `None` when `time` lies before the first point or at/after the last.
    fn segment(&self, time: f64) -> Option<usize> {
        let first = self.points.first()?;
        let last = self.points.last()?;
        if time < first.time || time >= last.time {
            return None;
        }
        Some(self.points.partition_point(|p| p.time <= time) - 1)
    }

    /// Evaluate the envelope at `time`.
    pub fn value_at(&self, time: f64) -> f64 {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return self.default_value;
        };
        if time <= first.time {
            return first.value;
        }
        if time >= last.time {
            return last.value;
        }
        match self.segment(time) {
            Some(idx) => Self::interpolate(&self.points[idx], &self.points[idx + 1], time),
            None => last.value,
        }
    }

    fn interpolate(a: &ControlPoint, b: &ControlPoint, time: f64) -> f64 {
        let span = b.time - a.time;
        if span <= 0.0 {
            return a.value;
        }
        match a.interpolation {
            Interpolation::Hold => a.value,
            Interpolation::Linear => {
                let t = ((time - a.time) / span).clamp(0.0, 1.0);
                a.value + (b.value - a.value) * t
            }
        }
    }

    /// Fill `buffer` with values sampled every `tstep` seconds from `t0`.
    pub fn values(&self, buffer: &mut [f32], t0: f64, tstep: f64) {
        if self.points.is_empty() {
            buffer.fill(self.default_value as f32);
            return;
        }
        for (i, v) in buffer.iter_mut().enumerate() {
            *v = self.value_at(t0 + i as f64 * tstep) as f32;
        }
    }

    /// Mean of `1 / value` over `[t0, t1]`.
    ///
    /// For a speed envelope this is how much longer (or shorter) the
    /// interval becomes once warped. The order of `t0` and `t1` does not
    /// matter; an empty interval yields the inverse of the point value.
    pub fn average_of_inverse(&self, t0: f64, t1: f64) -> f64 {
        let (a, b) = if t0 <= t1 { (t0, t1) } else { (t1, t0) };
        if b - a <= f64::EPSILON * a.abs().max(1.0) {
            return 1.0 / positive(self.value_at(a));
        }

        let mut integral = 0.0;
        let mut start = a;
        let inner = self
            .points
            .iter()
            .map(|p| p.time)
            .filter(|&t| t > a && t < b);
        for stop in inner.chain(std::iter::once(b)) {
            integral += self.inverse_integral(start, stop);
            start = stop;
        }
        integral / (b - a)
    }

    /// Integral of `1 / value` over `[a, b]`, with no point strictly inside.
    fn inverse_integral(&self, a: f64, b: f64) -> f64 {
        let width = b - a;
        if width <= 0.0 {
            return 0.0;
        }
        let linear = self
            .segment(a)
            .is_some_and(|idx| self.points[idx].interpolation == Interpolation::Linear);
        let va = positive(self.value_at(a));
        if !linear {
            return width / va;
        }
        let vb = positive(self.value_at(b));
        let delta = vb - va;
        if delta.abs() < 1e-12 * va {
            width * 2.0 / (va + vb)
        } else {
            width * (vb / va).ln() / delta
        }
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::constant(1.0)
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Envelope({} points, range {}..={})",
            self.points.len(),
            self.range_lower,
            self.range_upper
        )
    }
}

/// Keep speeds away from zero so inverses stay finite.
#[inline]
fn positive(value: f64) -> f64 {
    value.max(1e-9)
}

// ── Tests ───────────────────────────────────────────────────────
