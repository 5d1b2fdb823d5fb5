//! Speed warps and the resample factor bounds derived from them.

use mixdown_core::Envelope;
use serde::{Deserialize, Serialize};

/// How output time maps onto track time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Warp {
    /// No warp: unit speed, one fixed resample factor per track.
    Fixed,
    /// Speed may change at any time within `[min_speed, max_speed]`,
    /// e.g. while scrubbing.
    Range {
        min_speed: f64,
        max_speed: f64,
        initial_speed: f64,
    },
    /// Instantaneous speed given by an envelope over track time.
    Envelope(Envelope),
}

impl Warp {
    /// A speed range; bounds are reordered and clamped to be non-negative.
    pub fn range(min_speed: f64, max_speed: f64, initial_speed: f64) -> Self {
        debug_assert!(min_speed >= 0.0 && max_speed >= 0.0);
        Warp::Range {
            min_speed: min_speed.min(max_speed).max(0.0),
            max_speed: min_speed.max(max_speed).max(0.0),
            initial_speed,
        }
    }

    /// Speed the mixer starts at.
    pub fn initial_speed(&self) -> f64 {
        match self {
            Warp::Fixed => 1.0,
            Warp::Range { initial_speed, .. } => *initial_speed,
            Warp::Envelope(_) => 1.0,
        }
    }

    /// Mean playback-rate factor over track time `[t0, t1]`.
    ///
    /// This is the average of `1 / speed`; `1.0` unless envelope-driven.
    pub fn average_factor(&self, t0: f64, t1: f64) -> f64 {
        match self {
            Warp::Envelope(env) => env.average_of_inverse(t0, t1),
            _ => 1.0,
        }
    }
}

impl Default for Warp {
    fn default() -> Self {
        Warp::Fixed
    }
}

/// Per-track bounds on the resample factor (output rate over effective
/// input rate).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResampleParameters {
    /// Whether any track needs time-varying resampling.
    pub variable_rates: bool,
    pub min_factor: Vec<f64>,
    pub max_factor: Vec<f64>,
}

impl ResampleParameters {
    /// Compute bounds for tracks with the given native rates.
    pub fn new(track_rates: &[f64], rate: f64, warp: &Warp) -> Self {
        let variable_rates = match warp {
            Warp::Envelope(_) => true,
            Warp::Range {
                min_speed,
                max_speed,
                ..
            } => *min_speed > 0.0 && *max_speed > 0.0,
            Warp::Fixed => false,
        };
        let variable_rates = variable_rates && !track_rates.is_empty();

        let mut min_factor = Vec::with_capacity(track_rates.len());
        let mut max_factor = Vec::with_capacity(track_rates.len());
        for &track_rate in track_rates {
            let factor = rate / track_rate;
            let (lo, hi) = match warp {
                Warp::Envelope(env) => (factor / env.range_upper(), factor / env.range_lower()),
                Warp::Range {
                    min_speed,
                    max_speed,
                    ..
                } if variable_rates => (factor / max_speed, factor / min_speed),
                _ => (factor, factor),
            };
            min_factor.push(lo);
            max_factor.push(hi);
        }

        Self {
            variable_rates,
            min_factor,
            max_factor,
        }
    }
}
