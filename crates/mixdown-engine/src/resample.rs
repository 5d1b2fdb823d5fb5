//! Streaming variable-ratio resampler.
//!
//! One instance serves one track for the lifetime of a mixing pass. Each
//! call may use a different factor (output rate over input rate) within
//! the bounds given at construction. Input the resampler still needs for
//! its filter is kept internally, so every call reports how much input it
//! took and how much output it wrote.
//!
//! Draft quality interpolates linearly between neighbours. High quality
//! runs a windowed-sinc [`rubato::SincFixedIn`] in fixed chunks of
//! [`PROCESS_LEN`] input frames; its filter delay is trimmed so output
//! stays aligned with the input, and the final flush stops at the frame
//! count the factors used so far call for.

use mixdown_core::limits::PROCESS_LEN;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::{error, warn};

/// Drop consumed history once this many samples are behind the read point.
const TRIM_THRESHOLD: usize = 4096;

/// Headroom on the ratio bounds; the sinc resampler rejects ratios on them.
const RATIO_MARGIN: f64 = 1.001;

/// Stateful resampler for a single channel.
pub struct Resample {
    min_factor: f64,
    max_factor: f64,
    kernel: Kernel,
    last_factor: Option<f64>,
}

enum Kernel {
    Linear(Linear),
    Sinc(Box<SincStream>),
}

impl Resample {
    /// Create a resampler for factors within `[min_factor, max_factor]`.
    ///
    /// Falls back to draft quality if no sinc resampler can be built for
    /// the bounds.
    pub fn new(high_quality: bool, min_factor: f64, max_factor: f64) -> Self {
        let (min_factor, max_factor) = if min_factor <= max_factor {
            (min_factor, max_factor)
        } else {
            (max_factor, min_factor)
        };
        let kernel = if high_quality {
            match SincStream::new(min_factor, max_factor) {
                Ok(sinc) => Kernel::Sinc(Box::new(sinc)),
                Err(e) => {
                    warn!(
                        min_factor,
                        max_factor,
                        "Sinc resampler unavailable, using linear: {}",
                        e
                    );
                    Kernel::Linear(Linear::new())
                }
            }
        } else {
            Kernel::Linear(Linear::new())
        };
        Self {
            min_factor,
            max_factor,
            kernel,
            last_factor: None,
        }
    }

    pub fn is_high_quality(&self) -> bool {
        matches!(self.kernel, Kernel::Sinc(_))
    }

    pub fn min_factor(&self) -> f64 {
        self.min_factor
    }

    pub fn max_factor(&self) -> f64 {
        self.max_factor
    }

    /// Factor used by the most recent [`process`](Self::process) call.
    pub fn last_factor(&self) -> Option<f64> {
        self.last_factor
    }

    /// Resample `input` into `output` at `factor`.
    ///
    /// Returns `(consumed, produced)`. With `last` set the input is taken
    /// to end after this call, and buffered samples are flushed as far as
    /// `output` allows. A non-positive or infinite factor clamps to the
    /// nearest bound.
    pub fn process(
        &mut self,
        factor: f64,
        input: &[f32],
        last: bool,
        output: &mut [f32],
    ) -> (usize, usize) {
        let factor = if factor > 0.0 {
            factor.clamp(self.min_factor, self.max_factor)
        } else {
            self.min_factor
        };
        self.last_factor = Some(factor);
        match &mut self.kernel {
            Kernel::Linear(linear) => linear.process(factor, input, last, output),
            Kernel::Sinc(sinc) => sinc.process(factor, input, last, output),
        }
    }
}

/// Two-point interpolation over a sliding history.
struct Linear {
    /// One leading zero followed by the input not yet discarded.
    history: Vec<f32>,
    /// Fractional index into `history` of the next output sample.
    position: f64,
}

impl Linear {
    fn new() -> Self {
        Self {
            history: vec![0.0],
            position: 1.0,
        }
    }

    fn process(
        &mut self,
        factor: f64,
        input: &[f32],
        last: bool,
        output: &mut [f32],
    ) -> (usize, usize) {
        let step = 1.0 / factor;
        let mut consumed = 0;
        let mut produced = 0;
        while produced < output.len() {
            let needed = self.position.floor() as usize + 2;
            if self.history.len() < needed {
                let take = (needed - self.history.len()).min(input.len() - consumed);
                self.history.extend_from_slice(&input[consumed..consumed + take]);
                consumed += take;
            }
            if self.history.len() < needed
                && (!last || self.position >= self.history.len() as f64)
            {
                break;
            }
            output[produced] = self.interpolate();
            produced += 1;
            self.position += step;
        }

        self.trim();
        (consumed, produced)
    }

    fn sample(&self, index: usize) -> f64 {
        self.history.get(index).copied().unwrap_or(0.0) as f64
    }

    fn interpolate(&self) -> f32 {
        let base = self.position.floor();
        let frac = self.position - base;
        let base = base as usize;
        let x0 = self.sample(base);
        let x1 = self.sample(base + 1);
        (x0 + (x1 - x0) * frac) as f32
    }

    /// Discard history no future output can reach.
    fn trim(&mut self) {
        let drop = (self.position.floor() as usize).min(self.history.len());
        if drop >= TRIM_THRESHOLD {
            self.history.drain(..drop);
            self.position -= drop as f64;
        }
    }
}

fn sinc_parameters() -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    }
}

/// Chunked sinc resampling behind the streaming contract.
///
/// Input offered is taken whole unless `ready` already fills the caller's
/// output. Full chunks run as soon as they fill, at the input-weighted
/// mean of the factors their frames arrived with; output beyond what the
/// caller has room for waits in `ready`.
struct SincStream {
    min_factor: f64,
    relative: f64,
    resampler: SincFixedIn<f32>,
    /// Input of the chunk being filled.
    pending: Vec<f32>,
    /// Sum of `factor` over the frames in `pending`.
    pending_weight: f64,
    /// Resampler output for one chunk.
    scratch: Vec<f32>,
    /// Output not yet handed to the caller.
    ready: Vec<f32>,
    /// Filter delay still to discard; set when the first chunk runs.
    delay: Option<usize>,
    /// Frames appended to `ready` so far.
    emitted: usize,
    /// Frames owed for all input taken so far.
    expected: f64,
    finished: bool,
}

impl SincStream {
    fn new(min_factor: f64, max_factor: f64) -> Result<Self, rubato::ResamplerConstructionError> {
        let relative = (max_factor / min_factor).max(1.0) * RATIO_MARGIN;
        let resampler =
            SincFixedIn::<f32>::new(min_factor, relative, sinc_parameters(), PROCESS_LEN, 1)?;
        let out_max = resampler.output_frames_max();
        Ok(Self {
            min_factor,
            relative,
            resampler,
            pending: Vec::with_capacity(PROCESS_LEN),
            pending_weight: 0.0,
            scratch: vec![0.0; out_max],
            ready: Vec::with_capacity(2 * out_max),
            delay: None,
            emitted: 0,
            expected: 0.0,
            finished: false,
        })
    }

    /// Start over after a flush when new input arrives.
    fn restart(&mut self) {
        match SincFixedIn::<f32>::new(
            self.min_factor,
            self.relative,
            sinc_parameters(),
            PROCESS_LEN,
            1,
        ) {
            Ok(resampler) => self.resampler = resampler,
            Err(e) => error!("Failed to rebuild sinc resampler: {}", e),
        }
        self.pending.clear();
        self.pending_weight = 0.0;
        self.ready.clear();
        self.delay = None;
        self.emitted = 0;
        self.expected = 0.0;
        self.finished = false;
    }

    fn process(
        &mut self,
        factor: f64,
        input: &[f32],
        last: bool,
        output: &mut [f32],
    ) -> (usize, usize) {
        if self.finished && !input.is_empty() {
            self.restart();
        }

        // Input is taken whole or not at all.
        let mut consumed = 0;
        let wanted = if self.ready.len() < output.len() {
            input.len()
        } else {
            0
        };
        while consumed < wanted {
            let need = self.resampler.input_frames_next();
            let take = need.saturating_sub(self.pending.len()).min(input.len() - consumed);
            self.pending.extend_from_slice(&input[consumed..consumed + take]);
            self.pending_weight += take as f64 * factor;
            self.expected += take as f64 * factor;
            consumed += take;
            if self.pending.len() >= need {
                self.run_chunk(false);
            }
        }

        if last && !self.finished && consumed == input.len() {
            if !self.pending.is_empty() {
                self.run_chunk(true);
            }
            self.finished = true;
            self.flush();
        }

        let produced = output.len().min(self.ready.len());
        output[..produced].copy_from_slice(&self.ready[..produced]);
        self.ready.drain(..produced);
        (consumed, produced)
    }

    /// Feed silence until the output reaches the owed frame count, then
    /// cut anything past it.
    fn flush(&mut self) {
        let target = self.expected.round() as usize;
        while self.emitted < target {
            let result = self.resampler.process_partial_into_buffer(
                None::<&[&[f32]]>,
                &mut [&mut self.scratch[..]],
                None,
            );
            match result {
                Ok((_, 0)) => break,
                Ok((_, n)) => self.accept(n),
                Err(e) => {
                    error!("Sinc flush failed: {}", e);
                    break;
                }
            }
        }
        if self.emitted > target {
            let excess = (self.emitted - target).min(self.ready.len());
            self.ready.truncate(self.ready.len() - excess);
            self.emitted -= excess;
        }
    }

    /// Resample the pending chunk; `partial` pads a short final chunk.
    fn run_chunk(&mut self, partial: bool) {
        let ratio = self.pending_weight / self.pending.len() as f64;
        if let Err(e) = self.resampler.set_resample_ratio(ratio, false) {
            warn!(ratio, "Resample ratio rejected: {}", e);
        }
        if self.delay.is_none() {
            self.delay = Some(self.resampler.output_delay());
        }

        let result = if partial {
            self.resampler.process_partial_into_buffer(
                Some(&[&self.pending[..]]),
                &mut [&mut self.scratch[..]],
                None,
            )
        } else {
            self.resampler.process_into_buffer(
                &[&self.pending[..]],
                &mut [&mut self.scratch[..]],
                None,
            )
        };
        match result {
            Ok((_, n)) => self.accept(n),
            Err(e) => error!(frames = self.pending.len(), "Sinc resampling failed: {}", e),
        }
        self.pending.clear();
        self.pending_weight = 0.0;
    }

    /// Queue `n` frames from `scratch`, discarding filter delay first.
    fn accept(&mut self, n: usize) {
        let delay = self.delay.unwrap_or(0);
        let skip = delay.min(n);
        self.delay = Some(delay - skip);
        self.ready.extend_from_slice(&self.scratch[skip..n]);
        self.emitted += n - skip;
    }
}
