//! Output sample formats, buffers and dithering.
//!
//! The mixer accumulates in `f32` and converts each finished block into
//! one of the formats below. Integer formats are dithered according to a
//! [`DitherType`]; float output is copied unchanged.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sample format of the mixer's output buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SampleFormat {
    /// 16-bit signed integer
    Int16,
    /// 24-bit signed integer stored in the low bits of an `i32`
    Int24,
    /// 32-bit float, nominal range [-1, 1]
    #[default]
    Float32,
}

impl SampleFormat {
    /// Bytes one sample occupies in memory.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::Int16 => 2,
            SampleFormat::Int24 | SampleFormat::Float32 => 4,
        }
    }

    /// Bits of resolution; `None` for float.
    pub fn bits(self) -> Option<u32> {
        match self {
            SampleFormat::Int16 => Some(16),
            SampleFormat::Int24 => Some(24),
            SampleFormat::Float32 => None,
        }
    }

    /// Full-scale value for integer formats.
    fn full_scale(self) -> f32 {
        match self.bits() {
            Some(bits) => (1u32 << (bits - 1)) as f32,
            None => 1.0,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleFormat::Int16 => write!(f, "int16"),
            SampleFormat::Int24 => write!(f, "int24"),
            SampleFormat::Float32 => write!(f, "float32"),
        }
    }
}

// ── Buffers ─────────────────────────────────────────────────────

/// A block of samples in a concrete format.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBuffer {
    Int16(Vec<i16>),
    Int24(Vec<i32>),
    Float32(Vec<f32>),
}

impl SampleBuffer {
    /// Allocate a zeroed buffer of `len` samples.
    pub fn new(format: SampleFormat, len: usize) -> Self {
        match format {
            SampleFormat::Int16 => SampleBuffer::Int16(vec![0; len]),
            SampleFormat::Int24 => SampleBuffer::Int24(vec![0; len]),
            SampleFormat::Float32 => SampleBuffer::Float32(vec![0.0; len]),
        }
    }

    pub fn format(&self) -> SampleFormat {
        match self {
            SampleBuffer::Int16(_) => SampleFormat::Int16,
            SampleBuffer::Int24(_) => SampleFormat::Int24,
            SampleBuffer::Float32(_) => SampleFormat::Float32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SampleBuffer::Int16(v) => v.len(),
            SampleBuffer::Int24(v) => v.len(),
            SampleBuffer::Float32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw native-endian bytes, e.g. for writing PCM.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            SampleBuffer::Int16(v) => bytemuck::cast_slice(v),
            SampleBuffer::Int24(v) => bytemuck::cast_slice(v),
            SampleBuffer::Float32(v) => bytemuck::cast_slice(v),
        }
    }

    /// Sample `index` scaled back to the nominal [-1, 1] float range.
    pub fn sample_f32(&self, index: usize) -> Option<f32> {
        match self {
            SampleBuffer::Int16(v) => v
                .get(index)
                .map(|&s| s as f32 / SampleFormat::Int16.full_scale()),
            SampleBuffer::Int24(v) => v
                .get(index)
                .map(|&s| s as f32 / SampleFormat::Int24.full_scale()),
            SampleBuffer::Float32(v) => v.get(index).copied(),
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            SampleBuffer::Float32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> Option<&[i16]> {
        match self {
            SampleBuffer::Int16(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i24(&self) -> Option<&[i32]> {
        match self {
            SampleBuffer::Int24(v) => Some(v),
            _ => None,
        }
    }
}

// ── Dithering ───────────────────────────────────────────────────

/// Dither applied when reducing float samples to integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DitherType {
    /// Plain rounding
    #[default]
    None,
    /// Rectangular PDF noise of one LSB
    Rectangle,
    /// Triangular PDF noise (sum of two uniforms)
    Triangle,
    /// Triangular noise with first-order error feedback
    Shaped,
}

impl DitherType {
    /// Dither used for a given quality setting.
    pub fn for_quality(high_quality: bool) -> Self {
        if high_quality {
            DitherType::Shaped
        } else {
            DitherType::None
        }
    }
}

/// Stateful float-to-format converter.
///
/// Shaped dither keeps one error term per output channel, so the same
/// `Ditherer` must be used for every block of a stream.
pub struct Ditherer {
    kind: DitherType,
    rng: StdRng,
    errors: Vec<f32>,
}

impl Ditherer {
    /// Create a ditherer for `channels` output channels.
    pub fn new(kind: DitherType, channels: usize) -> Self {
        Self::with_seed(kind, channels, 0x6d69_7864)
    }

    /// Create a ditherer with a fixed noise seed.
    pub fn with_seed(kind: DitherType, channels: usize, seed: u64) -> Self {
        Self {
            kind,
            rng: StdRng::seed_from_u64(seed),
            errors: vec![0.0; channels.max(1)],
        }
    }

    pub fn kind(&self) -> DitherType {
        self.kind
    }

    /// Forget accumulated shaping error.
    pub fn reset(&mut self) {
        self.errors.fill(0.0);
    }

    /// Convert `src` into `dst`, writing sample `i` at `offset + i * stride`.
    ///
    /// `channel` selects the shaping state. Samples that would land past
    /// the end of `dst` are dropped.
    pub fn copy_samples(
        &mut self,
        src: &[f32],
        dst: &mut SampleBuffer,
        offset: usize,
        stride: usize,
        channel: usize,
    ) {
        let stride = stride.max(1);
        match dst {
            SampleBuffer::Float32(out) => {
                for (i, &s) in src.iter().enumerate() {
                    if let Some(slot) = out.get_mut(offset + i * stride) {
                        *slot = s;
                    }
                }
            }
            SampleBuffer::Int16(out) => {
                for (i, &s) in src.iter().enumerate() {
                    let q = self.quantize(s, SampleFormat::Int16, channel);
                    if let Some(slot) = out.get_mut(offset + i * stride) {
                        *slot = q as i16;
                    }
                }
            }
            SampleBuffer::Int24(out) => {
                for (i, &s) in src.iter().enumerate() {
                    let q = self.quantize(s, SampleFormat::Int24, channel);
                    if let Some(slot) = out.get_mut(offset + i * stride) {
                        *slot = q;
                    }
                }
            }
        }
    }

    /// Scale, dither, round and clip one sample to an integer format.
    fn quantize(&mut self, sample: f32, format: SampleFormat, channel: usize) -> i32 {
        let scale = format.full_scale();
        let max = scale - 1.0;
        let min = -scale;
        let x = sample * scale;

        let y = match self.kind {
            DitherType::None => x.round(),
            DitherType::Rectangle => (x + self.rng.gen_range(-0.5f32..0.5)).round(),
            DitherType::Triangle => (x + self.tpdf()).round(),
            DitherType::Shaped => {
                let idx = channel.min(self.errors.len() - 1);
                let input = x - self.errors[idx] * 0.5;
                let y = (input + self.tpdf()).round();
                self.errors[idx] = y - input;
                y
            }
        };
        y.clamp(min, max) as i32
    }

    fn tpdf(&mut self) -> f32 {
        let r1: f32 = self.rng.gen();
        let r2: f32 = self.rng.gen();
        r1 + r2 - 1.0
    }
}

impl fmt::Debug for Ditherer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ditherer")
            .field("kind", &self.kind)
            .field("channels", &self.errors.len())
            .finish()
    }
}
