//! Mixdown Core - Foundation types for the mixdown engine
//!
//! This crate provides the types shared by the engine and its hosts:
//! - Error type and result alias
//! - Time/sample conversions and play windows (PlayRange)
//! - Piecewise envelopes used for gain curves and speed warps
//! - Output sample formats, buffers and dithering

pub mod envelope;
pub mod error;
pub mod format;
pub mod time;

pub use envelope::{ControlPoint, Envelope, Interpolation};
pub use error::{MixError, Result};
pub use format::{DitherType, Ditherer, SampleBuffer, SampleFormat};
pub use time::{limit_sample_buffer_size, samples_to_time, time_to_samples, PlayRange};

/// Fixed sizes shared by the mixing pipeline.
pub mod limits {
    /// Capacity of each per-track sample queue.
    pub const QUEUE_MAX_LEN: usize = 65536;

    /// Largest chunk handed to a resampler in one call.
    pub const PROCESS_LEN: usize = 1024;

    /// Largest channel group mixed together (stereo).
    pub const MAX_GROUP_CHANNELS: usize = 2;
}
