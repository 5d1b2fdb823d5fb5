//! Mixdown engine - multi-track mixing and resampling
//!
//! Pulls samples from any number of tracks, converts them to one output
//! rate (optionally warped in speed or direction), routes them to the
//! output channels and converts the sum to the requested sample format.
//!
//! Architecture:
//! - `SampleSource`: What the mixer needs from a track
//! - `SampleQueue`: Prefetched samples waiting for the resampler
//! - `Resample`: Streaming variable-ratio resampler, one per track
//! - `Downmix`: Optional custom track to channel routing
//! - `Mixer`: Top-level orchestrator

pub mod downmix;
pub mod mixer;
pub mod queue;
pub mod resample;
pub mod track;
pub mod warp;

pub use downmix::Downmix;
pub use mixer::{Mixer, MixerOptions};
pub use queue::SampleQueue;
pub use resample::Resample;
pub use track::{ChannelStrip, ChannelType, Clip, MemoryTrack, SampleSource, ToneTrack};
pub use warp::{ResampleParameters, Warp};
