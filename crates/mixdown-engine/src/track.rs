//! Input tracks as seen by the mixer.
//!
//! The mixer only talks to [`SampleSource`]. Two implementations ship
//! with the engine: [`MemoryTrack`] (clips of decoded samples) and
//! [`ToneTrack`] (a generated sine, handy for renders and benchmarks).

use mixdown_core::{time_to_samples, Envelope, Result};
use serde::{Deserialize, Serialize};

/// Which speaker a single track channel is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelType {
    /// Goes to every output channel
    #[default]
    Mono,
    Left,
    Right,
}

/// Gain and pan of a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelStrip {
    /// Linear gain.
    pub gain: f32,
    /// Pan (-1.0 = full left, 0.0 = center, 1.0 = full right).
    pub pan: f32,
}

impl Default for ChannelStrip {
    fn default() -> Self {
        Self {
            gain: 1.0,
            pan: 0.0,
        }
    }
}

impl ChannelStrip {
    /// Gain for output channel `channel`; even channels are left.
    ///
    /// Linear pan law: the center position leaves both sides at unity.
    pub fn channel_gain(&self, channel: usize) -> f32 {
        let pan = self.pan.clamp(-1.0, 1.0);
        let (left, right) = if pan < 0.0 {
            (1.0, 1.0 + pan)
        } else {
            (1.0 - pan, 1.0)
        };
        if channel % 2 == 0 {
            left * self.gain
        } else {
            right * self.gain
        }
    }
}

/// Capability interface of a mixer input.
///
/// One source is one channel. A stereo pair is two consecutive sources
/// whose first reports `channel_group_size() == 2`.
pub trait SampleSource {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Native sample rate in Hz.
    fn rate(&self) -> f64;

    /// Time of the first sample with content.
    fn start_time(&self) -> f64;

    /// Time just past the last sample with content.
    fn end_time(&self) -> f64;

    /// Nearest sample index for `time`.
    fn time_to_samples(&self, time: f64) -> i64 {
        time_to_samples(time, self.rate())
    }

    /// Fill `buffer` with the samples starting at index `start`.
    ///
    /// Positions without content read as silence. An `Err` means the data
    /// exists but could not be produced (e.g. a missing block).
    fn get_floats(&self, start: i64, buffer: &mut [f32]) -> Result<()>;

    /// Fill `buffer` with per-sample envelope gains starting at time `t0`.
    fn envelope_values(&self, buffer: &mut [f32], t0: f64) {
        let _ = t0;
        buffer.fill(1.0);
    }

    /// Gain applied when this source feeds output channel `channel`.
    fn channel_gain(&self, channel: usize) -> f32 {
        let _ = channel;
        1.0
    }

    fn channel(&self) -> ChannelType {
        ChannelType::Mono
    }

    /// Number of consecutive sources, starting with this one, that form
    /// one multi-channel track.
    fn channel_group_size(&self) -> usize {
        1
    }
}

// ── Memory track ────────────────────────────────────────────────

/// A run of decoded samples placed at a sample offset.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    /// Index of the first sample on the track.
    pub offset: i64,
    pub samples: Vec<f32>,
}

impl Clip {
    pub fn new(offset: i64, samples: Vec<f32>) -> Self {
        Self { offset, samples }
    }

    /// One past the last sample index.
    pub fn end(&self) -> i64 {
        self.offset + self.samples.len() as i64
    }
}

/// An in-memory track made of clips; gaps between clips are silent.
#[derive(Debug, Clone)]
pub struct MemoryTrack {
    name: String,
    rate: f64,
    clips: Vec<Clip>,
    envelope: Option<Envelope>,
    strip: ChannelStrip,
    channel: ChannelType,
    group_size: usize,
}

impl MemoryTrack {
    /// Create a mono track with one clip starting at sample 0.
    pub fn new(name: impl Into<String>, rate: f64, samples: Vec<f32>) -> Self {
        Self::empty(name, rate).with_clip(0, samples)
    }

    /// Create a mono track without clips.
    pub fn empty(name: impl Into<String>, rate: f64) -> Self {
        Self {
            name: name.into(),
            rate,
            clips: Vec::new(),
            envelope: None,
            strip: ChannelStrip::default(),
            channel: ChannelType::Mono,
            group_size: 1,
        }
    }

    /// Create the two channels of a stereo track.
    pub fn stereo(
        name: impl Into<String>,
        rate: f64,
        left: Vec<f32>,
        right: Vec<f32>,
    ) -> (Self, Self) {
        let name = name.into();
        let mut l = Self::new(format!("{name} L"), rate, left).with_channel(ChannelType::Left);
        l.group_size = 2;
        let r = Self::new(format!("{name} R"), rate, right).with_channel(ChannelType::Right);
        (l, r)
    }

    /// Add a clip starting at sample `offset`.
    pub fn with_clip(mut self, offset: i64, samples: Vec<f32>) -> Self {
        let pos = self.clips.partition_point(|c| c.offset <= offset);
        self.clips.insert(pos, Clip::new(offset, samples));
        self
    }

    /// Attach a gain envelope (track time).
    pub fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = Some(envelope);
        self
    }

    pub fn with_strip(mut self, strip: ChannelStrip) -> Self {
        self.strip = strip;
        self
    }

    pub fn with_channel(mut self, channel: ChannelType) -> Self {
        self.channel = channel;
        self
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn strip(&self) -> &ChannelStrip {
        &self.strip
    }
}

impl SampleSource for MemoryTrack {
    fn name(&self) -> &str {
        &self.name
    }

    fn rate(&self) -> f64 {
        self.rate
    }

    fn start_time(&self) -> f64 {
        self.clips
            .iter()
            .map(|c| c.offset)
            .min()
            .map_or(0.0, |s| s as f64 / self.rate)
    }

    fn end_time(&self) -> f64 {
        self.clips
            .iter()
            .map(Clip::end)
            .max()
            .map_or(0.0, |e| e as f64 / self.rate)
    }

    fn get_floats(&self, start: i64, buffer: &mut [f32]) -> Result<()> {
        buffer.fill(0.0);
        let end = start + buffer.len() as i64;
        for clip in &self.clips {
            let from = start.max(clip.offset);
            let to = end.min(clip.end());
            if from >= to {
                continue;
            }
            let src = (from - clip.offset) as usize..(to - clip.offset) as usize;
            let dst = (from - start) as usize..(to - start) as usize;
            buffer[dst].copy_from_slice(&clip.samples[src]);
        }
        Ok(())
    }

    fn envelope_values(&self, buffer: &mut [f32], t0: f64) {
        match &self.envelope {
            Some(env) => env.values(buffer, t0, 1.0 / self.rate),
            None => buffer.fill(1.0),
        }
    }

    fn channel_gain(&self, channel: usize) -> f32 {
        self.strip.channel_gain(channel)
    }

    fn channel(&self) -> ChannelType {
        self.channel
    }

    fn channel_group_size(&self) -> usize {
        self.group_size
    }
}

// ── Tone track ──────────────────────────────────────────────────

/// A generated sine tone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneTrack {
    pub name: String,
    pub rate: f64,
    /// Frequency in Hz.
    pub frequency: f64,
    /// Peak amplitude.
    pub amplitude: f32,
    /// Time of the first sample in seconds.
    pub start: f64,
    /// Length in seconds.
    pub duration: f64,
    pub strip: ChannelStrip,
    pub channel: ChannelType,
}

impl Default for ToneTrack {
    fn default() -> Self {
        Self {
            name: "tone".to_string(),
            rate: 44100.0,
            frequency: 440.0,
            amplitude: 0.5,
            start: 0.0,
            duration: 1.0,
            strip: ChannelStrip::default(),
            channel: ChannelType::Mono,
        }
    }
}

impl ToneTrack {
    pub fn new(rate: f64, frequency: f64, duration: f64) -> Self {
        Self {
            rate,
            frequency,
            duration,
            ..Default::default()
        }
    }

    fn first_sample(&self) -> i64 {
        time_to_samples(self.start, self.rate)
    }

    fn last_sample(&self) -> i64 {
        time_to_samples(self.start + self.duration, self.rate)
    }
}

impl SampleSource for ToneTrack {
    fn name(&self) -> &str {
        &self.name
    }

    fn rate(&self) -> f64 {
        self.rate
    }

    fn start_time(&self) -> f64 {
        self.first_sample() as f64 / self.rate
    }

    fn end_time(&self) -> f64 {
        self.last_sample() as f64 / self.rate
    }

    fn get_floats(&self, start: i64, buffer: &mut [f32]) -> Result<()> {
        let (first, last) = (self.first_sample(), self.last_sample());
        let omega = std::f64::consts::TAU * self.frequency / self.rate;
        for (i, s) in buffer.iter_mut().enumerate() {
            let n = start + i as i64;
            *s = if n >= first && n < last {
                ((n - first) as f64 * omega).sin() as f32 * self.amplitude
            } else {
                0.0
            };
        }
        Ok(())
    }

    fn channel_gain(&self, channel: usize) -> f32 {
        self.strip.channel_gain(channel)
    }

    fn channel(&self) -> ChannelType {
        self.channel
    }
}
