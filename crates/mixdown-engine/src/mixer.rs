//! Mixer: pulls blocks from every input track, resamples and routes them
//! into the output channels, then converts to the output format.

use crate::downmix::Downmix;
use crate::queue::SampleQueue;
use crate::resample::Resample;
use crate::track::{ChannelType, SampleSource};
use crate::warp::{ResampleParameters, Warp};
use mixdown_core::limits::{MAX_GROUP_CHANNELS, PROCESS_LEN, QUEUE_MAX_LEN};
use mixdown_core::{
    limit_sample_buffer_size, DitherType, Ditherer, MixError, PlayRange, Result, SampleBuffer,
    SampleFormat,
};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, error, info, warn};

/// Construction-time mixer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerOptions {
    /// Propagate track read failures instead of mixing silence.
    pub may_throw: bool,
    pub warp: Warp,
    /// Window start in seconds.
    pub start_time: f64,
    /// Window end in seconds; earlier than `start_time` plays in reverse.
    pub stop_time: f64,
    pub num_channels: usize,
    /// Largest block, in frames, one `process` call may produce.
    pub buffer_size: usize,
    /// One interleaved output buffer instead of one per channel.
    pub interleaved: bool,
    /// Output sample rate in Hz.
    pub rate: f64,
    pub format: SampleFormat,
    /// Sinc resampling and shaped dither; linear and undithered otherwise.
    pub high_quality: bool,
    /// Custom routing; ignored unless it matches the track and channel count.
    pub downmix: Option<Downmix>,
    /// Apply each track's gain and pan.
    pub apply_track_gains: bool,
}

impl Default for MixerOptions {
    fn default() -> Self {
        Self {
            may_throw: false,
            warp: Warp::default(),
            start_time: 0.0,
            stop_time: f64::MAX,
            num_channels: 2,
            buffer_size: 4096,
            interleaved: true,
            rate: 44100.0,
            format: SampleFormat::Float32,
            high_quality: true,
            downmix: None,
            apply_track_gains: true,
        }
    }
}

impl MixerOptions {
    pub fn with_window(mut self, start_time: f64, stop_time: f64) -> Self {
        self.start_time = start_time;
        self.stop_time = stop_time;
        self
    }

    pub fn with_channels(mut self, num_channels: usize) -> Self {
        self.num_channels = num_channels;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_format(mut self, format: SampleFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_warp(mut self, warp: Warp) -> Self {
        self.warp = warp;
        self
    }

    pub fn with_downmix(mut self, downmix: Downmix) -> Self {
        self.downmix = Some(downmix);
        self
    }

    pub fn with_interleaved(mut self, interleaved: bool) -> Self {
        self.interleaved = interleaved;
        self
    }

    pub fn with_high_quality(mut self, high_quality: bool) -> Self {
        self.high_quality = high_quality;
        self
    }

    pub fn with_track_gains(mut self, apply: bool) -> Self {
        self.apply_track_gains = apply;
        self
    }

    /// Strict mode: read failures abort `process` with an error.
    pub fn with_may_throw(mut self, may_throw: bool) -> Self {
        self.may_throw = may_throw;
        self
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| MixError::Serialization(format!("Failed to serialize options: {}", e)))
    }

    /// Deserialize from JSON bytes; missing fields take their defaults.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| MixError::Serialization(format!("Failed to parse options: {}", e)))
    }

    fn validate(&self) -> Result<()> {
        if self.num_channels == 0 {
            return Err(MixError::InvalidParameter(
                "at least one output channel is required".into(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(MixError::InvalidParameter(
                "buffer size must be positive".into(),
            ));
        }
        if !(self.rate.is_finite() && self.rate > 0.0) {
            return Err(MixError::InvalidParameter(format!(
                "invalid output rate {}",
                self.rate
            )));
        }
        if self.start_time.is_nan() || self.stop_time.is_nan() {
            return Err(MixError::InvalidParameter("window bounds must be numbers".into()));
        }
        Ok(())
    }
}

/// Read state of one input track.
struct TrackCursor<'a> {
    track: &'a dyn SampleSource,
    /// Next sample index to fetch, in the track's own rate.
    position: i64,
    queue: SampleQueue,
    resample: Resample,
}

/// Session values shared by the per-track mixing routines.
struct MixContext<'w> {
    rate: f64,
    speed: f64,
    range: PlayRange,
    may_throw: bool,
    warp: &'w Warp,
}

/// Multi-track mixdown session.
///
/// Tracks are borrowed for the lifetime of the mixer. Every buffer is
/// allocated in [`Mixer::new`]; `process` only reuses them.
pub struct Mixer<'a> {
    inputs: Vec<TrackCursor<'a>>,
    range: PlayRange,
    time: f64,
    speed: f64,
    rate: f64,
    num_channels: usize,
    buffer_size: usize,
    interleaved: bool,
    format: SampleFormat,
    high_quality: bool,
    may_throw: bool,
    apply_track_gains: bool,
    warp: Warp,
    downmix: Option<Downmix>,
    resample_params: ResampleParameters,
    /// Resampled output of the channels of one group.
    float_buffers: Vec<Vec<f32>>,
    env_values: Vec<f32>,
    /// Per output channel accumulators.
    temp: Vec<Vec<f32>>,
    output: Vec<SampleBuffer>,
    channel_flags: SmallVec<[bool; 8]>,
    gains: SmallVec<[f32; 8]>,
    ditherer: Ditherer,
}

impl<'a> Mixer<'a> {
    /// Create a mixer over `tracks`, positioned at the window start.
    pub fn new(tracks: &[&'a dyn SampleSource], options: MixerOptions) -> Result<Self> {
        options.validate()?;
        let MixerOptions {
            may_throw,
            warp,
            start_time,
            stop_time,
            num_channels,
            buffer_size,
            interleaved,
            rate,
            format,
            high_quality,
            downmix,
            apply_track_gains,
        } = options;

        let downmix = match downmix {
            Some(dm) if dm.matches(tracks.len(), num_channels) => Some(dm),
            Some(dm) => {
                warn!(
                    tracks = tracks.len(),
                    channels = num_channels,
                    downmix_tracks = dm.num_tracks(),
                    downmix_channels = dm.num_channels(),
                    "Downmix does not match the session, using default routing"
                );
                None
            }
            None => None,
        };

        let track_rates: Vec<f64> = tracks.iter().map(|t| t.rate()).collect();
        let resample_params = ResampleParameters::new(&track_rates, rate, &warp);
        let range = PlayRange::new(start_time, stop_time);
        let time = start_time;

        let inputs = tracks
            .iter()
            .enumerate()
            .map(|(i, &track)| TrackCursor {
                track,
                position: track.time_to_samples(time),
                queue: SampleQueue::new(QUEUE_MAX_LEN),
                resample: Resample::new(
                    high_quality,
                    resample_params.min_factor[i],
                    resample_params.max_factor[i],
                ),
            })
            .collect();

        let output = if interleaved {
            vec![SampleBuffer::new(format, buffer_size * num_channels)]
        } else {
            (0..num_channels)
                .map(|_| SampleBuffer::new(format, buffer_size))
                .collect()
        };

        info!(
            tracks = tracks.len(),
            rate,
            channels = num_channels,
            buffer_size,
            variable_rates = resample_params.variable_rates,
            "Mixer created for {}",
            range
        );

        Ok(Self {
            inputs,
            range,
            time,
            speed: warp.initial_speed().abs(),
            rate,
            num_channels,
            buffer_size,
            interleaved,
            format,
            high_quality,
            may_throw,
            apply_track_gains,
            warp,
            downmix,
            resample_params,
            float_buffers: vec![vec![0.0; buffer_size]; MAX_GROUP_CHANNELS],
            env_values: vec![0.0; buffer_size.max(QUEUE_MAX_LEN)],
            temp: vec![vec![0.0; buffer_size]; num_channels],
            output,
            channel_flags: SmallVec::from_elem(false, num_channels),
            gains: SmallVec::from_elem(1.0, num_channels),
            ditherer: Ditherer::new(DitherType::for_quality(high_quality), num_channels),
        })
    }

    /// Mix the next block of at most `max_to_process` frames.
    ///
    /// Returns the number of frames now in the output buffer(s); `0` once
    /// every track is past the window.
    pub fn process(&mut self, max_to_process: usize) -> Result<usize> {
        let max_to_process = if max_to_process > self.buffer_size {
            debug!(
                requested = max_to_process,
                buffer_size = self.buffer_size,
                "Clamping block request"
            );
            self.buffer_size
        } else {
            max_to_process
        };

        for acc in &mut self.temp {
            acc.fill(0.0);
        }

        let backwards = self.range.is_backwards();
        let variable_rates = self.resample_params.variable_rates;
        let ctx = MixContext {
            rate: self.rate,
            speed: self.speed,
            range: self.range,
            may_throw: self.may_throw,
            warp: &self.warp,
        };

        let mut new_time = self.time;
        let mut max_out = 0;
        let num_inputs = self.inputs.len();
        let mut i = 0;
        while i < num_inputs {
            let group = self.inputs[i].track.channel_group_size().max(1);
            if i + group > num_inputs {
                error!(
                    track = self.inputs[i].track.name(),
                    group,
                    remaining = num_inputs - i,
                    "Channel group runs past the last track"
                );
                debug_assert!(false, "channel group runs past the last track");
                break;
            }

            // Only the first two channels of a group are mixed.
            let limit = group.min(MAX_GROUP_CHANNELS);
            let mut mixed = [0usize; MAX_GROUP_CHANNELS];
            for (j, produced) in mixed.iter_mut().enumerate().take(limit) {
                let cursor = &mut self.inputs[i + j];
                let dest = &mut self.float_buffers[j][..max_to_process];
                let track_rate = cursor.track.rate();
                *produced = if variable_rates || track_rate != ctx.rate {
                    mix_variable_rates(cursor, &ctx, &mut self.env_values, dest)?
                } else {
                    mix_same_rate(cursor, &ctx, &mut self.env_values, dest)?
                };
                max_out = max_out.max(*produced);

                let track_time = cursor.position as f64 / track_rate;
                new_time = if backwards {
                    new_time.min(track_time)
                } else {
                    new_time.max(track_time)
                };
            }

            for (j, &produced) in mixed.iter().enumerate().take(limit) {
                let index = i + j;
                let track = self.inputs[index].track;
                if self.apply_track_gains {
                    for (c, gain) in self.gains.iter_mut().enumerate() {
                        *gain = track.channel_gain(c);
                    }
                }
                let row = self.downmix.as_ref().and_then(|dm| dm.row(index));
                find_channel_flags(&mut self.channel_flags, row, track.channel());
                mix_buffers(
                    &self.channel_flags,
                    &self.gains,
                    &self.float_buffers[j][..produced],
                    &mut self.temp,
                );
            }

            i += group;
        }

        self.time = if backwards {
            new_time.min(self.time).max(self.range.t1)
        } else {
            new_time.max(self.time).min(self.range.t1)
        };

        let stride = if self.interleaved { self.num_channels } else { 1 };
        for (c, acc) in self.temp.iter().enumerate() {
            let (dst, offset) = if self.interleaved {
                (&mut self.output[0], c)
            } else {
                (&mut self.output[c], 0)
            };
            self.ditherer.copy_samples(&acc[..max_out], dst, offset, stride, c);
        }

        Ok(max_out)
    }

    /// Output of the last block: the interleaved buffer, or channel 0.
    pub fn buffer(&self) -> &SampleBuffer {
        &self.output[0]
    }

    /// Planar output of channel `channel`.
    ///
    /// With interleaved output only channel 0 exists.
    pub fn channel_buffer(&self, channel: usize) -> Option<&SampleBuffer> {
        self.output.get(channel)
    }

    /// Session time reached by the tracks read furthest.
    pub fn current_time(&self) -> f64 {
        self.time
    }

    /// Jump to `time`, clamped into the window.
    ///
    /// Queued samples are dropped. With `skipping` the resamplers restart
    /// too, so no filter history carries across the jump.
    pub fn reposition(&mut self, time: f64, skipping: bool) {
        self.time = self.range.clamp(time);
        for cursor in &mut self.inputs {
            cursor.position = cursor.track.time_to_samples(self.time);
            cursor.queue.clear();
        }
        if skipping {
            self.make_resamplers();
        }
    }

    /// Replace the window and the speed, then reposition to `t0`.
    pub fn set_times_and_speed(&mut self, t0: f64, t1: f64, speed: f64, skipping: bool) {
        debug_assert!(speed.is_finite());
        self.range = PlayRange::new(t0, t1);
        self.speed = speed.abs();
        self.reposition(t0, skipping);
    }

    /// Update the scrub speed; the sign gives the direction.
    ///
    /// A direction change switches to an unbounded window in the new
    /// direction and restarts from `start_time`.
    ///
    /// Speed `0.0` does not pause. It plays at the slowest speed the warp
    /// allows, so `process` keeps producing stretched output until the
    /// speed changes again.
    pub fn set_speed_for_keyboard_scrubbing(&mut self, speed: f64, start_time: f64) {
        debug_assert!(speed.is_finite());
        let PlayRange { t0, t1 } = self.range;
        if (speed > 0.0 && t1 < t0) || (speed < 0.0 && t1 > t0) {
            self.range = if speed > 0.0 {
                PlayRange::FORWARD_UNBOUNDED
            } else {
                PlayRange::BACKWARD_UNBOUNDED
            };
            info!(speed, start_time, "Scrub direction changed");
            self.reposition(start_time, true);
        }
        self.speed = speed.abs();
    }

    fn make_resamplers(&mut self) {
        debug!(tracks = self.inputs.len(), "Rebuilding resamplers");
        for (i, cursor) in self.inputs.iter_mut().enumerate() {
            cursor.resample = Resample::new(
                self.high_quality,
                self.resample_params.min_factor[i],
                self.resample_params.max_factor[i],
            );
        }
    }

    pub fn range(&self) -> PlayRange {
        self.range
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn is_interleaved(&self) -> bool {
        self.interleaved
    }

    pub fn resample_parameters(&self) -> &ResampleParameters {
        &self.resample_params
    }

    /// Downmix in effect, if one was accepted.
    pub fn downmix(&self) -> Option<&Downmix> {
        self.downmix.as_ref()
    }

    /// Samples queued for `track` ahead of its resampler.
    pub fn queued(&self, track: usize) -> Option<usize> {
        self.inputs.get(track).map(|c| c.queue.len())
    }

    /// Factor used by the last resampler call of `track`.
    pub fn last_resample_factor(&self, track: usize) -> Option<f64> {
        self.inputs.get(track).and_then(|c| c.resample.last_factor())
    }
}

/// Fetch samples from a track, substituting silence unless strict.
fn read_floats(
    track: &dyn SampleSource,
    start: i64,
    buffer: &mut [f32],
    may_throw: bool,
) -> Result<()> {
    match track.get_floats(start, buffer) {
        Ok(()) => Ok(()),
        Err(e) if may_throw => Err(e),
        Err(e) => {
            warn!(
                track = track.name(),
                position = start,
                len = buffer.len(),
                "Read failed, mixing silence: {}",
                e
            );
            buffer.fill(0.0);
            Ok(())
        }
    }
}

/// Read `buffer.len()` samples at `start` scaled by the track envelope, in
/// playback order.
fn fetch_scaled(
    track: &dyn SampleSource,
    start: i64,
    buffer: &mut [f32],
    env_values: &mut [f32],
    ctx: &MixContext<'_>,
) -> Result<()> {
    read_floats(track, start, buffer, ctx.may_throw)?;
    let gains = &mut env_values[..buffer.len()];
    track.envelope_values(gains, start as f64 / track.rate());
    for (s, g) in buffer.iter_mut().zip(gains.iter()) {
        *s *= *g;
    }
    if ctx.range.is_backwards() {
        buffer.reverse();
    }
    Ok(())
}

/// Copy a track that needs no resampling into `dest`.
fn mix_same_rate(
    cursor: &mut TrackCursor<'_>,
    ctx: &MixContext<'_>,
    env_values: &mut [f32],
    dest: &mut [f32],
) -> Result<usize> {
    let track = cursor.track;
    let rate = track.rate();
    let t = cursor.position as f64 / rate;
    let t_end = ctx.range.active_end(track.start_time(), track.end_time());
    if ctx.range.is_exhausted(t, t_end) {
        return Ok(0);
    }

    let backwards = ctx.range.is_backwards();
    let span = ((t_end - t).abs() * rate + 0.5).floor() as i64;
    let len = limit_sample_buffer_size(dest.len(), span);
    let start = if backwards {
        cursor.position - len as i64
    } else {
        cursor.position
    };

    fetch_scaled(track, start, &mut dest[..len], env_values, ctx)?;

    if backwards {
        cursor.position -= len as i64;
    } else {
        cursor.position += len as i64;
    }
    Ok(len)
}

/// Resample a track into `dest`, refilling its queue as needed.
fn mix_variable_rates(
    cursor: &mut TrackCursor<'_>,
    ctx: &MixContext<'_>,
    env_values: &mut [f32],
    dest: &mut [f32],
) -> Result<usize> {
    let track = cursor.track;
    let track_rate = track.rate();
    let initial_warp = ctx.rate / ctx.speed / track_rate;
    let backwards = ctx.range.is_backwards();
    let direction = ctx.range.direction();
    let end_pos = track.time_to_samples(ctx.range.active_end(track.start_time(), track.end_time()));

    // Track time of the first sample still queued.
    let queued = cursor.queue.len() as i64;
    let first_queued = if backwards {
        cursor.position + queued
    } else {
        cursor.position - queued
    };
    let mut t = first_queued as f64 / track_rate;

    let mut out = 0;
    while out < dest.len() {
        if cursor.queue.len() < PROCESS_LEN {
            cursor.queue.compact();
            let remaining = if backwards {
                cursor.position - end_pos
            } else {
                end_pos - cursor.position
            };
            let get_len = limit_sample_buffer_size(cursor.queue.free_space(), remaining);
            if get_len > 0 {
                let start = if backwards {
                    cursor.position - get_len as i64
                } else {
                    cursor.position
                };
                fetch_scaled(track, start, cursor.queue.tail_mut(get_len), env_values, ctx)?;
                cursor.queue.commit(get_len);
                if backwards {
                    cursor.position -= get_len as i64;
                } else {
                    cursor.position += get_len as i64;
                }
            }
        }

        let last = cursor.queue.len() < PROCESS_LEN;
        let this_len = cursor.queue.len().min(PROCESS_LEN);

        let span = this_len as f64 / track_rate;
        let factor = initial_warp
            * if backwards {
                ctx.warp.average_factor(t - span, t)
            } else {
                ctx.warp.average_factor(t, t + span)
            };

        let (consumed, produced) = cursor.resample.process(
            factor,
            &cursor.queue.pending()[..this_len],
            last,
            &mut dest[out..],
        );
        cursor.queue.consume(consumed);
        out += produced;
        t += consumed as f64 / track_rate * direction;

        if last {
            break;
        }
    }

    debug_assert!(out <= dest.len());
    Ok(out)
}

/// Output channels a track feeds: the downmix row when present, else by
/// channel role.
fn find_channel_flags(flags: &mut [bool], row: Option<&[bool]>, channel: ChannelType) {
    flags.fill(false);
    if let Some(row) = row {
        let n = flags.len().min(row.len());
        flags[..n].copy_from_slice(&row[..n]);
        return;
    }
    match channel {
        ChannelType::Mono => flags.fill(true),
        ChannelType::Left => flags[0] = true,
        ChannelType::Right => {
            if flags.len() >= 2 {
                flags[1] = true;
            } else {
                flags[0] = true;
            }
        }
    }
}

fn mix_buffers(flags: &[bool], gains: &[f32], src: &[f32], dest: &mut [Vec<f32>]) {
    for ((acc, &on), &gain) in dest.iter_mut().zip(flags).zip(gains) {
        if !on {
            continue;
        }
        for (d, &s) in acc.iter_mut().zip(src) {
            *d += s * gain;
        }
    }
}
