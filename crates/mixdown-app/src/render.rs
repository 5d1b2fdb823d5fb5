//! JSON-described offline renders.

use anyhow::{Context, Result};
use mixdown_engine::{Mixer, MixerOptions, SampleSource, ToneTrack};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

fn default_block_size() -> usize {
    4096
}

/// A render job: mixer options, input tracks and the output file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub options: MixerOptions,
    pub tracks: Vec<ToneTrack>,
    /// Raw PCM destination.
    pub output: PathBuf,
    /// Frames requested per `process` call.
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

impl RenderConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read render config {}", path.display()))?;
        serde_json::from_slice(&data)
            .with_context(|| format!("Invalid render config {}", path.display()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderStats {
    pub frames: usize,
    pub bytes: usize,
    pub seconds: f64,
}

/// Mix `config` to exhaustion and write interleaved raw PCM.
pub fn render(config: &RenderConfig) -> Result<RenderStats> {
    let tracks: Vec<&dyn SampleSource> = config
        .tracks
        .iter()
        .map(|t| t as &dyn SampleSource)
        .collect();
    let mut mixer = Mixer::new(&tracks, config.options.clone()).context("Invalid mixer options")?;

    let file = File::create(&config.output)
        .with_context(|| format!("Failed to create {}", config.output.display()))?;
    let mut writer = BufWriter::new(file);

    let channels = mixer.num_channels();
    let bytes_per_sample = mixer.format().bytes_per_sample();
    let mut frames = 0;
    let mut bytes = 0;
    loop {
        let n = mixer.process(config.block_size.max(1))?;
        if n == 0 {
            break;
        }
        let len = n * channels * bytes_per_sample;
        if mixer.is_interleaved() {
            writer.write_all(&mixer.buffer().as_bytes()[..len])?;
        } else {
            write_planar(&mixer, n, &mut writer)?;
        }
        frames += n;
        bytes += len;
        debug!(frames, time = mixer.current_time(), "Block written");
    }
    writer.flush()?;

    Ok(RenderStats {
        frames,
        bytes,
        seconds: frames as f64 / mixer.rate(),
    })
}

/// Interleave the planar channel buffers of one block into `writer`.
fn write_planar(mixer: &Mixer<'_>, frames: usize, writer: &mut impl Write) -> Result<()> {
    let bps = mixer.format().bytes_per_sample();
    let planes: Vec<&[u8]> = (0..mixer.num_channels())
        .filter_map(|c| mixer.channel_buffer(c))
        .map(|b| b.as_bytes())
        .collect();
    for i in 0..frames {
        for plane in &planes {
            writer.write_all(&plane[i * bps..(i + 1) * bps])?;
        }
    }
    Ok(())
}
