//! Mixdown - offline multi-track renderer
//!
//! Reads a JSON render description, mixes its tracks and writes the result
//! as raw PCM in the configured format and channel layout.

mod render;

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: mixdown <render.json>")?;

    let config = render::RenderConfig::load(&config_path)?;
    info!(
        "Rendering {} track(s) to {}",
        config.tracks.len(),
        config.output.display()
    );

    let stats = render::render(&config)?;
    info!(
        frames = stats.frames,
        bytes = stats.bytes,
        "Wrote {:.3}s of audio",
        stats.seconds
    );
    Ok(())
}
