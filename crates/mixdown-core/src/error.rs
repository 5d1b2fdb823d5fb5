//! Error types for the mixdown engine.

use thiserror::Error;

/// Main error type for mixdown operations.
#[derive(Error, Debug)]
pub enum MixError {
    /// A track could not supply samples and strict mode is active.
    #[error("Read error on track '{track}' at sample {position}: {reason}")]
    Read {
        track: String,
        position: i64,
        reason: String,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl MixError {
    /// Build a read error for `track` at `position`.
    pub fn read(track: impl Into<String>, position: i64, reason: impl Into<String>) -> Self {
        Self::Read {
            track: track.into(),
            position,
            reason: reason.into(),
        }
    }
}

/// Result type alias for mixdown operations.
pub type Result<T> = std::result::Result<T, MixError>;
