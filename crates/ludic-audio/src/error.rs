//! Audio error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the audio mixing core.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("No audio output device available")]
    NoDevice,

    #[error("Output device does not support the engine format: {0}")]
    ConfigError(String),

    #[error("Failed to build audio stream: {0}")]
    StreamBuild(String),

    #[error("Failed to start audio stream: {0}")]
    StreamPlay(String),

    #[error("Failed to open {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    #[error("Failed to decode {path}: {reason}")]
    DecodeFailed { path: PathBuf, reason: String },

    #[error("{path} contains no decodable audio track")]
    NoAudioTrack { path: PathBuf },

    #[error("Sound group {group} is out of range (mixer has {num_groups})")]
    InvalidGroup { group: usize, num_groups: usize },

    #[error("Sample rate conversion failed: {0}")]
    ResampleFailed(String),

    #[error("All {capacity} sample slots are in use")]
    SampleTableFull { capacity: usize },

    #[error("All {capacity} streaming slots are in use")]
    StreamTableFull { capacity: usize },
}

/// Result alias used throughout the crate.
pub type AudioResult<T> = Result<T, AudioError>;
