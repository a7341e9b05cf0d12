//! Mixer configuration
//!
//! Settings that vary per game rather than per platform: the number of sound
//! groups, the preferred device buffer size, and how many background load
//! workers to spawn. The engine sample rate and channel count are fixed
//! constants, not configuration (see [`crate::types`]).

use serde::{Deserialize, Serialize};

/// Default number of background load worker threads.
pub const DEFAULT_LOAD_WORKERS: usize = 2;

/// Preferred buffer size for the output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the system choose the default buffer size.
    #[default]
    Default,
    /// Request a specific buffer size in frames (may be adjusted by the system).
    Fixed(u32),
}

impl BufferSize {
    /// Get the buffer size in frames, or None for system default.
    pub fn as_frames(&self) -> Option<u32> {
        match self {
            BufferSize::Default => None,
            BufferSize::Fixed(frames) => Some(*frames),
        }
    }
}

/// Configuration for the mixer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixerConfig {
    /// Number of sound groups (each with its own volume control).
    pub num_groups: usize,

    /// Preferred device buffer size.
    pub buffer_size: BufferSize,

    /// Number of background load worker threads.
    pub load_workers: usize,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            num_groups: 1,
            buffer_size: BufferSize::default(),
            load_workers: DEFAULT_LOAD_WORKERS,
        }
    }
}

impl MixerConfig {
    /// Create a config with the given number of sound groups.
    pub fn new(num_groups: usize) -> Self {
        Self {
            num_groups,
            ..Default::default()
        }
    }

    /// Set the preferred buffer size.
    pub fn with_buffer_size(mut self, size: BufferSize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set a fixed buffer size in frames.
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }

    /// Set the number of background load workers.
    pub fn with_load_workers(mut self, workers: usize) -> Self {
        self.load_workers = workers.max(1);
        self
    }
}
