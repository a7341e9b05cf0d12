//! Common audio types and engine constants
//!
//! The mixer works in one fixed internal format: interleaved 32-bit float
//! stereo at [`WORKING_RATE`]. Everything that enters the engine is converted
//! to this format first, so the hot mixing loop never branches on formats.

use std::ops::{Index, IndexMut};

/// Fixed internal sample rate of the engine.
///
/// On wasm32 some browsers pick too small an audio buffer below 48kHz, which
/// causes popping in the mixer callback, so the web build runs at 48kHz.
#[cfg(not(target_arch = "wasm32"))]
pub const WORKING_RATE: u32 = 44_100;
#[cfg(target_arch = "wasm32")]
pub const WORKING_RATE: u32 = 48_000;

/// Output channel count; the engine always renders interleaved stereo.
pub const WORKING_CHANNELS: usize = 2;

/// Capacity of the sample store (fully decoded clips).
pub const MAX_SAMPLES: usize = 256;

/// Capacity of the playback registry (simultaneously playing one-shots).
pub const MAX_PLAYING_SOUNDS: usize = 32;

/// Capacity of the streaming slot table.
pub const MAX_STREAMING_SOUNDS: usize = 8;

/// Frames requested from a stream's decoder per refill read.
pub const STREAMING_CHUNK_FRAMES: usize = 4096;

/// Initial capacity (in frames) of the persistent accumulation buffer.
pub const INITIAL_WORKING_FRAMES: usize = 4096;

/// Audio sample type used throughout the engine.
pub type Sample = f32;

/// A single stereo frame (left and right channels).
///
/// `#[repr(C)]` guarantees the [left, right] layout, so a `&[StereoSample]`
/// can be viewed as interleaved `&[f32]` with bytemuck and copied straight
/// into the device buffer without a per-frame conversion.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    /// A silent frame.
    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Same value in both channels.
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Peak amplitude (max of abs(left), abs(right)).
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

/// A buffer of stereo frames.
///
/// Used for the persistent accumulation buffer the mixer renders into. Grows
/// on demand but is otherwise reused callback to callback, so the hot path
/// allocates only when the device asks for more frames than ever before.
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a buffer filled with silence.
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Resize the buffer, filling with silence if growing.
    pub fn resize(&mut self, new_len: usize) {
        self.samples.resize(new_len, StereoSample::silence());
    }

    /// Fill the buffer with silence.
    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Zero-copy view of the frames as interleaved f32 [L, R, L, R, ...].
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Peak amplitude over the whole buffer.
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.peak()).fold(0.0, Sample::max)
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}

/// Inverse lerp clamped to [0, 1]: where `value` sits between `a` and `b`.
#[inline]
pub fn inverse_lerp(a: f32, b: f32, value: f32) -> f32 {
    if a == b {
        return 0.0;
    }
    ((value - a) / (b - a)).clamp(0.0, 1.0)
}

/// Left/right gain weights for a mono source at the given pan position.
///
/// Pan is in [-1, 1]: -1 fully left, 0 center, +1 fully right. At center both
/// weights are 1; panning attenuates the far channel linearly and leaves the
/// near channel at full gain.
#[inline]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    (inverse_lerp(1.0, 0.0, pan), inverse_lerp(-1.0, 0.0, pan))
}
