//! Channel remixing and sample rate conversion
//!
//! Everything entering the engine is converted to f32 at [`WORKING_RATE`]
//! before it reaches the mixing loop. One-shot samples go through
//! [`remix_channels`] and [`resample_interleaved`] once at load time;
//! streaming slots feed decoded chunks through a persistent
//! [`StreamConverter`] instead.

use std::collections::VecDeque;

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::error::{AudioError, AudioResult};
use crate::types::{Sample, WORKING_RATE};

/// Frames fed to the resampler per processing step.
const RESAMPLE_CHUNK_FRAMES: usize = 1024;

/// Remix interleaved audio from `src_channels` to `dst_channels`.
///
/// Mixing down averages the source channels; 1→2 duplicates the mono channel;
/// sources with more than two channels keep only the first stereo pair when
/// targeting stereo.
pub fn remix_channels(input: &[Sample], src_channels: usize, dst_channels: usize) -> Vec<Sample> {
    if src_channels == dst_channels {
        return input.to_vec();
    }
    let frames = input.len() / src_channels;
    let mut out = Vec::with_capacity(frames * dst_channels);
    match dst_channels {
        1 => {
            for frame in input.chunks_exact(src_channels) {
                out.push(frame.iter().sum::<Sample>() / src_channels as Sample);
            }
        }
        _ => {
            for frame in input.chunks_exact(src_channels) {
                if src_channels == 1 {
                    out.push(frame[0]);
                    out.push(frame[0]);
                } else {
                    out.push(frame[0]);
                    out.push(frame[1]);
                }
            }
        }
    }
    out
}

/// Resample a whole interleaved buffer from `src_rate` to the engine rate.
pub fn resample_interleaved(
    input: &[Sample],
    channels: usize,
    src_rate: u32,
) -> AudioResult<Vec<Sample>> {
    if src_rate == WORKING_RATE {
        return Ok(input.to_vec());
    }

    let ratio = WORKING_RATE as f64 / src_rate as f64;
    let mut resampler = FastFixedIn::<Sample>::new(
        ratio,
        1.1,
        PolynomialDegree::Linear,
        RESAMPLE_CHUNK_FRAMES,
        channels,
    )
    .map_err(|e| AudioError::ResampleFailed(e.to_string()))?;

    let frames = input.len() / channels;
    let mut planar: Vec<Vec<Sample>> = vec![Vec::with_capacity(frames); channels];
    for frame in input.chunks_exact(channels) {
        for (ch, &sample) in frame.iter().enumerate() {
            planar[ch].push(sample);
        }
    }

    let mut out_planar: Vec<Vec<Sample>> = vec![Vec::new(); channels];
    let mut pos = 0;
    while frames - pos >= RESAMPLE_CHUNK_FRAMES {
        let chunk: Vec<&[Sample]> = planar
            .iter()
            .map(|ch| &ch[pos..pos + RESAMPLE_CHUNK_FRAMES])
            .collect();
        let processed = resampler
            .process(&chunk, None)
            .map_err(|e| AudioError::ResampleFailed(e.to_string()))?;
        for (ch, data) in processed.into_iter().enumerate() {
            out_planar[ch].extend_from_slice(&data);
        }
        pos += RESAMPLE_CHUNK_FRAMES;
    }
    if pos < frames {
        let tail: Vec<&[Sample]> = planar.iter().map(|ch| &ch[pos..]).collect();
        let processed = resampler
            .process_partial(Some(&tail), None)
            .map_err(|e| AudioError::ResampleFailed(e.to_string()))?;
        for (ch, data) in processed.into_iter().enumerate() {
            out_planar[ch].extend_from_slice(&data);
        }
    }
    // Flush whatever the resampler still holds internally. The flush pass
    // runs a full zero-padded chunk, so its output is mostly silence; keep
    // only the frames the input actually accounts for.
    let flushed = resampler
        .process_partial::<Vec<Sample>>(None, None)
        .map_err(|e| AudioError::ResampleFailed(e.to_string()))?;
    for (ch, data) in flushed.into_iter().enumerate() {
        out_planar[ch].extend_from_slice(&data);
    }
    let expected_frames = (frames as f64 * ratio).round() as usize;
    for ch in out_planar.iter_mut() {
        ch.truncate(expected_frames);
    }

    let out_frames = out_planar[0].len();
    let mut out = Vec::with_capacity(out_frames * channels);
    for i in 0..out_frames {
        for ch in &out_planar {
            out.push(ch[i]);
        }
    }
    Ok(out)
}

/// Incremental rate converter for a streaming slot.
///
/// Interleaved frames at the source rate go in via [`push`](Self::push);
/// interleaved frames at the engine rate come out via [`read`](Self::read).
/// The channel count is preserved. When the source rate already matches the
/// engine rate the converter degenerates to a FIFO.
pub struct StreamConverter {
    resampler: Option<FastFixedIn<Sample>>,
    channels: usize,
    /// Engine frames per source frame; 1.0 in passthrough mode.
    ratio: f64,
    /// Source frames pushed since creation.
    frames_in: u64,
    /// Engine frames the resampler has emitted into `ready`.
    frames_out: u64,
    /// Per-channel input staging, waiting for a full resampler chunk.
    pending: Vec<VecDeque<Sample>>,
    /// Converted interleaved samples, ready to be read.
    ready: VecDeque<Sample>,
}

impl StreamConverter {
    pub fn new(channels: usize, src_rate: u32) -> AudioResult<Self> {
        let ratio = WORKING_RATE as f64 / src_rate as f64;
        let resampler = if src_rate == WORKING_RATE {
            None
        } else {
            Some(
                FastFixedIn::new(
                    ratio,
                    1.1,
                    PolynomialDegree::Linear,
                    RESAMPLE_CHUNK_FRAMES,
                    channels,
                )
                .map_err(|e| AudioError::ResampleFailed(e.to_string()))?,
            )
        };
        Ok(Self {
            resampler,
            channels,
            ratio,
            frames_in: 0,
            frames_out: 0,
            pending: vec![VecDeque::new(); channels],
            ready: VecDeque::new(),
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of converted samples (interleaved, not frames) ready to read.
    pub fn ready_samples(&self) -> usize {
        self.ready.len()
    }

    /// Feed interleaved source-rate frames into the converter.
    pub fn push(&mut self, input: &[Sample]) -> AudioResult<()> {
        if self.resampler.is_none() {
            self.ready.extend(input.iter().copied());
            return Ok(());
        }
        self.frames_in += (input.len() / self.channels) as u64;
        for frame in input.chunks_exact(self.channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                self.pending[ch].push_back(sample);
            }
        }
        self.drain_pending()
    }

    /// Signal end of input; converts any frames still staged.
    ///
    /// The resampler's flush pass runs over a full zero-padded chunk, so the
    /// tail it yields is truncated to the frame count the pushed input
    /// accounts for; without that every stream would end in a chunk of
    /// silence.
    pub fn flush(&mut self) -> AudioResult<()> {
        self.drain_pending()?;
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(());
        };
        if !self.pending[0].is_empty() {
            let chunk: Vec<Vec<Sample>> = self
                .pending
                .iter_mut()
                .map(|ch| ch.drain(..).collect())
                .collect();
            let processed = resampler
                .process_partial(Some(&chunk), None)
                .map_err(|e| AudioError::ResampleFailed(e.to_string()))?;
            self.frames_out += processed[0].len() as u64;
            Self::interleave_into(&processed, &mut self.ready);
        }
        let mut flushed = resampler
            .process_partial::<Vec<Sample>>(None, None)
            .map_err(|e| AudioError::ResampleFailed(e.to_string()))?;
        let expected = (self.frames_in as f64 * self.ratio).round() as u64;
        let keep = expected.saturating_sub(self.frames_out) as usize;
        for ch in flushed.iter_mut() {
            ch.truncate(keep);
        }
        self.frames_out += flushed[0].len() as u64;
        Self::interleave_into(&flushed, &mut self.ready);
        Ok(())
    }

    /// Read converted interleaved samples into `out`; returns how many were
    /// written. May return less than `out.len()` if the converter runs dry.
    pub fn read(&mut self, out: &mut [Sample]) -> usize {
        let count = out.len().min(self.ready.len());
        for slot in out[..count].iter_mut() {
            // Bounded by `count`, so the queue cannot be empty here.
            *slot = self.ready.pop_front().unwrap_or(0.0);
        }
        count
    }

    /// Run every complete chunk in `pending` through the resampler.
    fn drain_pending(&mut self) -> AudioResult<()> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(());
        };
        while self.pending[0].len() >= RESAMPLE_CHUNK_FRAMES {
            let chunk: Vec<Vec<Sample>> = self
                .pending
                .iter_mut()
                .map(|ch| ch.drain(..RESAMPLE_CHUNK_FRAMES).collect())
                .collect();
            let processed = resampler
                .process(&chunk, None)
                .map_err(|e| AudioError::ResampleFailed(e.to_string()))?;
            self.frames_out += processed[0].len() as u64;
            Self::interleave_into(&processed, &mut self.ready);
        }
        Ok(())
    }

    fn interleave_into(planar: &[Vec<Sample>], out: &mut VecDeque<Sample>) {
        if planar.is_empty() {
            return;
        }
        let frames = planar[0].len();
        for i in 0..frames {
            for ch in planar {
                out.push_back(ch[i]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remix_stereo_to_mono_averages() {
        let stereo = [1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        let mono = remix_channels(&stereo, 2, 1);
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_remix_mono_to_stereo_duplicates() {
        let mono = [0.25, -0.5];
        let stereo = remix_channels(&mono, 1, 2);
        assert_eq!(stereo, vec![0.25, 0.25, -0.5, -0.5]);
    }

    #[test]
    fn test_remix_same_layout_is_identity() {
        let data = [0.1, 0.2, 0.3, 0.4];
        assert_eq!(remix_channels(&data, 2, 2), data.to_vec());
    }

    #[test]
    fn test_resample_passthrough_at_engine_rate() {
        let data = vec![0.5; 100];
        let out = resample_interleaved(&data, 1, WORKING_RATE).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_resample_doubles_length_from_half_rate() {
        let frames = 8000;
        let data: Vec<f32> = (0..frames)
            .map(|i| (i as f32 * 0.05).sin() * 0.5)
            .collect();
        let out = resample_interleaved(&data, 1, WORKING_RATE / 2).unwrap();
        // The flush tail is truncated to exactly the frames the input
        // accounts for, so a 2:1 ratio doubles the length precisely.
        assert_eq!(out.len(), frames * 2);
    }

    #[test]
    fn test_stream_converter_passthrough() {
        let mut conv = StreamConverter::new(2, WORKING_RATE).unwrap();
        conv.push(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(conv.ready_samples(), 4);
        let mut out = [0.0; 4];
        assert_eq!(conv.read(&mut out), 4);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_stream_converter_short_read() {
        let mut conv = StreamConverter::new(1, WORKING_RATE).unwrap();
        conv.push(&[1.0, 2.0]).unwrap();
        let mut out = [9.0; 4];
        assert_eq!(conv.read(&mut out), 2);
        assert_eq!(&out[..2], &[1.0, 2.0]);
        assert_eq!(conv.ready_samples(), 0);
    }

    #[test]
    fn test_stream_converter_resamples_incrementally() {
        let mut conv = StreamConverter::new(1, WORKING_RATE / 2).unwrap();
        let chunk = vec![0.1_f32; 2048];
        conv.push(&chunk).unwrap();
        conv.push(&chunk).unwrap();
        conv.flush().unwrap();
        // 4096 mono frames at a 2:1 ratio yield exactly 8192, with no
        // padded silence from the flush.
        assert_eq!(conv.ready_samples(), 2048 * 2 * 2);
    }
}
