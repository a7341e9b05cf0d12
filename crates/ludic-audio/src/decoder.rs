//! Symphonia-backed audio decoding
//!
//! Wraps symphonia's probe/format/decoder plumbing behind the two access
//! patterns the mixer needs: decode a whole file up front (one-shot samples)
//! and decode chunk by chunk with seeking (streaming slots).

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{AudioError, AudioResult};
use crate::types::Sample;

/// An open audio file being decoded incrementally.
pub struct AudioDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: usize,
    sample_rate: u32,
    /// Reused between packets; recreated only when a packet needs more room.
    sample_buf: Option<SampleBuffer<Sample>>,
}

impl AudioDecoder {
    /// Open a file and set up a decoder for its first audio track.
    pub fn open(path: &Path) -> AudioResult<Self> {
        let file = File::open(path).map_err(|e| AudioError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| AudioError::OpenFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| {
                t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some()
            })
            .ok_or_else(|| AudioError::NoAudioTrack {
                path: path.to_path_buf(),
            })?;
        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(crate::types::WORKING_RATE);
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count())
            .unwrap_or(1);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::DecodeFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            format,
            decoder,
            track_id,
            channels,
            sample_rate,
            sample_buf: None,
        })
    }

    /// Channel count of the source.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Native sample rate of the source.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Decode the next packet into `out` as interleaved f32.
    ///
    /// Appends to `out` and returns the number of frames decoded. Returns
    /// `Ok(0)` at end of stream. Packets that fail to decode (bit errors)
    /// are skipped; only I/O level failures are returned as errors.
    pub fn next_chunk(&mut self, out: &mut Vec<Sample>) -> AudioResult<usize> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(0);
                }
                Err(e) => {
                    return Err(AudioError::DecodeFailed {
                        path: "<stream>".into(),
                        reason: e.to_string(),
                    });
                }
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // A corrupt packet is recoverable; move on to the next one.
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => {
                    return Err(AudioError::DecodeFailed {
                        path: "<stream>".into(),
                        reason: e.to_string(),
                    });
                }
            };

            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }

            let needs_new_buf = match &self.sample_buf {
                Some(buf) => buf.capacity() < frames * self.channels,
                None => true,
            };
            if needs_new_buf {
                self.sample_buf = Some(SampleBuffer::new(
                    decoded.capacity() as u64,
                    *decoded.spec(),
                ));
            }
            let buf = self.sample_buf.as_mut().unwrap();
            buf.copy_interleaved_ref(decoded);
            out.extend_from_slice(buf.samples());
            return Ok(frames);
        }
    }

    /// Decode packets into `out` until at least `min_frames` frames have
    /// been appended or the stream ends. Returns the frames appended;
    /// `Ok(0)` means end of stream. Streaming refills use this so each
    /// refill read covers a full chunk rather than a single packet.
    pub fn read_frames(&mut self, out: &mut Vec<Sample>, min_frames: usize) -> AudioResult<usize> {
        let mut total = 0;
        while total < min_frames {
            let frames = self.next_chunk(out)?;
            if frames == 0 {
                break;
            }
            total += frames;
        }
        Ok(total)
    }

    /// Seek to the given frame position (used for stream loop points).
    pub fn seek_to_frame(&mut self, frame: u64) -> AudioResult<()> {
        self.format
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: frame,
                    track_id: self.track_id,
                },
            )
            .map_err(|e| AudioError::DecodeFailed {
                path: "<stream>".into(),
                reason: e.to_string(),
            })?;
        // Decoder state is stale after a seek.
        self.decoder.reset();
        Ok(())
    }
}


/// Decode an entire file into interleaved f32 at its native rate and layout.
///
/// Returns the samples together with the source channel count and rate.
pub fn decode_all(path: &Path) -> AudioResult<(Vec<Sample>, usize, u32)> {
    let mut decoder = AudioDecoder::open(path)?;
    let channels = decoder.channels();
    let sample_rate = decoder.sample_rate();
    let mut data = Vec::new();
    loop {
        let frames = decoder.next_chunk(&mut data).map_err(|e| match e {
            AudioError::DecodeFailed { reason, .. } => AudioError::DecodeFailed {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })?;
        if frames == 0 {
            break;
        }
    }
    Ok((data, channels, sample_rate))
}
