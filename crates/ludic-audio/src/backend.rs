//! CPAL output device plumbing
//!
//! Opens the default output device with a stereo f32 stream at the fixed
//! engine rate and hands each device callback to [`MixerState::mix`] behind
//! the shared mutex. The engine never adapts to the device format; a device
//! that cannot do f32 stereo at the engine rate fails the init.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use crate::config::MixerConfig;
use crate::error::{AudioError, AudioResult};
use crate::mixer::MixerState;
use crate::types::{WORKING_CHANNELS, WORKING_RATE};

/// Open and configure the default output device for the engine format.
pub(crate) fn open_output_stream(
    state: Arc<Mutex<MixerState>>,
    config: &MixerConfig,
) -> AudioResult<Stream> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let supported = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.channels() as usize >= WORKING_CHANNELS)
        .find(|c| {
            WORKING_RATE >= c.min_sample_rate().0 && WORKING_RATE <= c.max_sample_rate().0
        })
        .ok_or_else(|| {
            AudioError::ConfigError(format!(
                "no f32 stereo output configuration at {}Hz",
                WORKING_RATE
            ))
        })?;
    let channels = supported.channels();

    let buffer_size = match config.buffer_size.as_frames() {
        Some(frames) => CpalBufferSize::Fixed(frames),
        None => CpalBufferSize::Default,
    };
    let stream_config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(WORKING_RATE),
        buffer_size,
    };

    log::info!(
        "Audio config: {} channels, {}Hz, buffer {:?}",
        channels,
        WORKING_RATE,
        config.buffer_size
    );

    let stream = build_output_stream(&device, &stream_config, state)?;
    Ok(stream)
}

fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    state: Arc<Mutex<MixerState>>,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;

    // Reused when the device has more than two channels.
    let mut stereo: Vec<f32> = Vec::new();

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let mut state = state.lock().unwrap();
                if channels == WORKING_CHANNELS {
                    state.mix(data);
                } else {
                    // Device opened with extra channels: render stereo and
                    // spread it over the first pair, silence the rest.
                    let frames = data.len() / channels;
                    stereo.resize(frames * WORKING_CHANNELS, 0.0);
                    state.mix(&mut stereo);
                    for (frame, rendered) in data
                        .chunks_mut(channels)
                        .zip(stereo.chunks(WORKING_CHANNELS))
                    {
                        frame[0] = rendered[0];
                        frame[1] = rendered[1];
                        for ch in frame.iter_mut().skip(2) {
                            *ch = 0.0;
                        }
                    }
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None, // No timeout (blocking)
        )
        .map_err(|e| AudioError::StreamBuild(e.to_string()))?;

    Ok(stream)
}
