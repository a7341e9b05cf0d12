//! Mix engine and public mixer API
//!
//! [`MixerState`] holds the three shared tables (samples, streams, voices)
//! plus group volumes and the persistent accumulation buffer, all behind one
//! mutex. The device callback locks it for the duration of each mix pass;
//! every public mutation on [`Mixer`] locks the same mutex, so the callback
//! never observes partial state.
//!
//! The mixing rules are deliberately simple. Mono voices get linear panning
//! and pitch as a fractional cursor stride with no interpolation, which
//! produces repeat/skip artifacts at non-unity pitch. Stereo voices get
//! neither pan nor pitch and advance exactly one frame per output frame.
//! Those asymmetries are the documented contract, not accidents.

use std::path::Path;
use std::sync::{Arc, Mutex};

use cpal::traits::StreamTrait;

use crate::backend;
use crate::config::MixerConfig;
use crate::convert::{self, StreamConverter};
use crate::decoder::{self, AudioDecoder};
use crate::error::{AudioError, AudioResult};
use crate::loader::LoadPipeline;
use crate::playback::{PlaybackId, PlaybackRegistry, Voice};
use crate::sample::{SampleData, SampleHandle, SampleStore};
use crate::stream::{StreamHandle, StreamTable};
use crate::types::{
    pan_gains, Sample, StereoBuffer, INITIAL_WORKING_FRAMES, STREAMING_CHUNK_FRAMES,
    WORKING_CHANNELS,
};

/// Convert decibels to a linear volume (0 dB = 1.0).
pub fn db_to_volume(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert a linear volume to decibels (1.0 = 0 dB).
pub fn volume_to_db(volume: f32) -> f32 {
    20.0 * volume.log10()
}

/// A volume bus; every voice and stream is routed through exactly one.
struct SoundGroup {
    volume: f32,
}

/// Everything the device callback reads, behind the mixer lock.
pub(crate) struct MixerState {
    samples: SampleStore,
    streams: StreamTable,
    playing: PlaybackRegistry,
    groups: Vec<SoundGroup>,
    master_volume: f32,
    /// Persistent accumulation buffer; grows, never shrinks.
    working: StereoBuffer,
    /// Scratch for decoded stream chunks (source rate and layout).
    decode_scratch: Vec<Sample>,
    /// Scratch for converted stream samples pulled per callback.
    pull_scratch: Vec<Sample>,
}

impl MixerState {
    fn new(num_groups: usize) -> Self {
        Self {
            samples: SampleStore::new(),
            streams: StreamTable::new(),
            playing: PlaybackRegistry::new(),
            groups: (0..num_groups.max(1))
                .map(|_| SoundGroup { volume: 1.0 })
                .collect(),
            master_volume: 1.0,
            working: StereoBuffer::silence(INITIAL_WORKING_FRAMES),
            decode_scratch: Vec::new(),
            pull_scratch: Vec::new(),
        }
    }

    /// Render one callback's worth of interleaved stereo into `out`.
    ///
    /// Runs entirely under the mixer lock: bounded by the table sizes, no
    /// allocation beyond growing the reusable buffers, no blocking I/O
    /// (stream refills decode from buffered readers already open).
    pub(crate) fn mix(&mut self, out: &mut [Sample]) {
        out.fill(0.0);
        let frames = out.len() / WORKING_CHANNELS;
        if self.working.len() < frames {
            self.working.resize(frames);
        }
        for frame in self.working.as_mut_slice()[..frames].iter_mut() {
            *frame = Default::default();
        }

        self.mix_voices(frames);
        self.mix_streams(out.len());

        out.copy_from_slice(&self.working.as_interleaved()[..out.len()]);
    }

    /// Walk the playback registry by slot index, accumulating each live
    /// voice. Index walking tolerates releasing the slot being visited.
    fn mix_voices(&mut self, frames: usize) {
        for index in 0..self.playing.slot_count() {
            let Some(voice) = self.playing.voice_at_mut(index) else {
                continue;
            };
            let Some(sample) = self.samples.get(voice.sample) else {
                // The unload cascade should make this unreachable; recover
                // by retiring the orphaned voice.
                self.playing.release_index(index);
                continue;
            };
            let group_volume = self.groups[voice.group].volume;
            let volume = voice.volume * group_volume * self.master_volume;
            let data = &sample.data;
            let end = data.len() as f32;
            let mut done = false;

            if sample.channels == 1 {
                let (left_weight, right_weight) = pan_gains(voice.pan);
                for i in 0..frames {
                    let value = data[voice.cursor as usize] * volume;
                    let frame = &mut self.working[i];
                    frame.left += value * left_weight;
                    frame.right += value * right_weight;
                    voice.cursor += voice.pitch;
                    if voice.cursor >= end {
                        if sample.loops {
                            voice.cursor -= end;
                            // A pitch larger than the clip wraps more than once.
                            if voice.cursor >= end {
                                voice.cursor %= end;
                            }
                        } else {
                            done = true;
                            break;
                        }
                    }
                }
            } else {
                for i in 0..frames {
                    let cursor = voice.cursor as usize;
                    let frame = &mut self.working[i];
                    frame.left += data[cursor] * volume;
                    frame.right += data[cursor + 1] * volume;
                    voice.cursor += 2.0;
                    if voice.cursor >= end {
                        if sample.loops {
                            voice.cursor -= end;
                        } else {
                            done = true;
                            break;
                        }
                    }
                }
            }

            if done {
                self.playing.release_index(index);
            }
        }
    }

    /// Refill and mix every playing stream, in slot order.
    fn mix_streams(&mut self, out_samples: usize) {
        for index in 0..self.streams.slot_count() {
            let Some(sound) = self.streams.sound_at_mut(index) else {
                continue;
            };
            if !sound.playing {
                continue;
            }
            let Some(converter) = sound.converter.as_mut() else {
                continue;
            };
            let channels = sound.channels;
            let needed = (out_samples / WORKING_CHANNELS) * channels;

            // Refill: keep decoding until this callback's demand is covered
            // or the source is drained. A looping source seeks back to its
            // loop point on EOF; a second consecutive EOF (empty tail after
            // the seek) drains it instead of spinning.
            let mut seeked = false;
            let mut failed = false;
            while converter.ready_samples() < needed && !sound.read_done {
                self.decode_scratch.clear();
                match sound
                    .decoder
                    .read_frames(&mut self.decode_scratch, STREAMING_CHUNK_FRAMES)
                {
                    Ok(0) => {
                        if sound.loops && !seeked {
                            match sound.decoder.seek_to_frame(sound.loop_point) {
                                Ok(()) => seeked = true,
                                Err(e) => {
                                    log::error!("Stream loop seek failed: {}", e);
                                    failed = true;
                                    break;
                                }
                            }
                        } else {
                            sound.read_done = true;
                            if let Err(e) = converter.flush() {
                                log::error!("Stream flush failed: {}", e);
                                failed = true;
                                break;
                            }
                        }
                    }
                    Ok(_) => {
                        seeked = false;
                        let src_channels = sound.decoder.channels();
                        let result = if src_channels == channels {
                            converter.push(&self.decode_scratch)
                        } else {
                            let remixed = convert::remix_channels(
                                &self.decode_scratch,
                                src_channels,
                                channels,
                            );
                            converter.push(&remixed)
                        };
                        if let Err(e) = result {
                            log::error!("Stream conversion failed: {}", e);
                            failed = true;
                            break;
                        }
                    }
                    Err(e) => {
                        log::error!("Stream decode failed: {}", e);
                        failed = true;
                        break;
                    }
                }
            }
            if failed {
                sound.playing = false;
                sound.converter = None;
                continue;
            }

            if self.pull_scratch.len() < needed {
                self.pull_scratch.resize(needed, 0.0);
            }
            let got = converter.read(&mut self.pull_scratch[..needed]);
            if got == 0 {
                // Drained: end of a non-looping stream.
                sound.playing = false;
                continue;
            }

            let volume = sound.volume * self.groups[sound.group].volume * self.master_volume;
            if channels == 1 {
                let (left_weight, right_weight) = pan_gains(sound.pan);
                for (i, &value) in self.pull_scratch[..got].iter().enumerate() {
                    let frame = &mut self.working[i];
                    frame.left += value * volume * left_weight;
                    frame.right += value * volume * right_weight;
                }
            } else {
                for (i, pair) in self.pull_scratch[..got].chunks_exact(2).enumerate() {
                    let frame = &mut self.working[i];
                    frame.left += pair[0] * volume;
                    frame.right += pair[1] * volume;
                }
            }
        }
    }
}

/// Decode a file and convert it to the engine rate and the requested layout.
/// Runs without any lock held; this is the worker phase of a threaded load.
fn decode_and_convert(path: &Path, desired_channels: usize) -> AudioResult<(Vec<Sample>, usize)> {
    let (data, src_channels, src_rate) = decoder::decode_all(path)?;
    if data.is_empty() {
        return Err(AudioError::DecodeFailed {
            path: path.to_path_buf(),
            reason: "file contains no audio data".into(),
        });
    }
    let desired = desired_channels.clamp(1, WORKING_CHANNELS);
    let remixed = convert::remix_channels(&data, src_channels, desired);
    let converted = convert::resample_interleaved(&remixed, desired, src_rate)?;
    Ok((converted, desired))
}

/// The audio mixer.
///
/// Owns the shared state, the background load pipeline, and (when built via
/// [`init`](Self::init)) the output device stream. Dropping the mixer stops
/// audio and joins the load workers.
pub struct Mixer {
    state: Arc<Mutex<MixerState>>,
    pipeline: LoadPipeline,
    stream: Option<cpal::Stream>,
}

impl Mixer {
    /// Build a mixer without opening an audio device.
    ///
    /// Nothing plays audibly; callers drive it with [`render`](Self::render).
    /// This is the entry point for tests and headless tools.
    pub fn new(num_groups: usize) -> Self {
        let config = MixerConfig::new(num_groups);
        Self {
            state: Arc::new(Mutex::new(MixerState::new(config.num_groups))),
            pipeline: LoadPipeline::new(config.load_workers),
            stream: None,
        }
    }

    /// Open the default output device and start mixing.
    pub fn init(num_groups: usize) -> AudioResult<Self> {
        Self::init_with_config(MixerConfig::new(num_groups))
    }

    /// Open the default output device with explicit configuration.
    pub fn init_with_config(config: MixerConfig) -> AudioResult<Self> {
        let state = Arc::new(Mutex::new(MixerState::new(config.num_groups)));
        let stream = backend::open_output_stream(state.clone(), &config)?;
        stream
            .play()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))?;
        log::info!("Audio mixer started ({} groups)", config.num_groups);
        Ok(Self {
            state,
            pipeline: LoadPipeline::new(config.load_workers),
            stream: Some(stream),
        })
    }

    /// Pause or resume the device stream (e.g. on focus loss). Errors here
    /// are logged, not propagated; the mixer state is unaffected.
    pub fn set_focus(&self, has_focus: bool) {
        let Some(stream) = &self.stream else {
            return;
        };
        let result = if has_focus {
            stream.play().map_err(|e| e.to_string())
        } else {
            stream.pause().map_err(|e| e.to_string())
        };
        if let Err(e) = result {
            log::error!("Failed to change audio stream focus: {}", e);
        }
    }

    /// Stop all streams and release the device. Safe to call more than once;
    /// dropping the mixer does the same.
    pub fn shutdown(&mut self) {
        self.stop_streaming_all_but(None);
        self.stream = None;
    }

    /// Render one callback's worth of interleaved stereo output.
    ///
    /// This is exactly what the device callback does; device-less mixers use
    /// it to advance playback manually.
    pub fn render(&self, out: &mut [Sample]) {
        self.state.lock().unwrap().mix(out);
    }

    /// Run completion callbacks for finished background loads. Call once per
    /// game-loop tick from the thread that owns the mixer.
    pub fn process_completions(&self) {
        self.pipeline.drain_completions();
    }

    // --- Volume API ---

    pub fn master_volume(&self) -> f32 {
        self.state.lock().unwrap().master_volume
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.state.lock().unwrap().master_volume = volume.clamp(0.0, 1.0);
    }

    /// Volume of a sound group, or None if the group is out of range.
    pub fn group_volume(&self, group: usize) -> Option<f32> {
        self.state.lock().unwrap().groups.get(group).map(|g| g.volume)
    }

    /// Set a group's volume, clamped to [0, 1]. No-op on an invalid group.
    pub fn set_group_volume(&self, group: usize, volume: f32) {
        let mut state = self.state.lock().unwrap();
        if let Some(g) = state.groups.get_mut(group) {
            g.volume = volume.clamp(0.0, 1.0);
        }
    }

    // --- One-shot samples ---

    /// Synchronously load a file into the sample store.
    pub fn load_sample(
        &self,
        path: &Path,
        desired_channels: usize,
        loops: bool,
    ) -> AudioResult<SampleHandle> {
        let result = decode_and_convert(path, desired_channels).and_then(|(data, channels)| {
            self.bind_sample(data, channels, loops)
        });
        if let Err(e) = &result {
            log::error!("Failed to load sample {}: {}", path.display(), e);
        }
        result
    }

    /// Load a file on a background worker.
    ///
    /// The decode runs off-thread without any lock held; the table binding
    /// and `on_done` both run on the owning thread from
    /// [`process_completions`](Self::process_completions). `on_done` is
    /// invoked exactly once, on success or failure.
    pub fn threaded_load_sample(
        &self,
        path: &Path,
        desired_channels: usize,
        loops: bool,
        on_done: impl FnOnce(AudioResult<SampleHandle>) + Send + 'static,
    ) {
        let state = self.state.clone();
        let completions = self.pipeline.completion_sender();
        let path = path.to_path_buf();
        self.pipeline.submit(Box::new(move || {
            let decoded = decode_and_convert(&path, desired_channels);
            let _ = completions.send(Box::new(move || {
                let result = decoded.and_then(|(data, channels)| {
                    bind_sample_in(&state, data, channels, loops)
                });
                if let Err(e) = &result {
                    log::error!("Failed to load sample {}: {}", path.display(), e);
                }
                on_done(result);
            }));
        }));
    }

    fn bind_sample(
        &self,
        data: Vec<Sample>,
        channels: usize,
        loops: bool,
    ) -> AudioResult<SampleHandle> {
        bind_sample_in(&self.state, data, channels, loops)
    }

    /// Unload a sample, force-stopping every voice still playing it. The
    /// stops and the free happen under one lock acquisition, so the next
    /// callback never sees a voice pointing at freed data. No-op on an
    /// already-free handle.
    pub fn unload_sample(&self, handle: SampleHandle) {
        let mut state = self.state.lock().unwrap();
        for index in state.playing.indices_using(handle) {
            state.playing.release_index(index);
        }
        state.samples.remove(handle);
    }

    // --- One-shot playback ---

    /// Start playing a loaded sample. Returns None when the handle or group
    /// is invalid or all voice slots are busy.
    pub fn play(
        &self,
        sample: SampleHandle,
        volume: f32,
        pitch: f32,
        pan: f32,
        group: usize,
    ) -> Option<PlaybackId> {
        let mut state = self.state.lock().unwrap();
        if state.samples.get(sample).is_none() {
            log::error!("Play called with an unloaded sample handle");
            return None;
        }
        if group >= state.groups.len() {
            log::error!("Play called with invalid sound group {}", group);
            return None;
        }
        let id = state.playing.claim(Voice {
            sample,
            volume,
            pitch,
            pan,
            cursor: 0.0,
            group,
        });
        if id.is_none() {
            log::warn!("All voice slots are busy; sound dropped");
        }
        id
    }

    /// Stop a playing sound. Safe on stale ids.
    pub fn stop(&self, id: PlaybackId) {
        self.state.lock().unwrap().playing.release(id);
    }

    pub fn is_playing(&self, id: PlaybackId) -> bool {
        self.state.lock().unwrap().playing.is_live(id)
    }

    pub fn change_sound_volume(&self, id: PlaybackId, volume: f32) {
        if let Some(voice) = self.state.lock().unwrap().playing.get_mut(id) {
            voice.volume = volume;
        }
    }

    pub fn change_sound_pitch(&self, id: PlaybackId, pitch: f32) {
        if let Some(voice) = self.state.lock().unwrap().playing.get_mut(id) {
            voice.pitch = pitch;
        }
    }

    pub fn change_sound_pan(&self, id: PlaybackId, pan: f32) {
        if let Some(voice) = self.state.lock().unwrap().playing.get_mut(id) {
            voice.pan = pan;
        }
    }

    // --- Streaming ---

    /// Open a file for streamed playback, or share the slot of an already
    /// open one (reference counted by path).
    pub fn load_streaming(
        &self,
        path: &Path,
        loops: bool,
        group: usize,
    ) -> AudioResult<StreamHandle> {
        if let Some(handle) = self.state.lock().unwrap().streams.acquire_existing(path) {
            return Ok(handle);
        }
        // Decoder open does file I/O; keep it outside the lock.
        let result = AudioDecoder::open(path)
            .and_then(|decoder| bind_stream_in(&self.state, path, decoder, loops, group));
        if let Err(e) = &result {
            log::error!("Failed to open stream {}: {}", path.display(), e);
        }
        result
    }

    /// [`load_streaming`](Self::load_streaming) with the decoder open running
    /// on a background worker; same exactly-once completion contract as
    /// [`threaded_load_sample`](Self::threaded_load_sample).
    pub fn threaded_load_streaming(
        &self,
        path: &Path,
        loops: bool,
        group: usize,
        on_done: impl FnOnce(AudioResult<StreamHandle>) + Send + 'static,
    ) {
        let state = self.state.clone();
        let completions = self.pipeline.completion_sender();
        let path = path.to_path_buf();
        self.pipeline.submit(Box::new(move || {
            // De-dup check happens at bind time on the owning thread, so a
            // redundant open here just gets dropped.
            let opened = AudioDecoder::open(&path);
            let _ = completions.send(Box::new(move || {
                let result = opened
                    .and_then(|decoder| bind_stream_in(&state, &path, decoder, loops, group));
                if let Err(e) = &result {
                    log::error!("Failed to open stream {}: {}", path.display(), e);
                }
                on_done(result);
            }));
        }));
    }

    /// Start a loaded stream playing from `start_frame`. No-op if the slot
    /// is invalid or already playing. A conversion setup or seek failure is
    /// logged and leaves the slot not playing.
    pub fn play_streaming(
        &self,
        handle: StreamHandle,
        volume: f32,
        pan: f32,
        start_frame: u64,
    ) {
        let mut state = self.state.lock().unwrap();
        let Some(sound) = state.streams.get_mut(handle) else {
            return;
        };
        if sound.playing {
            return;
        }
        let converter = match StreamConverter::new(sound.channels, sound.decoder.sample_rate()) {
            Ok(converter) => converter,
            Err(e) => {
                log::error!("Failed to set up stream conversion: {}", e);
                return;
            }
        };
        if let Err(e) = sound.decoder.seek_to_frame(start_frame) {
            log::error!("Failed to seek stream to frame {}: {}", start_frame, e);
            return;
        }
        sound.converter = Some(converter);
        sound.volume = volume;
        sound.pan = pan;
        sound.read_done = false;
        sound.playing = true;
    }

    /// Stop a stream, releasing its conversion buffers. The decoder stays
    /// open for replay. No-op on an invalid slot.
    pub fn stop_streaming(&self, handle: StreamHandle) {
        let mut state = self.state.lock().unwrap();
        if let Some(sound) = state.streams.get_mut(handle) {
            sound.playing = false;
            sound.converter = None;
        }
    }

    /// Stop every stream except `keep` (all of them when `keep` is None).
    pub fn stop_streaming_all_but(&self, keep: Option<StreamHandle>) {
        let mut state = self.state.lock().unwrap();
        for index in 0..state.streams.slot_count() {
            if keep.map(|h| h.index() == index).unwrap_or(false) {
                continue;
            }
            if let Some(sound) = state.streams.sound_at_mut(index) {
                sound.playing = false;
                sound.converter = None;
            }
        }
    }

    pub fn is_stream_playing(&self, handle: StreamHandle) -> bool {
        self.state
            .lock()
            .unwrap()
            .streams
            .get_mut(handle)
            .map(|s| s.playing)
            .unwrap_or(false)
    }

    pub fn change_stream_volume(&self, handle: StreamHandle, volume: f32) {
        if let Some(sound) = self.state.lock().unwrap().streams.get_mut(handle) {
            sound.volume = volume;
        }
    }

    pub fn change_stream_pan(&self, handle: StreamHandle, pan: f32) {
        if let Some(sound) = self.state.lock().unwrap().streams.get_mut(handle) {
            sound.pan = pan;
        }
    }

    /// Set the frame a looping stream seeks back to at end of file.
    pub fn change_stream_loop_point(&self, handle: StreamHandle, frame: u64) {
        if let Some(sound) = self.state.lock().unwrap().streams.get_mut(handle) {
            sound.loop_point = frame;
        }
    }

    /// Drop one reference to a stream slot. When the last reference goes,
    /// playback stops and the decoder closes.
    pub fn unload_stream(&self, handle: StreamHandle) {
        self.state.lock().unwrap().streams.release(handle);
    }
}

/// Bind converted sample data into the store under the mixer lock. This is
/// the owner-thread phase shared by the sync and threaded load paths.
fn bind_sample_in(
    state: &Arc<Mutex<MixerState>>,
    data: Vec<Sample>,
    channels: usize,
    loops: bool,
) -> AudioResult<SampleHandle> {
    state
        .lock()
        .unwrap()
        .samples
        .insert(SampleData {
            channels,
            loops,
            data,
        })
        .ok_or(AudioError::SampleTableFull {
            capacity: crate::types::MAX_SAMPLES,
        })
}

fn bind_stream_in(
    state: &Arc<Mutex<MixerState>>,
    path: &Path,
    decoder: AudioDecoder,
    loops: bool,
    group: usize,
) -> AudioResult<StreamHandle> {
    let mut state = state.lock().unwrap();
    if group >= state.groups.len() {
        return Err(AudioError::InvalidGroup {
            group,
            num_groups: state.groups.len(),
        });
    }
    let handle = state.streams.bind(path, decoder)?;
    if let Some(sound) = state.streams.get_mut(handle) {
        // Loop/group settings only apply to a freshly claimed slot; a
        // de-duplicated load keeps the original occupant's settings.
        if sound.times_loaded == 1 {
            sound.loops = loops;
            sound.group = group;
        }
    }
    Ok(handle)
}
