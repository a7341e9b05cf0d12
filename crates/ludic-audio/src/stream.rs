//! Streaming slot table
//!
//! Long sounds (music, ambience) are decoded incrementally from disk instead
//! of being held in memory. The table has a fixed number of slots, keyed by
//! path: loading the same file twice shares one slot with a reference count,
//! and the slot closes only when every load has been matched by an unload.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::convert::StreamConverter;
use crate::decoder::AudioDecoder;
use crate::error::{AudioError, AudioResult};
use crate::types::MAX_STREAMING_SOUNDS;

/// Handle to a streaming slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(pub(crate) usize);

impl StreamHandle {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// A streaming sound bound to a slot.
pub(crate) struct StreamingSound {
    pub decoder: AudioDecoder,
    /// Source channel count capped at stereo; decoded chunks with more
    /// channels are remixed down before conversion.
    pub channels: usize,
    /// Present only while the stream is playing.
    pub converter: Option<StreamConverter>,
    pub playing: bool,
    pub volume: f32,
    pub pan: f32,
    pub loops: bool,
    /// Frame to seek back to when a looping stream reaches the end.
    pub loop_point: u64,
    pub group: usize,
    /// Set when the decoder is exhausted and the converter has been flushed;
    /// the stream ends once the converter runs dry.
    pub read_done: bool,
    /// Reference count for path de-duplication.
    pub times_loaded: u32,
}

impl StreamingSound {
    fn new(decoder: AudioDecoder) -> Self {
        let channels = decoder.channels().min(2);
        Self {
            decoder,
            channels,
            converter: None,
            playing: false,
            volume: 1.0,
            pan: 0.0,
            loops: false,
            loop_point: 0,
            group: 0,
            read_done: false,
            times_loaded: 1,
        }
    }
}

/// Fixed table of streaming slots with path-keyed de-duplication.
pub(crate) struct StreamTable {
    slots: Vec<Option<StreamingSound>>,
    by_path: HashMap<PathBuf, usize>,
}

impl StreamTable {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_STREAMING_SOUNDS);
        slots.resize_with(MAX_STREAMING_SOUNDS, || None);
        Self {
            slots,
            by_path: HashMap::new(),
        }
    }

    /// If `path` is already open, bump its reference count and return the
    /// existing handle.
    pub fn acquire_existing(&mut self, path: &Path) -> Option<StreamHandle> {
        let &index = self.by_path.get(path)?;
        if let Some(sound) = self.slots[index].as_mut() {
            sound.times_loaded += 1;
        }
        Some(StreamHandle(index))
    }

    /// Bind an opened decoder to a free slot.
    ///
    /// Re-checks the path map first: a threaded load may race another load of
    /// the same file, and the slot must still be shared.
    pub fn bind(&mut self, path: &Path, decoder: AudioDecoder) -> AudioResult<StreamHandle> {
        if let Some(handle) = self.acquire_existing(path) {
            return Ok(handle);
        }
        let index = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(AudioError::StreamTableFull {
                capacity: MAX_STREAMING_SOUNDS,
            })?;
        self.slots[index] = Some(StreamingSound::new(decoder));
        self.by_path.insert(path.to_path_buf(), index);
        Ok(StreamHandle(index))
    }

    pub fn get_mut(&mut self, handle: StreamHandle) -> Option<&mut StreamingSound> {
        self.slots.get_mut(handle.0).and_then(|s| s.as_mut())
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn sound_at_mut(&mut self, index: usize) -> Option<&mut StreamingSound> {
        self.slots[index].as_mut()
    }

    /// Drop one reference to the slot; closes it when the count hits zero.
    /// Returns true if the slot was actually closed. No-op on a free slot.
    pub fn release(&mut self, handle: StreamHandle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.0) else {
            return false;
        };
        let Some(sound) = slot.as_mut() else {
            return false;
        };
        sound.times_loaded = sound.times_loaded.saturating_sub(1);
        if sound.times_loaded > 0 {
            return false;
        }
        *slot = None;
        self.by_path.retain(|_, &mut index| index != handle.0);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A short silent mono WAV at the engine rate.
    fn write_fixture(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..64 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn test_same_path_shares_a_slot() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), "music.wav");
        let mut table = StreamTable::new();

        let a = table
            .bind(&path, AudioDecoder::open(&path).unwrap())
            .unwrap();
        let b = table.acquire_existing(&path).unwrap();
        assert_eq!(a, b);
        assert_eq!(table.get_mut(a).unwrap().times_loaded, 2);

        // First release only drops the count.
        assert!(!table.release(a));
        assert!(table.get_mut(a).is_some());
        // Second release closes the slot.
        assert!(table.release(b));
        assert!(table.get_mut(a).is_none());
        assert!(table.acquire_existing(&path).is_none());
    }

    #[test]
    fn test_release_free_slot_is_noop() {
        let mut table = StreamTable::new();
        assert!(!table.release(StreamHandle(3)));
    }

    #[test]
    fn test_table_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = StreamTable::new();
        for i in 0..MAX_STREAMING_SOUNDS {
            let path = write_fixture(dir.path(), &format!("s{i}.wav"));
            table
                .bind(&path, AudioDecoder::open(&path).unwrap())
                .unwrap();
        }
        let extra = write_fixture(dir.path(), "extra.wav");
        let err = table
            .bind(&extra, AudioDecoder::open(&extra).unwrap())
            .unwrap_err();
        assert!(matches!(err, AudioError::StreamTableFull { .. }));
    }
}
