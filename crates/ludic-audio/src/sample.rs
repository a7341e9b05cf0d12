//! Sample store
//!
//! A fixed-capacity table of fully decoded clips, already converted to the
//! engine rate. Handles are plain slot indices; slot reuse after an unload is
//! guarded at the playback layer, which stops every voice bound to the slot
//! before the data is dropped.

use crate::types::{Sample, MAX_SAMPLES};

/// Handle to a loaded sample in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleHandle(pub(crate) usize);

/// A fully decoded clip at the engine rate.
pub(crate) struct SampleData {
    /// 1 or 2; decides the pan/pitch rules at mix time.
    pub channels: usize,
    pub loops: bool,
    /// Interleaved samples.
    pub data: Vec<Sample>,
}

/// Fixed table of decoded clips.
pub(crate) struct SampleStore {
    slots: Vec<Option<SampleData>>,
}

impl SampleStore {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_SAMPLES);
        slots.resize_with(MAX_SAMPLES, || None);
        Self { slots }
    }

    /// Bind decoded data to the first free slot.
    pub fn insert(&mut self, data: SampleData) -> Option<SampleHandle> {
        let index = self.slots.iter().position(|s| s.is_none())?;
        self.slots[index] = Some(data);
        Some(SampleHandle(index))
    }

    pub fn get(&self, handle: SampleHandle) -> Option<&SampleData> {
        self.slots.get(handle.0).and_then(|s| s.as_ref())
    }

    /// Free a slot; no-op if the handle is already free or out of range.
    pub fn remove(&mut self, handle: SampleHandle) -> Option<SampleData> {
        self.slots.get_mut(handle.0).and_then(|s| s.take())
    }
}
