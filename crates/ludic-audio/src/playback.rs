//! Playback registry
//!
//! A fixed arena of voice slots with generation-counted ids. Releasing a slot
//! bumps its generation, so an id held after its sound finished can never
//! mutate whatever sound reuses the slot later. All id-based mutations are
//! silent no-ops when the id is stale.

use crate::sample::SampleHandle;
use crate::types::MAX_PLAYING_SOUNDS;

/// Id of a playing sound. Stays valid until the sound ends or is stopped;
/// after that every operation on it is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackId {
    index: u16,
    generation: u32,
}

/// A sound currently being mixed.
pub(crate) struct Voice {
    pub sample: SampleHandle,
    pub volume: f32,
    pub pitch: f32,
    pub pan: f32,
    /// Position in the clip's interleaved data. Fractional for mono pitch
    /// stepping; truncated on read.
    pub cursor: f32,
    pub group: usize,
}

struct Slot {
    generation: u32,
    voice: Option<Voice>,
}

/// Fixed arena of voice slots.
pub(crate) struct PlaybackRegistry {
    slots: Vec<Slot>,
}

impl PlaybackRegistry {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_PLAYING_SOUNDS);
        slots.resize_with(MAX_PLAYING_SOUNDS, || Slot {
            generation: 0,
            voice: None,
        });
        Self { slots }
    }

    /// Claim a free slot for `voice`. Returns None when all slots are busy.
    pub fn claim(&mut self, voice: Voice) -> Option<PlaybackId> {
        let index = self.slots.iter().position(|s| s.voice.is_none())?;
        let slot = &mut self.slots[index];
        slot.voice = Some(voice);
        Some(PlaybackId {
            index: index as u16,
            generation: slot.generation,
        })
    }

    /// The voice behind `id`, if the id is still live.
    pub fn get_mut(&mut self, id: PlaybackId) -> Option<&mut Voice> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.voice.as_mut()
    }

    pub fn is_live(&self, id: PlaybackId) -> bool {
        self.slots
            .get(id.index as usize)
            .map(|s| s.generation == id.generation && s.voice.is_some())
            .unwrap_or(false)
    }

    /// Release the slot behind `id`. No-op when the id is stale.
    pub fn release(&mut self, id: PlaybackId) {
        if self.is_live(id) {
            self.release_index(id.index as usize);
        }
    }

    /// Release a slot by index, bumping the generation. Used by the mix loop
    /// when a voice reaches the end of its clip.
    pub fn release_index(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        if slot.voice.take().is_some() {
            slot.generation = slot.generation.wrapping_add(1);
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// The voice in `index`, live or not this generation. The mix loop walks
    /// slots by index so it can release the one it is visiting.
    pub fn voice_at_mut(&mut self, index: usize) -> Option<&mut Voice> {
        self.slots[index].voice.as_mut()
    }

    /// Indices of live voices bound to `sample` (for the unload cascade).
    pub fn indices_using(&self, sample: SampleHandle) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.voice.as_ref().map(|v| v.sample == sample).unwrap_or(false))
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice() -> Voice {
        Voice {
            sample: SampleHandle(0),
            volume: 1.0,
            pitch: 1.0,
            pan: 0.0,
            cursor: 0.0,
            group: 0,
        }
    }

    #[test]
    fn test_capacity_exhaustion() {
        let mut reg = PlaybackRegistry::new();
        for _ in 0..MAX_PLAYING_SOUNDS {
            assert!(reg.claim(voice()).is_some());
        }
        assert!(reg.claim(voice()).is_none());
    }

    #[test]
    fn test_stale_id_cannot_touch_reused_slot() {
        let mut reg = PlaybackRegistry::new();
        let first = reg.claim(voice()).unwrap();
        reg.release(first);

        // The slot is reused for a different sound.
        let second = reg.claim(Voice {
            volume: 0.25,
            ..voice()
        })
        .unwrap();

        assert!(!reg.is_live(first));
        assert!(reg.get_mut(first).is_none());
        // The new occupant is untouched.
        assert_eq!(reg.get_mut(second).unwrap().volume, 0.25);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut reg = PlaybackRegistry::new();
        let id = reg.claim(voice()).unwrap();
        reg.release(id);
        reg.release(id);
        assert!(!reg.is_live(id));
        // A double release must not invalidate the next occupant's id.
        let next = reg.claim(voice()).unwrap();
        assert!(reg.is_live(next));
    }

    #[test]
    fn test_indices_using_sample() {
        let mut reg = PlaybackRegistry::new();
        let a = SampleHandle(3);
        let b = SampleHandle(7);
        reg.claim(Voice { sample: a, ..voice() }).unwrap();
        reg.claim(Voice { sample: b, ..voice() }).unwrap();
        reg.claim(Voice { sample: a, ..voice() }).unwrap();
        assert_eq!(reg.indices_using(a), vec![0, 2]);
        assert_eq!(reg.indices_using(b), vec![1]);
    }
}
