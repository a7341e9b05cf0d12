//! Musical tuning helpers
//!
//! Maps named notes to frequencies for a chosen temperament, and from there
//! to pitch multipliers for [`Mixer::play`](crate::Mixer::play). A pitch of
//! `hertz(target) / hertz(reference)` plays a clip recorded at the reference
//! note so it sounds at the target note.

const NUM_NOTES: usize = 12;
const MIN_OCTAVE: i8 = 0;
const MAX_OCTAVE: i8 = 8;
const FULL_OCTAVE_CENTS: f64 = 1200.0;

const EQUAL_TEMPERAMENT: [f64; NUM_NOTES] = [
    0.0, 100.0, 200.0, 300.0, 400.0, 500.0, 600.0, 700.0, 800.0, 900.0, 1000.0, 1100.0,
];
const PYTHAGOREAN_TUNING: [f64; NUM_NOTES] = [
    0.0, 90.225, 203.910, 294.135, 407.820, 588.270, 611.730, 701.955, 792.180, 905.865,
    996.090, 1109.775,
];

/// A note within an octave, sharps written out (C sharp = `Cs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OctaveNote {
    C,
    Cs,
    D,
    Ds,
    E,
    F,
    Fs,
    G,
    Gs,
    A,
    As,
    B,
}

impl OctaveNote {
    fn index(self) -> usize {
        self as usize
    }
}

/// A note with its octave, e.g. A4 is `Note::new(4, OctaveNote::A)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Note {
    pub octave: i8,
    pub note: OctaveNote,
}

impl Note {
    pub fn new(octave: i8, note: OctaveNote) -> Self {
        Self { octave, note }
    }
}

/// Interval systems a [`Tuning`] can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TuningIntervals {
    #[default]
    EqualTemperament,
    Pythagorean,
}

impl TuningIntervals {
    fn cents(self) -> &'static [f64; NUM_NOTES] {
        match self {
            TuningIntervals::EqualTemperament => &EQUAL_TEMPERAMENT,
            TuningIntervals::Pythagorean => &PYTHAGOREAN_TUNING,
        }
    }
}

/// Precomputed note frequencies for octaves 0 through 8.
pub struct Tuning {
    freqs: [f64; (MAX_OCTAVE as usize + 1) * NUM_NOTES],
}

impl Default for Tuning {
    /// Standard concert tuning: A4 = 440 Hz, equal temperament.
    fn default() -> Self {
        Self::new(440.0, TuningIntervals::EqualTemperament)
    }
}

impl Tuning {
    /// Build a tuning from an A4 reference frequency and interval system.
    pub fn new(a4_hertz: f64, intervals: TuningIntervals) -> Self {
        let cents = intervals.cents();
        let mut freqs = [0.0; (MAX_OCTAVE as usize + 1) * NUM_NOTES];
        for octave in MIN_OCTAVE..=MAX_OCTAVE {
            for note_index in 0..NUM_NOTES {
                // The table is laid out from C, but the reference tone is A,
                // so each note's offset is relative to A in the same octave.
                let mut note_cents = (octave as f64 - 4.0) * FULL_OCTAVE_CENTS;
                note_cents += cents[note_index] - cents[OctaveNote::A.index()];
                let index = octave as usize * NUM_NOTES + note_index;
                freqs[index] = a4_hertz * 2.0_f64.powf(note_cents / FULL_OCTAVE_CENTS);
            }
        }
        Self { freqs }
    }

    /// Frequency of a note in hertz; None outside octaves 0..=8.
    pub fn note_hertz(&self, note: Note) -> Option<f64> {
        if note.octave < MIN_OCTAVE || note.octave > MAX_OCTAVE {
            return None;
        }
        Some(self.freqs[note.octave as usize * NUM_NOTES + note.note.index()])
    }

    /// Pitch multiplier that makes a clip recorded at `reference` sound at
    /// `note`. Feed the result to `play`'s pitch parameter. None when either
    /// note is out of range.
    pub fn pitch_adjustment(&self, reference: Note, note: Note) -> Option<f32> {
        let reference_hertz = self.note_hertz(reference)?;
        let hertz = self.note_hertz(note)?;
        Some((hertz / reference_hertz) as f32)
    }

    /// Pitch multiplier relative to an explicit reference frequency, for
    /// clips whose recorded pitch is known but unnamed.
    pub fn hertz_pitch_adjustment(&self, reference_hertz: f64, note: Note) -> Option<f32> {
        let hertz = self.note_hertz(note)?;
        Some((hertz / reference_hertz) as f32)
    }
}
