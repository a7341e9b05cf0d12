//! Real-time audio mixing core for the Ludic 2D game engine
//!
//! A fixed-capacity mixer that blends one-shot sounds (fully decoded
//! samples) and streaming sounds (decoded from disk during playback) into
//! interleaved stereo on every device callback, with background loading that
//! never blocks the mixing thread.
//!
//! The shared state sits behind a single mutex: the cpal callback locks it
//! for the duration of each mix pass, and every public mutation locks the
//! same mutex, so the callback always sees whole updates. Decoding for loads
//! happens on worker threads with no lock held; results are bound into the
//! tables on the owning thread via [`Mixer::process_completions`].
//!
//! ```no_run
//! use ludic_audio::Mixer;
//!
//! # fn main() -> ludic_audio::AudioResult<()> {
//! let mixer = Mixer::init(2)?;
//! let beep = mixer.load_sample("assets/beep.ogg".as_ref(), 1, false)?;
//! mixer.play(beep, 1.0, 1.0, 0.0, 0);
//! # Ok(())
//! # }
//! ```

mod backend;
mod config;
mod convert;
mod decoder;
mod error;
mod loader;
mod mixer;
mod playback;
mod sample;
mod stream;
pub mod tuning;
pub mod types;

pub use config::{BufferSize, MixerConfig};
pub use error::{AudioError, AudioResult};
pub use mixer::{db_to_volume, volume_to_db, Mixer};
pub use playback::PlaybackId;
pub use sample::SampleHandle;
pub use stream::StreamHandle;
