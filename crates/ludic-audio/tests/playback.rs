//! End-to-end playback tests against generated WAV fixtures.
//!
//! All tests drive a device-less mixer with `render`, so they run headless.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use ludic_audio::Mixer;

const ENGINE_RATE: u32 = 44_100;
const CALLBACK_FRAMES: usize = 512;

/// Write a mono 16-bit WAV of a quiet sine at the given rate.
fn write_sine_fixture(dir: &Path, name: &str, rate: u32, frames: usize) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..frames {
        let t = i as f32 / rate as f32;
        let value = (t * 440.0 * std::f32::consts::TAU).sin() * 0.4;
        writer.write_sample((value * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
    path
}

/// Write a mono WAV whose first half is silence and second half a tone.
fn write_gated_sine_fixture(
    dir: &Path,
    name: &str,
    rate: u32,
    silent_frames: usize,
    tone_frames: usize,
) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for _ in 0..silent_frames {
        writer.write_sample(0i16).unwrap();
    }
    for i in 0..tone_frames {
        let t = i as f32 / rate as f32;
        let value = (t * 440.0 * std::f32::consts::TAU).sin() * 0.4;
        writer.write_sample((value * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
    path
}

/// Render callbacks until `id` dies, returning how many frames were mixed.
fn frames_until_voice_dies(mixer: &Mixer, id: ludic_audio::PlaybackId, limit: usize) -> usize {
    let mut out = vec![0.0f32; CALLBACK_FRAMES * 2];
    let mut frames = 0;
    while mixer.is_playing(id) {
        assert!(frames < limit, "voice never finished");
        mixer.render(&mut out);
        frames += CALLBACK_FRAMES;
    }
    frames
}

#[test]
fn sample_plays_to_natural_end() {
    let dir = tempfile::tempdir().unwrap();
    let clip_frames = 4096;
    let path = write_sine_fixture(dir.path(), "beep.wav", ENGINE_RATE, clip_frames);

    let mixer = Mixer::new(1);
    let handle = mixer.load_sample(&path, 1, false).unwrap();
    let id = mixer.play(handle, 1.0, 1.0, 0.0, 0).unwrap();

    // First callback carries signal.
    let mut out = vec![0.0f32; CALLBACK_FRAMES * 2];
    mixer.render(&mut out);
    let peak = out.iter().fold(0.0f32, |a, &x| a.max(x.abs()));
    assert!(peak > 0.1, "expected audible output, peak {peak}");

    // The voice dies after roughly the clip's duration.
    let frames = CALLBACK_FRAMES + frames_until_voice_dies(&mixer, id, clip_frames * 2);
    assert!(
        frames >= clip_frames && frames < clip_frames + CALLBACK_FRAMES * 2,
        "voice lived {frames} frames for a {clip_frames} frame clip"
    );

    // Once dead the mixer renders silence.
    mixer.render(&mut out);
    assert!(out.iter().all(|&x| x == 0.0));
}

#[test]
fn low_rate_source_is_resampled_to_engine_rate() {
    let dir = tempfile::tempdir().unwrap();
    let src_frames = 8192;
    let path = write_sine_fixture(dir.path(), "low.wav", ENGINE_RATE / 2, src_frames);

    let mixer = Mixer::new(1);
    let handle = mixer.load_sample(&path, 1, false).unwrap();
    let id = mixer.play(handle, 1.0, 1.0, 0.0, 0).unwrap();

    // A half-rate source should last about twice its frame count.
    let expected = src_frames * 2;
    let frames = frames_until_voice_dies(&mixer, id, expected * 2);
    assert!(
        frames > expected * 9 / 10 && frames < expected * 11 / 10 + CALLBACK_FRAMES,
        "voice lived {frames} frames, expected ~{expected}"
    );
}

#[test]
fn threaded_load_completes_on_owning_thread() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sine_fixture(dir.path(), "async.wav", ENGINE_RATE, 1024);

    let mixer = Mixer::new(1);
    let (tx, rx) = mpsc::channel();
    mixer.threaded_load_sample(&path, 1, false, move |result| {
        tx.send(result).unwrap();
    });

    // The callback only fires from process_completions on this thread.
    let deadline = Instant::now() + Duration::from_secs(10);
    let handle = loop {
        mixer.process_completions();
        match rx.try_recv() {
            Ok(result) => break result.unwrap(),
            Err(mpsc::TryRecvError::Empty) => {
                assert!(Instant::now() < deadline, "load never completed");
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(e) => panic!("completion channel broke: {e}"),
        }
    };

    assert!(mixer.play(handle, 1.0, 1.0, 0.0, 0).is_some());
}

#[test]
fn threaded_load_reports_failure_through_callback() {
    let mixer = Mixer::new(1);
    let (tx, rx) = mpsc::channel();
    mixer.threaded_load_sample(
        Path::new("does/not/exist.wav"),
        1,
        false,
        move |result| {
            tx.send(result.is_err()).unwrap();
        },
    );

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        mixer.process_completions();
        match rx.try_recv() {
            Ok(failed) => {
                assert!(failed);
                break;
            }
            Err(mpsc::TryRecvError::Empty) => {
                assert!(Instant::now() < deadline, "completion never fired");
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(e) => panic!("completion channel broke: {e}"),
        }
    }
}

#[test]
fn stream_plays_and_ends() {
    let dir = tempfile::tempdir().unwrap();
    let clip_frames = 8192;
    let path = write_sine_fixture(dir.path(), "music.wav", ENGINE_RATE, clip_frames);

    let mixer = Mixer::new(1);
    let handle = mixer.load_streaming(&path, false, 0).unwrap();
    assert!(!mixer.is_stream_playing(handle));

    mixer.play_streaming(handle, 1.0, 0.0, 0);
    assert!(mixer.is_stream_playing(handle));

    let mut out = vec![0.0f32; CALLBACK_FRAMES * 2];
    mixer.render(&mut out);
    let peak = out.iter().fold(0.0f32, |a, &x| a.max(x.abs()));
    assert!(peak > 0.1, "expected audible stream output, peak {peak}");

    // Drains and stops on its own shortly after the clip's duration.
    let mut rendered = CALLBACK_FRAMES;
    while mixer.is_stream_playing(handle) {
        assert!(rendered < clip_frames * 3, "stream never ended");
        mixer.render(&mut out);
        rendered += CALLBACK_FRAMES;
    }

    mixer.unload_stream(handle);
}

#[test]
fn stream_loads_are_deduplicated_by_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sine_fixture(dir.path(), "shared.wav", ENGINE_RATE, 2048);

    let mixer = Mixer::new(1);
    let first = mixer.load_streaming(&path, false, 0).unwrap();
    let second = mixer.load_streaming(&path, false, 0).unwrap();
    assert_eq!(first, second);

    mixer.play_streaming(first, 1.0, 0.0, 0);
    assert!(mixer.is_stream_playing(second));

    // The slot survives the first unload and closes on the second.
    mixer.unload_stream(first);
    assert!(mixer.is_stream_playing(second));
    mixer.unload_stream(second);
    assert!(!mixer.is_stream_playing(second));

    // A fresh load reopens the file rather than reusing a stale count.
    let again = mixer.load_streaming(&path, false, 0).unwrap();
    mixer.unload_stream(again);
}

#[test]
fn stop_streaming_keeps_stream_loaded_for_replay() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sine_fixture(dir.path(), "replay.wav", ENGINE_RATE, 4096);

    let mixer = Mixer::new(1);
    let handle = mixer.load_streaming(&path, false, 0).unwrap();

    mixer.play_streaming(handle, 1.0, 0.0, 0);
    let mut out = vec![0.0f32; CALLBACK_FRAMES * 2];
    mixer.render(&mut out);

    mixer.stop_streaming(handle);
    assert!(!mixer.is_stream_playing(handle));

    // Replay from the start still works after a stop.
    mixer.play_streaming(handle, 1.0, 0.0, 0);
    assert!(mixer.is_stream_playing(handle));
    mixer.render(&mut out);
    let peak = out.iter().fold(0.0f32, |a, &x| a.max(x.abs()));
    assert!(peak > 0.1);

    mixer.unload_stream(handle);
}

#[test]
fn stop_streaming_all_but_spares_the_kept_stream() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_sine_fixture(dir.path(), "a.wav", ENGINE_RATE, 4096);
    let b = write_sine_fixture(dir.path(), "b.wav", ENGINE_RATE, 4096);

    let mixer = Mixer::new(1);
    let ha = mixer.load_streaming(&a, false, 0).unwrap();
    let hb = mixer.load_streaming(&b, false, 0).unwrap();
    mixer.play_streaming(ha, 1.0, 0.0, 0);
    mixer.play_streaming(hb, 1.0, 0.0, 0);

    mixer.stop_streaming_all_but(Some(ha));
    assert!(mixer.is_stream_playing(ha));
    assert!(!mixer.is_stream_playing(hb));

    mixer.stop_streaming_all_but(None);
    assert!(!mixer.is_stream_playing(ha));

    mixer.unload_stream(ha);
    mixer.unload_stream(hb);
}

#[test]
fn stream_load_rejects_out_of_range_group() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sine_fixture(dir.path(), "grouped.wav", ENGINE_RATE, 2048);

    let mixer = Mixer::new(1);
    assert!(mixer.load_streaming(&path, false, 7).is_err());

    // A valid group still loads, plays, and mixes.
    let handle = mixer.load_streaming(&path, false, 0).unwrap();
    mixer.play_streaming(handle, 1.0, 0.0, 0);
    let mut out = vec![0.0f32; CALLBACK_FRAMES * 2];
    mixer.render(&mut out);
    let peak = out.iter().fold(0.0f32, |a, &x| a.max(x.abs()));
    assert!(peak > 0.1, "expected audible stream output, peak {peak}");

    mixer.unload_stream(handle);
}

#[test]
fn threaded_stream_load_rejects_out_of_range_group() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sine_fixture(dir.path(), "grouped_async.wav", ENGINE_RATE, 2048);

    let mixer = Mixer::new(1);
    let (tx, rx) = mpsc::channel();
    mixer.threaded_load_streaming(&path, false, 7, move |result| {
        tx.send(result.is_err()).unwrap();
    });

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        mixer.process_completions();
        match rx.try_recv() {
            Ok(failed) => {
                assert!(failed);
                break;
            }
            Err(mpsc::TryRecvError::Empty) => {
                assert!(Instant::now() < deadline, "completion never fired");
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(e) => panic!("completion channel broke: {e}"),
        }
    }
}

#[test]
fn looping_stream_resumes_from_its_loop_point() {
    let dir = tempfile::tempdir().unwrap();
    let half = 4096;
    let path = write_gated_sine_fixture(dir.path(), "gated.wav", ENGINE_RATE, half, half);

    let mixer = Mixer::new(1);
    let handle = mixer.load_streaming(&path, true, 0).unwrap();
    // Loop back into the tone half, skipping the leading silence.
    mixer.change_stream_loop_point(handle, half as u64);
    mixer.play_streaming(handle, 1.0, 0.0, 0);

    // Get past the first pass (and its silent lead-in) plus one wrap.
    let mut out = vec![0.0f32; CALLBACK_FRAMES * 2];
    let warmup = (half * 3) / CALLBACK_FRAMES;
    for _ in 0..warmup {
        mixer.render(&mut out);
    }
    assert!(mixer.is_stream_playing(handle));

    // From here on every wrap lands in the tone, so no window of a full
    // clip length ever goes quiet. A loop point of zero would replay the
    // silent half and fail this.
    let window = (half * 2) / CALLBACK_FRAMES;
    for i in 0..window {
        mixer.render(&mut out);
        let peak = out.iter().fold(0.0f32, |a, &x| a.max(x.abs()));
        assert!(peak > 0.1, "callback {i} went silent, peak {peak}");
    }

    mixer.unload_stream(handle);
}

#[test]
fn looping_stream_keeps_playing_past_its_length() {
    let dir = tempfile::tempdir().unwrap();
    let clip_frames = 4096;
    let path = write_sine_fixture(dir.path(), "loop.wav", ENGINE_RATE, clip_frames);

    let mixer = Mixer::new(1);
    let handle = mixer.load_streaming(&path, true, 0).unwrap();
    mixer.play_streaming(handle, 1.0, 0.0, 0);

    // Render well past the clip's length; a looping stream never ends.
    let mut out = vec![0.0f32; CALLBACK_FRAMES * 2];
    let passes = (clip_frames * 3) / CALLBACK_FRAMES;
    for _ in 0..passes {
        mixer.render(&mut out);
    }
    assert!(mixer.is_stream_playing(handle));
    let peak = out.iter().fold(0.0f32, |a, &x| a.max(x.abs()));
    assert!(peak > 0.1, "looping stream went silent, peak {peak}");

    mixer.unload_stream(handle);
}
