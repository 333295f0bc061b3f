//! End-to-end playback through the public engine API

use approx::assert_relative_eq;
use parking_lot::Mutex;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wav_mixer::{
    shared, Accumulation, EngineConfig, MemorySink, MixEngine, MixerError, SharedStream,
    SourceFormat, TrackEvent,
};

type EventLog = Arc<Mutex<Vec<(usize, TrackEvent)>>>;

fn pcm(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

fn raw(samples: &[i16]) -> SharedStream {
    shared(Cursor::new(pcm(samples)))
}

fn wav(samples: &[i16], trailing: &[u8]) -> Vec<u8> {
    let data = pcm(samples);
    let mut body = Vec::new();
    body.extend_from_slice(b"WAVE");
    body.extend_from_slice(b"fmt ");
    body.extend_from_slice(&16u32.to_le_bytes());
    body.extend_from_slice(&1u16.to_le_bytes());
    body.extend_from_slice(&1u16.to_le_bytes());
    body.extend_from_slice(&32_000u32.to_le_bytes());
    body.extend_from_slice(&64_000u32.to_le_bytes());
    body.extend_from_slice(&2u16.to_le_bytes());
    body.extend_from_slice(&16u16.to_le_bytes());
    body.extend_from_slice(b"data");
    body.extend_from_slice(&(data.len() as u32).to_le_bytes());
    body.extend_from_slice(&data);
    body.extend_from_slice(trailing);

    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

fn engine(block_size: usize, fade_step: f32) -> MixEngine<MemorySink> {
    let config = EngineConfig::default()
        .with_block_size(block_size)
        .with_fade_step(fade_step);
    let mut engine = MixEngine::new(config, MemorySink::new()).unwrap();
    engine.start().unwrap();
    engine
}

fn record_events(engine: &mut MixEngine<MemorySink>) -> EventLog {
    let log: EventLog = Arc::default();
    let seen = Arc::clone(&log);
    engine.on_event(move |_, track, event| seen.lock().push((track, event)));
    log
}

/// Hands out at most `chunk` bytes per read
struct Trickle {
    inner: Cursor<Vec<u8>>,
    chunk: usize,
}

impl Read for Trickle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.chunk);
        Read::read(&mut self.inner, &mut buf[..n])
    }
}

impl Seek for Trickle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Seek::seek(&mut self.inner, pos)
    }
}

#[test]
fn test_fade_in_ramp_block_of_four() {
    let mut engine = engine(4, 0.25);
    assert!(engine.play(0, raw(&[100; 8]), SourceFormat::Raw));

    for _ in 0..3 {
        engine.tick();
    }
    assert_eq!(engine.sink().blocks(), &[vec![0; 4], vec![25; 4]]);
    assert!(!engine.is_playing(0));
}

#[test]
fn test_fade_in_reaches_steady_state() {
    let mut engine = engine(4, 0.25);
    engine.play(0, raw(&[100; 24]), SourceFormat::Raw);
    for _ in 0..6 {
        engine.tick();
    }
    let firsts: Vec<i16> = engine.sink().blocks().iter().map(|b| b[0]).collect();
    assert_eq!(firsts, vec![0, 25, 50, 75, 100, 100]);
    assert!(engine.sink().blocks().iter().all(|b| b.iter().all(|&s| s == b[0])));
}

#[test]
fn test_fade_is_monotonic_and_bounded() {
    let mut engine = engine(16, 0.1);
    engine.set_volume(0, 0.7);
    engine.play(0, raw(&[1000; 16 * 20]), SourceFormat::Raw);

    let bound = engine.config().fade_in_cycles(0.7) + 1;
    let mut previous = engine.fade_volume(0);
    let mut reached = None;
    for cycle in 1..=20 {
        engine.tick();
        let fade = engine.fade_volume(0);
        assert!(fade >= previous);
        assert!(fade <= engine.volume(0));
        if reached.is_none() && (fade - 0.7).abs() < 1e-6 {
            reached = Some(cycle);
        }
        previous = fade;
    }
    assert!(reached.is_some_and(|cycle| cycle <= bound));
}

#[test]
fn test_mixing_is_additive() {
    let mut engine = engine(4, 1.0);
    engine.set_volume(1, 0.5);
    engine.play(0, raw(&[100, -200, 300, 400, 100, -200, 300, 400]), SourceFormat::Raw);
    engine.play(1, raw(&[11, 21, -31, 41, 11, 21, -31, 41]), SourceFormat::Raw);

    engine.tick();
    engine.tick();
    let blocks = engine.sink().blocks();
    assert_eq!(blocks[0], vec![0; 4]);
    // Sums truncate once: 100 + 5.5, -200 + 10.5, 300 - 15.5, 400 + 20.5
    assert_eq!(blocks[1], vec![105, -189, 284, 420]);
}

#[test]
fn test_overflow_wraps_by_default() {
    let mut engine = engine(2, 1.0);
    engine.play(0, raw(&[30_000; 4]), SourceFormat::Raw);
    engine.play(1, raw(&[10_000; 4]), SourceFormat::Raw);
    engine.tick();
    engine.tick();
    assert_eq!(engine.sink().blocks()[1], vec![-25_536; 2]);
}

#[test]
fn test_saturating_accumulation_clips() {
    let config = EngineConfig::default()
        .with_block_size(2)
        .with_fade_step(1.0)
        .with_accumulation(Accumulation::Saturating);
    let mut engine = MixEngine::new(config, MemorySink::new()).unwrap();
    engine.start().unwrap();
    engine.play(0, raw(&[30_000; 4]), SourceFormat::Raw);
    engine.play(1, raw(&[10_000; 4]), SourceFormat::Raw);
    engine.tick();
    engine.tick();
    assert_eq!(engine.sink().blocks()[1], vec![i16::MAX; 2]);
}

#[test]
fn test_loop_restarts_at_first_sample() {
    let mut engine = engine(4, 1.0);
    let events = record_events(&mut engine);
    engine.play_looped(0, raw(&[1, 2, 3, 4, 5, 6, 7, 8]), SourceFormat::Raw);

    engine.tick();
    let first_position = engine.track(0).unwrap().position();
    engine.tick();
    engine.tick();
    assert_eq!(engine.track(0).unwrap().position(), first_position);
    engine.tick();

    assert!(engine.is_playing(0));
    assert_eq!(engine.stats().loop_restarts, 1);
    assert_eq!(
        engine.sink().blocks(),
        &[vec![0; 4], vec![5, 6, 7, 8], vec![0; 4], vec![5, 6, 7, 8]]
    );
    assert_eq!(*events.lock(), vec![(0, TrackEvent::Started)]);
}

#[test]
fn test_loop_of_wav_skips_header() {
    let mut engine = engine(2, 1.0);
    let bytes = wav(&[7, 8, 9, 10], b"LIST\x04\x00\x00\x00abcd");
    engine.play_looped(0, shared(Cursor::new(bytes)), SourceFormat::Wav);
    for _ in 0..5 {
        engine.tick();
    }
    assert_eq!(
        engine.sink().samples(),
        vec![0, 0, 9, 10, 0, 0, 9, 10, 0, 0]
    );
}

#[test]
fn test_bounded_wav_ignores_trailing_chunks() {
    let mut engine = engine(8, 1.0);
    let bytes = wav(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10], b"LIST\x04\x00\x00\x00abcd");
    engine.play(0, shared(Cursor::new(bytes)), SourceFormat::Wav);
    for _ in 0..3 {
        engine.tick();
    }
    assert_eq!(engine.sink().blocks()[1], vec![9, 10, 0, 0, 0, 0, 0, 0]);
    assert!(!engine.is_playing(0));
    assert_eq!(engine.stats().end_of_stream_stops, 1);
}

#[test]
fn test_canonical_wav_skips_44_bytes() {
    let mut engine = engine(2, 1.0);
    let bytes = wav(&[3, 4, 5, 6], &[]);
    engine.play(0, shared(Cursor::new(bytes)), SourceFormat::CanonicalWav);
    engine.tick();
    engine.tick();
    assert_eq!(engine.sink().blocks()[1], vec![5, 6]);
}

#[test]
fn test_short_reads_mix_valid_samples_only() {
    let mut engine = engine(4, 1.0);
    let stream = shared(Trickle {
        inner: Cursor::new(pcm(&[1, 2, 3, 4, 5, 6])),
        chunk: 5,
    });
    engine.play(0, stream, SourceFormat::Raw);
    for _ in 0..4 {
        engine.tick();
    }
    assert_eq!(
        engine.sink().blocks(),
        &[vec![0; 4], vec![3, 4, 0, 0], vec![5, 6, 0, 0]]
    );
    assert!(!engine.is_playing(0));
}

#[test]
fn test_play_from_stopped_callback() {
    let mut engine = engine(4, 1.0);
    let events: EventLog = Arc::default();
    let seen = Arc::clone(&events);
    let bytes = pcm(&[50; 4]);
    let replays = AtomicUsize::new(0);
    engine.on_event(move |engine, track, event| {
        seen.lock().push((track, event));
        if event == TrackEvent::Stopped && replays.fetch_add(1, Ordering::Relaxed) < 2 {
            assert!(engine.play(track, shared(Cursor::new(bytes.clone())), SourceFormat::Raw));
        }
    });

    engine.play(0, raw(&[50; 4]), SourceFormat::Raw);
    engine.tick();
    engine.tick();
    // Replayed inside the same tick that hit end of stream
    assert!(engine.is_playing(0));
    assert_relative_eq!(engine.fade_volume(0), 0.0);

    for _ in 0..4 {
        engine.tick();
    }
    assert!(!engine.is_playing(0));
    assert_eq!(
        *events.lock(),
        vec![
            (0, TrackEvent::Started),
            (0, TrackEvent::Stopped),
            (0, TrackEvent::Started),
            (0, TrackEvent::Stopped),
            (0, TrackEvent::Started),
            (0, TrackEvent::Stopped),
        ]
    );
    assert_eq!(engine.sink().blocks().len(), 3);
}

#[test]
fn test_stop_is_idempotent() {
    let mut engine = engine(4, 0.1);
    let events = record_events(&mut engine);

    engine.stop(2);
    assert!(events.lock().is_empty());

    engine.play(2, raw(&[1; 8]), SourceFormat::Raw);
    engine.stop(2);
    engine.stop(2);
    assert!(!engine.is_playing(2));
    assert_eq!(
        *events.lock(),
        vec![(2, TrackEvent::Started), (2, TrackEvent::Stopped)]
    );
}

#[test]
fn test_pause_and_resume_emit_once() {
    let mut engine = engine(4, 0.1);
    let events = record_events(&mut engine);
    engine.pause(0);
    engine.play(0, raw(&[1; 8]), SourceFormat::Raw);
    engine.pause(0);
    engine.pause(0);
    engine.resume(0);
    engine.resume(0);
    assert_eq!(
        *events.lock(),
        vec![
            (0, TrackEvent::Started),
            (0, TrackEvent::Paused),
            (0, TrackEvent::Resumed),
        ]
    );
}

#[test]
fn test_volume_clamp() {
    let mut engine = engine(4, 0.1);
    engine.set_volume(0, 1.5);
    assert_relative_eq!(engine.volume(0), 1.0);
    engine.set_volume(1, -0.5);
    assert_relative_eq!(engine.volume(1), 0.0);
    engine.set_volume(2, f32::NAN);
    assert_relative_eq!(engine.volume(2), 0.0);
    engine.set_volume(3, 0.25);
    assert_relative_eq!(engine.volume(3), 0.25);
    assert_relative_eq!(engine.volume(4), 0.0);
}

#[test]
fn test_parse_failure_leaves_slot_untouched() {
    let mut engine = engine(4, 0.25);
    let events = record_events(&mut engine);
    engine.play(0, raw(&[100; 32]), SourceFormat::Raw);
    engine.tick();
    engine.tick();
    let fade = engine.fade_volume(0);
    let position = engine.track(0).unwrap().position();

    let mut bad = wav(&[1, 2], &[]);
    bad[8..12].copy_from_slice(b"AVI ");
    assert!(!engine.play(0, shared(Cursor::new(bad)), SourceFormat::Wav));

    let mut no_data = wav(&[], &[]);
    no_data.truncate(no_data.len() - 8);
    assert!(matches!(
        engine.try_play(0, shared(Cursor::new(no_data)), SourceFormat::Wav),
        Err(MixerError::MissingDataChunk)
    ));

    assert!(engine.is_playing(0));
    assert_relative_eq!(engine.fade_volume(0), fade);
    assert_eq!(engine.track(0).unwrap().position(), position);
    assert_eq!(events.lock().len(), 1);

    engine.tick();
    assert_eq!(engine.sink().blocks()[2], vec![50; 4]);
}

#[test]
fn test_start_failure_and_recovery() {
    let config = EngineConfig::default().with_block_size(4);
    let mut engine = MixEngine::new(config, MemorySink::failing_configure()).unwrap();
    assert!(matches!(engine.start(), Err(MixerError::OutputDevice(_))));
    assert!(!engine.is_running());
    assert!(!engine.play(0, raw(&[1; 4]), SourceFormat::Raw));
    assert!(!engine.tick());
    assert!(!engine.cancel());
}

#[test]
fn test_cancel_stops_active_tracks() {
    let mut engine = engine(4, 0.1);
    let events = record_events(&mut engine);
    engine.play(0, raw(&[1; 8]), SourceFormat::Raw);
    engine.play(3, raw(&[1; 8]), SourceFormat::Raw);
    events.lock().clear();

    assert!(engine.cancel());
    assert_eq!(
        *events.lock(),
        vec![(0, TrackEvent::Stopped), (3, TrackEvent::Stopped)]
    );
    assert!(!engine.cancel());
    assert_eq!(events.lock().len(), 2);

    engine.start().unwrap();
    assert!(engine.play(0, raw(&[1; 8]), SourceFormat::Raw));
    assert_eq!(engine.sink().configure_calls(), 2);
}

#[test]
fn test_drop_cancels_engine() {
    let events: EventLog = Arc::default();
    {
        let mut engine = engine(4, 0.1);
        let seen = Arc::clone(&events);
        engine.on_event(move |_, track, event| seen.lock().push((track, event)));
        engine.play(1, raw(&[1; 8]), SourceFormat::Raw);
    }
    assert_eq!(events.lock().last(), Some(&(1, TrackEvent::Stopped)));
}

#[cfg(feature = "export-wav")]
#[test]
fn test_render_to_wav_file() {
    use wav_mixer::WavFileSink;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mix.wav");
    let config = EngineConfig::new(16_000)
        .with_block_size(4)
        .with_fade_step(1.0);
    let mut engine = MixEngine::new(config, WavFileSink::create(&path)).unwrap();
    engine.start().unwrap();
    engine.play(0, raw(&[10, 20, 30, 40, 50, 60, 70, 80]), SourceFormat::Raw);
    while engine.is_playing(0) {
        engine.tick();
    }
    assert!(engine.cancel());

    let mut reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.spec().sample_rate, 16_000);
    assert_eq!(reader.spec().channels, 1);
    let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(samples, vec![0, 0, 0, 0, 50, 60, 70, 80]);
}
