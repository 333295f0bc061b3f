use anyhow::{bail, Context};
use std::env;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;

use wav_mixer::output::OutputSink;
use wav_mixer::tick::run_until;
use wav_mixer::{shared, EngineConfig, MixEngine, SourceFormat, TrackEvent, MAX_TRACKS};

const USAGE: &str = "Usage:
  wav-mixer [options] <track> [<track>...]

Mixes up to four 16-bit mono PCM tracks, one per slot.

Options:
  --config <file>     Engine configuration (JSON)
  --output <file>     Render to a WAV file instead of the audio device
  --loop              Loop every track
  --volume <v>        Track volume, 0.0 to 1.0 (default 1.0)
  --raw               Tracks are headerless PCM
  --canonical         Tracks are WAV files with a fixed 44-byte header
  --cycles <n>        Stop after n mix cycles
  -h, --help          Show this help

Examples:
  wav-mixer --output mix.wav drums.wav bass.wav
  wav-mixer --loop --cycles 2000 pad.wav
";

struct Options {
    config: Option<PathBuf>,
    output: Option<PathBuf>,
    looping: bool,
    volume: f32,
    format: SourceFormat,
    cycles: Option<u64>,
    tracks: Vec<PathBuf>,
}

fn parse_args() -> anyhow::Result<Option<Options>> {
    let mut options = Options {
        config: None,
        output: None,
        looping: false,
        volume: 1.0,
        format: SourceFormat::Wav,
        cycles: None,
        tracks: Vec::new(),
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(None),
            "--loop" => options.looping = true,
            "--raw" => options.format = SourceFormat::Raw,
            "--canonical" => options.format = SourceFormat::CanonicalWav,
            "--config" => {
                let value = args.next().context("--config requires a file")?;
                options.config = Some(PathBuf::from(value));
            }
            "--output" => {
                let value = args.next().context("--output requires a file")?;
                options.output = Some(PathBuf::from(value));
            }
            "--volume" => {
                let value = args.next().context("--volume requires a value")?;
                options.volume = value
                    .parse()
                    .with_context(|| format!("invalid volume '{value}'"))?;
            }
            "--cycles" => {
                let value = args.next().context("--cycles requires a count")?;
                options.cycles = Some(
                    value
                        .parse()
                        .with_context(|| format!("invalid cycle count '{value}'"))?,
                );
            }
            _ if arg.starts_with('-') => bail!("unknown flag: {arg}"),
            _ => options.tracks.push(PathBuf::from(arg)),
        }
    }

    if options.tracks.is_empty() {
        return Ok(None);
    }
    if options.tracks.len() > MAX_TRACKS {
        bail!(
            "at most {MAX_TRACKS} tracks can be mixed, got {}",
            options.tracks.len()
        );
    }
    Ok(Some(options))
}

#[cfg(feature = "export-wav")]
fn file_sink(path: &Path) -> anyhow::Result<Box<dyn OutputSink>> {
    Ok(Box::new(wav_mixer::WavFileSink::create(path)))
}

#[cfg(not(feature = "export-wav"))]
fn file_sink(_path: &Path) -> anyhow::Result<Box<dyn OutputSink>> {
    bail!("WAV output requires the \"export-wav\" feature")
}

#[cfg(feature = "streaming")]
fn device_sink() -> anyhow::Result<Box<dyn OutputSink>> {
    Ok(Box::new(wav_mixer::DeviceSink::new()))
}

#[cfg(not(feature = "streaming"))]
fn device_sink() -> anyhow::Result<Box<dyn OutputSink>> {
    bail!("device playback requires the \"streaming\" feature; use --output <file>")
}

fn run(options: Options) -> anyhow::Result<()> {
    let config = match &options.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let sink = match &options.output {
        Some(path) => file_sink(path)?,
        None => device_sink()?,
    };

    let mut engine = MixEngine::new(config, sink)?;
    engine.on_event(|_, track, event| {
        if event != TrackEvent::Started {
            log::info!("track {track} {event}");
        }
    });
    engine.start().context("failed to start mix engine")?;

    for (track, path) in options.tracks.iter().enumerate() {
        let file =
            File::open(path).with_context(|| format!("failed to open '{}'", path.display()))?;
        let stream = shared(BufReader::new(file));
        engine.set_volume(track, options.volume);
        let layout = if options.looping {
            engine.try_play_looped(track, stream, options.format)
        } else {
            engine.try_play(track, stream, options.format)
        }
        .with_context(|| format!("failed to play '{}'", path.display()))?;
        log::info!(
            "track {track}: {} (PCM at byte {})",
            path.display(),
            layout.data_offset
        );
    }

    let started = Instant::now();
    let cycles = run_until(&mut engine, options.cycles, |engine| {
        engine.active_tracks() == 0
    });
    let stats = engine.stats();
    engine.cancel();

    log::info!(
        "mixed {cycles} cycles ({:.2} s of audio) in {:.2} s",
        cycles as f32 * config.block_duration_ms() / 1000.0,
        started.elapsed().as_secs_f32()
    );
    log::info!(
        "blocks written: {}, write failures: {}, loop restarts: {}",
        stats.blocks_written,
        stats.write_failures,
        stats.loop_restarts
    );
    if stats.write_failures > 0 {
        bail!("{} blocks could not be written", stats.write_failures);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    match parse_args()? {
        Some(options) => run(options),
        None => {
            eprint!("{USAGE}");
            Ok(())
        }
    }
}
