//! Multi-track PCM mixing engine for embedded audio outputs
//!
//! Mixes up to [`MAX_TRACKS`] independent 16-bit mono PCM tracks, raw or wrapped in a
//! WAV container, into one fixed-size block per cycle and hands that block to an
//! output peripheral. Each track has its own volume, a short fade-in envelope after
//! every (re)start and optional looping.
//!
//! # Features
//! - Fixed slot array, buffers allocated once at [`MixEngine::start`]
//! - RIFF/WAVE chunk scanner that locates the PCM data offset on any [`Stream`]
//! - Bounded refills that never read past the declared `data` chunk
//! - Synchronous, re-entrant single-subscriber event notifications
//! - Pluggable [`OutputSink`] (memory, WAV file, audio device)
//!
//! # Crate feature flags
//! - `export-wav` (default): offline rendering to a WAV file (`output::WavFileSink`)
//! - `streaming` (opt-in): real-time output to the default audio device (enables `rodio`)
//!
//! # Quick start
//! ```no_run
//! use std::io::Cursor;
//! use wav_mixer::{shared, EngineConfig, MemorySink, MixEngine, SourceFormat};
//!
//! let mut engine = MixEngine::new(EngineConfig::default(), MemorySink::new()).unwrap();
//! engine.start().unwrap();
//!
//! let data = std::fs::read("kick.wav").unwrap();
//! engine.set_volume(0, 0.8);
//! engine.play(0, shared(Cursor::new(data)), SourceFormat::Wav);
//!
//! // Driven by an external scheduler at the output block rate
//! while engine.is_playing(0) {
//!     engine.tick();
//! }
//! ```

#![warn(missing_docs)]

pub mod config; // Engine configuration
pub mod engine; // Lifecycle, playback control and the mix cycle
pub mod mixer; // Sample accumulation and fade envelope
pub mod output; // Output sinks
pub mod stream; // Track data sources
#[cfg(feature = "streaming")]
pub mod streaming; // Audio device output
pub mod tick; // Scheduler seam
pub mod track; // Per-track slot state and refill
pub mod wav; // WAV container parsing

/// Error types for mixing engine operations
#[derive(thiserror::Error, Debug)]
pub enum MixerError {
    /// WAV container is malformed
    #[error("Invalid WAV header: {0}")]
    InvalidHeader(String),

    /// Stream ended inside a header structure
    #[error("Truncated WAV header: expected {expected} bytes, got {actual}")]
    TruncatedHeader {
        /// Bytes requested
        expected: usize,
        /// Bytes actually read
        actual: usize,
    },

    /// No `data` chunk before the end of the stream
    #[error("WAV stream has no data chunk")]
    MissingDataChunk,

    /// Track index outside the slot range
    #[error("Invalid track index {0}")]
    InvalidTrack(usize),

    /// Engine has not been started
    #[error("Engine is not running")]
    NotRunning,

    /// Output peripheral could not be acquired or written
    #[error("Output device error: {0}")]
    OutputDevice(String),

    /// Buffer allocation failed
    #[error("Allocation failed: {0}")]
    Allocation(String),

    /// Error writing audio file
    #[error("Audio file write error: {0}")]
    AudioFile(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error from a stream or the filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for MixerError {
    /// Converts a String into `MixerError::Other`.
    ///
    /// Prefer the specific variants where the failure has a known category.
    fn from(msg: String) -> Self {
        MixerError::Other(msg)
    }
}

impl From<&str> for MixerError {
    fn from(msg: &str) -> Self {
        MixerError::Other(msg.to_string())
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, MixerError>;

// Public API exports
pub use config::{Accumulation, EngineConfig, PinConfig, MAX_TRACKS};
pub use engine::{EngineStats, EventCallback, MixEngine};
pub use output::{MemorySink, OutputConfig, OutputSink};
pub use stream::{shared, SharedStream, Stream};
pub use tick::Tick;
pub use track::TrackEvent;
pub use wav::{FmtChunk, PcmLayout, SourceFormat};

#[cfg(feature = "export-wav")]
pub use output::WavFileSink;
#[cfg(feature = "streaming")]
pub use streaming::{DeviceSink, RingBuffer};
