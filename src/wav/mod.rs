//! WAV container handling
//!
//! Locates the PCM payload of a track source. Three layouts are supported:
//! - [`SourceFormat::Wav`]: RIFF/WAVE chunk scan up to the `data` chunk
//! - [`SourceFormat::CanonicalWav`]: fixed 44-byte header, no scan
//! - [`SourceFormat::Raw`]: headerless PCM from the current stream position
//!
//! Only 16-bit mono PCM is mixed. The `fmt ` chunk is decoded for reporting but
//! never used to convert samples.

pub mod header;

pub use header::{parse_header, CANONICAL_HEADER_LEN};

use crate::stream::Stream;
use crate::Result;

/// `data` chunk size written by streaming encoders that do not know the final length
pub const UNBOUNDED_DATA_SIZE: u32 = 0xFFFF_FFFF;

/// How a track's stream is laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceFormat {
    /// RIFF/WAVE container, scanned chunk by chunk
    #[default]
    Wav,
    /// Canonical WAV with PCM data at byte 44
    CanonicalWav,
    /// Headerless PCM starting at the stream's current position
    Raw,
}

/// Decoded `fmt ` chunk (the first 16 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FmtChunk {
    /// Format tag (1 = integer PCM)
    pub audio_format: u16,
    /// Channel count
    pub channels: u16,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Average bytes per second
    pub byte_rate: u32,
    /// Bytes per sample frame
    pub block_align: u16,
    /// Bits per sample
    pub bits_per_sample: u16,
}

impl FmtChunk {
    /// PCM format tag
    pub const PCM: u16 = 1;

    /// True for the only layout the mixer decodes: 16-bit mono integer PCM
    pub fn is_pcm16_mono(&self) -> bool {
        self.audio_format == Self::PCM && self.channels == 1 && self.bits_per_sample == 16
    }
}

/// Location of the PCM payload inside a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmLayout {
    /// Byte offset of the first sample
    pub data_offset: u64,
    /// Declared payload length in bytes, `None` when unbounded
    pub data_size: Option<u64>,
    /// Decoded format chunk, when one was read
    pub format: Option<FmtChunk>,
}

impl PcmLayout {
    /// Unbounded payload starting at `data_offset`
    pub fn raw(data_offset: u64) -> Self {
        PcmLayout {
            data_offset,
            data_size: None,
            format: None,
        }
    }
}

/// Position `stream` at the first PCM byte according to `format`
pub fn locate_pcm(stream: &mut (dyn Stream + Send), format: SourceFormat) -> Result<PcmLayout> {
    match format {
        SourceFormat::Wav => parse_header(stream),
        SourceFormat::CanonicalWav => {
            stream.seek(CANONICAL_HEADER_LEN)?;
            Ok(PcmLayout::raw(CANONICAL_HEADER_LEN))
        }
        SourceFormat::Raw => {
            let offset = stream.position()?;
            Ok(PcmLayout::raw(offset))
        }
    }
}
