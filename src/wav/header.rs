//! RIFF/WAVE header scanner
//!
//! Walks the chunk list of a WAV stream without buffering it:
//! - 12-byte `RIFF <size> WAVE` preamble
//! - 8-byte chunk headers (`<tag> <size, little-endian>`)
//! - `fmt ` is decoded, every other chunk is skipped by seeking
//! - chunks before `fmt `, `data` included, are skipped
//! - the scan stops at the first `data` chunk after `fmt `, leaving the cursor
//!   on the first sample byte
//!
//! Odd-sized chunks carry one pad byte, which is skipped along with the body.

use super::{FmtChunk, PcmLayout, UNBOUNDED_DATA_SIZE};
use crate::stream::{read_fully, Stream};
use crate::{MixerError, Result};
use nom::bytes::complete::{tag, take};
use nom::number::complete::{le_u16, le_u32};
use nom::IResult;

/// Byte offset of PCM data in a canonical 44-byte WAV header
pub const CANONICAL_HEADER_LEN: u64 = 44;

const RIFF_PREAMBLE_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;
const FMT_BODY_LEN: usize = 16;

/// Chunk tag and body length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChunkHeader {
    id: [u8; 4],
    size: u32,
}

fn riff_preamble(input: &[u8]) -> IResult<&[u8], u32> {
    let (input, _) = tag(&b"RIFF"[..])(input)?;
    let (input, riff_size) = le_u32(input)?;
    let (input, _) = tag(&b"WAVE"[..])(input)?;
    Ok((input, riff_size))
}

fn chunk_header(input: &[u8]) -> IResult<&[u8], ChunkHeader> {
    let (input, id) = take(4usize)(input)?;
    let (input, size) = le_u32(input)?;
    let mut tag_bytes = [0u8; 4];
    tag_bytes.copy_from_slice(id);
    Ok((input, ChunkHeader { id: tag_bytes, size }))
}

fn fmt_body(input: &[u8]) -> IResult<&[u8], FmtChunk> {
    let (input, audio_format) = le_u16(input)?;
    let (input, channels) = le_u16(input)?;
    let (input, sample_rate) = le_u32(input)?;
    let (input, byte_rate) = le_u32(input)?;
    let (input, block_align) = le_u16(input)?;
    let (input, bits_per_sample) = le_u16(input)?;
    Ok((
        input,
        FmtChunk {
            audio_format,
            channels,
            sample_rate,
            byte_rate,
            block_align,
            bits_per_sample,
        },
    ))
}

/// Fill `buf` completely or fail with [`MixerError::TruncatedHeader`]
fn read_header_bytes(stream: &mut (dyn Stream + Send), buf: &mut [u8]) -> Result<()> {
    let actual = read_fully(stream, buf)?;
    if actual < buf.len() {
        return Err(MixerError::TruncatedHeader {
            expected: buf.len(),
            actual,
        });
    }
    Ok(())
}

/// Body length rounded up to the RIFF word boundary
fn padded(size: u32) -> u64 {
    u64::from(size) + u64::from(size & 1)
}

fn skip(stream: &mut (dyn Stream + Send), len: u64) -> Result<()> {
    let pos = stream.position()?;
    stream.seek(pos + len)?;
    Ok(())
}

/// Scan a WAV stream from offset 0 and leave it positioned on the first PCM byte.
///
/// Fails on a missing RIFF/WAVE preamble, any short read, or the stream ending
/// before a `data` chunk that follows `fmt `.
pub fn parse_header(stream: &mut (dyn Stream + Send)) -> Result<PcmLayout> {
    stream.seek(0)?;

    let mut preamble = [0u8; RIFF_PREAMBLE_LEN];
    read_header_bytes(stream, &mut preamble)?;
    riff_preamble(&preamble)
        .map_err(|_| MixerError::InvalidHeader("missing RIFF/WAVE magic".into()))?;

    let mut format: Option<FmtChunk> = None;
    let mut seen_fmt = false;

    loop {
        let mut raw = [0u8; CHUNK_HEADER_LEN];
        let got = read_fully(stream, &mut raw)?;
        if got == 0 {
            return Err(MixerError::MissingDataChunk);
        }
        if got < CHUNK_HEADER_LEN {
            return Err(MixerError::TruncatedHeader {
                expected: CHUNK_HEADER_LEN,
                actual: got,
            });
        }
        let (_, chunk) = chunk_header(&raw)
            .map_err(|_| MixerError::InvalidHeader("unreadable chunk header".into()))?;

        match &chunk.id {
            b"fmt " => {
                seen_fmt = true;
                if chunk.size as usize >= FMT_BODY_LEN {
                    let mut body = [0u8; FMT_BODY_LEN];
                    read_header_bytes(stream, &mut body)?;
                    format = fmt_body(&body).ok().map(|(_, fmt)| fmt);
                    skip(stream, padded(chunk.size) - FMT_BODY_LEN as u64)?;
                } else {
                    log::warn!("fmt chunk too short ({} bytes), format unknown", chunk.size);
                    skip(stream, padded(chunk.size))?;
                }
            }
            b"data" if seen_fmt => {
                let data_offset = stream.position()?;
                let data_size = if chunk.size == UNBOUNDED_DATA_SIZE {
                    None
                } else {
                    Some(u64::from(chunk.size))
                };
                if let Some(fmt) = &format {
                    if !fmt.is_pcm16_mono() {
                        log::warn!(
                            "WAV format {} ch / {} bit (tag {}) mixed as 16-bit mono PCM",
                            fmt.channels,
                            fmt.bits_per_sample,
                            fmt.audio_format
                        );
                    }
                }
                log::trace!("PCM data at offset {data_offset}, size {data_size:?}");
                return Ok(PcmLayout {
                    data_offset,
                    data_size,
                    format,
                });
            }
            other => {
                log::trace!(
                    "skipping chunk {:?} ({} bytes)",
                    String::from_utf8_lossy(other),
                    chunk.size
                );
                skip(stream, padded(chunk.size))?;
            }
        }
    }
}
