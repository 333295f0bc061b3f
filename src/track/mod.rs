//! Track slots
//!
//! A [`TrackSlot`] is the plain per-track record the engine keeps for each of its
//! fixed slots: the stream handle, playback flags, gains, the private decode buffer
//! and the bounded-read bookkeeping.
//!
//! Slot invariants:
//! - `buffer_pos <= buffer_len <= capacity`
//! - `0.0 <= fade_volume <= volume <= 1.0`
//! - active iff `playing && stream.is_some()`

use crate::stream::SharedStream;
use crate::wav::PcmLayout;
use crate::{MixerError, Result};

/// Track state transitions reported to the event subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackEvent {
    /// `play`/`play_looped` activated the slot
    Started,
    /// Slot deactivated by `stop`, `cancel` or end of stream
    Stopped,
    /// Slot paused
    Paused,
    /// Slot resumed
    Resumed,
}

impl std::fmt::Display for TrackEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TrackEvent::Started => "started",
            TrackEvent::Stopped => "stopped",
            TrackEvent::Paused => "paused",
            TrackEvent::Resumed => "resumed",
        })
    }
}

/// Outcome of a buffer refill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refill {
    /// Buffer holds this many fresh samples
    Filled(usize),
    /// Nothing left to read
    EndOfStream,
}

/// Per-track playback state and decode buffer
#[derive(Default)]
pub struct TrackSlot {
    stream: Option<SharedStream>,
    pub(crate) playing: bool,
    pub(crate) paused: bool,
    pub(crate) looping: bool,
    volume: f32,
    fade_volume: f32,
    buffer: Vec<i16>,
    buffer_pos: usize,
    buffer_len: usize,
    /// Byte offset of the first PCM sample
    pcm_offset: u64,
    /// Declared PCM length in bytes
    data_size: Option<u64>,
    /// PCM bytes consumed since the last (re)start
    position: u64,
    #[cfg(test)]
    pub(crate) fail_allocation: bool,
}

impl TrackSlot {
    /// Idle slot at full volume
    pub fn new() -> Self {
        TrackSlot {
            volume: 1.0,
            ..Self::default()
        }
    }

    /// Slot has a stream and is playing (paused or not)
    pub fn is_active(&self) -> bool {
        self.playing && self.stream.is_some()
    }

    /// Slot contributes to the next mix cycle
    pub fn is_audible(&self) -> bool {
        self.is_active() && !self.paused
    }

    /// Target gain
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Current ramped gain
    pub fn fade_volume(&self) -> f32 {
        self.fade_volume
    }

    /// Set the target gain, clamped to [0, 1]. NaN stores 0.
    ///
    /// A fade already above the new target is pulled down to it.
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        self.fade_volume = self.fade_volume.min(self.volume);
    }

    pub(crate) fn set_fade_volume(&mut self, fade_volume: f32) {
        self.fade_volume = fade_volume.clamp(0.0, self.volume);
    }

    /// Slot buffer capacity in samples (0 while released)
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Read cursor into the slot buffer
    pub fn buffer_pos(&self) -> usize {
        self.buffer_pos
    }

    /// Buffer has no unmixed samples left
    pub fn needs_refill(&self) -> bool {
        self.buffer_pos >= self.buffer_len
    }

    /// PCM bytes consumed since the last (re)start
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Allocate the decode buffer. Fails without aborting when memory is short.
    pub(crate) fn allocate(&mut self, capacity: usize) -> Result<()> {
        #[cfg(test)]
        if self.fail_allocation {
            return Err(MixerError::Allocation("injected slot failure".into()));
        }
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(capacity).map_err(|e| {
            MixerError::Allocation(format!("slot buffer of {capacity} samples: {e}"))
        })?;
        buffer.resize(capacity, 0);
        self.buffer = buffer;
        self.buffer_pos = capacity;
        self.buffer_len = capacity;
        Ok(())
    }

    /// Drop the decode buffer
    pub(crate) fn release(&mut self) {
        self.buffer = Vec::new();
        self.buffer_pos = 0;
        self.buffer_len = 0;
    }

    /// Overwrite the slot for a new stream, keeping only the volume and buffer
    pub(crate) fn activate(&mut self, stream: SharedStream, layout: PcmLayout, looping: bool) {
        let capacity = self.buffer.len();
        self.stream = Some(stream);
        self.playing = true;
        self.paused = false;
        self.looping = looping;
        self.fade_volume = 0.0;
        self.buffer_pos = capacity;
        self.buffer_len = capacity;
        self.pcm_offset = layout.data_offset;
        self.data_size = layout.data_size;
        self.position = 0;
    }

    /// Return to idle and let go of the stream. Volume and buffer stay.
    pub(crate) fn clear(&mut self) {
        self.playing = false;
        self.paused = false;
        self.stream = None;
    }

    /// Seek back to the first PCM sample and restart the fade envelope
    pub(crate) fn rewind(&mut self) -> Result<()> {
        if let Some(stream) = &self.stream {
            stream.lock().seek(self.pcm_offset)?;
        }
        self.position = 0;
        self.fade_volume = 0.0;
        Ok(())
    }

    /// Refill the decode buffer from the stream.
    ///
    /// Requests one block, capped by the remaining declared length. `scratch` must
    /// hold at least `2 * capacity` bytes. A stream error ends the stream.
    pub(crate) fn refill(&mut self, scratch: &mut [u8]) -> Refill {
        let capacity = self.buffer.len();
        let Some(stream) = &self.stream else {
            return Refill::EndOfStream;
        };

        let mut request = capacity * 2;
        if let Some(size) = self.data_size {
            let remaining = size.saturating_sub(self.position);
            request = request.min(remaining as usize);
        }
        if request == 0 {
            return Refill::EndOfStream;
        }

        let mut stream = stream.lock();
        let mut got = match stream.read(&mut scratch[..request]) {
            Ok(n) => n,
            Err(e) => {
                log::warn!("track stream read failed: {e}");
                return Refill::EndOfStream;
            }
        };

        if got % 2 == 1 {
            // Leave the odd byte for the next read
            got -= 1;
            if let Err(e) = stream.position().and_then(|pos| stream.seek(pos - 1)) {
                log::warn!("track stream could not un-read odd byte: {e}");
            }
        }
        if got == 0 {
            return Refill::EndOfStream;
        }

        let samples = got / 2;
        for (dst, src) in self.buffer[..samples]
            .iter_mut()
            .zip(scratch[..got].chunks_exact(2))
        {
            *dst = i16::from_le_bytes([src[0], src[1]]);
        }
        self.buffer_pos = 0;
        self.buffer_len = samples;
        self.position += got as u64;
        log::trace!("refilled {samples} samples, position {}", self.position);
        Refill::Filled(samples)
    }

    /// Unmixed samples, marked consumed
    pub(crate) fn take_pending(&mut self) -> &[i16] {
        let start = self.buffer_pos;
        self.buffer_pos = self.buffer_len;
        &self.buffer[start..self.buffer_len]
    }
}

impl std::fmt::Debug for TrackSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackSlot")
            .field("has_stream", &self.stream.is_some())
            .field("playing", &self.playing)
            .field("paused", &self.paused)
            .field("looping", &self.looping)
            .field("volume", &self.volume)
            .field("fade_volume", &self.fade_volume)
            .field("capacity", &self.buffer.len())
            .field("buffer_pos", &self.buffer_pos)
            .field("position", &self.position)
            .finish()
    }
}
