//! Audio device output using rodio
//!
//! The mix cycle writes blocks into a [`RingBuffer`]; a rodio source drains it on
//! the audio thread. `write` blocks with back-pressure while the ring is full,
//! which paces the engine to the device's sample clock.

use super::{RingBuffer, BUFFER_BACKOFF_MICROS};
use crate::output::{OutputConfig, OutputSink};
use crate::{MixerError, Result};
use rodio::{OutputStream, Sink, Source};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default ring capacity in mix blocks
const RING_BLOCKS: usize = 8;

/// Give up on a write after ~100 ms without progress
const MAX_RETRIES: u32 = 1000;

/// rodio source reading from the ring buffer
struct RingBufferSource {
    ring_buffer: Arc<RingBuffer>,
    sample_rate: u32,
    finished: Arc<AtomicBool>,
    /// Batch buffer to keep lock traffic low
    buffer: Vec<i16>,
    buffer_pos: usize,
}

impl RingBufferSource {
    fn new(ring_buffer: Arc<RingBuffer>, sample_rate: u32, finished: Arc<AtomicBool>) -> Self {
        let batch = ring_buffer.capacity().min(4096);
        RingBufferSource {
            ring_buffer,
            sample_rate,
            finished,
            buffer: vec![0; batch],
            buffer_pos: batch,
        }
    }
}

impl Source for RingBufferSource {
    fn current_frame_len(&self) -> Option<usize> {
        match self.ring_buffer.available_read() {
            0 => Some(self.buffer.len()),
            available => Some(available),
        }
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

impl Iterator for RingBufferSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        if self.finished.load(Ordering::Relaxed) {
            return None;
        }

        if self.buffer_pos >= self.buffer.len() {
            let read = self.ring_buffer.read(&mut self.buffer);
            // Underrun plays silence to keep the stream alive
            self.buffer[read..].fill(0);
            self.buffer_pos = 0;
        }

        let sample = self.buffer[self.buffer_pos];
        self.buffer_pos += 1;
        Some(sample)
    }
}

struct Device {
    _stream: OutputStream,
    sink: Sink,
    ring_buffer: Arc<RingBuffer>,
    finished: Arc<AtomicBool>,
}

/// Sink playing mixed blocks on the default audio device.
///
/// The device is opened on `configure` and closed on `release`. The pin
/// assignment in [`OutputConfig`] has no meaning for a desktop device and is
/// ignored.
pub struct DeviceSink {
    ring_blocks: usize,
    device: Option<Device>,
    samples_written: u64,
    overruns: u64,
}

impl DeviceSink {
    /// Sink with the default ring size
    pub fn new() -> Self {
        Self::with_ring_blocks(RING_BLOCKS)
    }

    /// Sink buffering up to `blocks` mix blocks ahead of the device
    pub fn with_ring_blocks(blocks: usize) -> Self {
        DeviceSink {
            ring_blocks: blocks.max(2),
            device: None,
            samples_written: 0,
            overruns: 0,
        }
    }

    /// True while the device is open
    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Samples accepted since the device was opened
    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// Writes that timed out on a full ring
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Ring fill level (0.0 to 1.0), 0 when closed
    pub fn fill_percentage(&self) -> f32 {
        self.device
            .as_ref()
            .map_or(0.0, |d| d.ring_buffer.fill_percentage())
    }

    /// Block until the device has played everything buffered, or stops consuming
    pub fn drain(&self) {
        let Some(device) = &self.device else {
            return;
        };
        let mut last = device.ring_buffer.available_read();
        let mut retry_count = 0;
        while last > 0 && retry_count < MAX_RETRIES {
            std::thread::sleep(Duration::from_micros(BUFFER_BACKOFF_MICROS));
            let available = device.ring_buffer.available_read();
            if available < last {
                retry_count = 0;
            } else {
                retry_count += 1;
            }
            last = available;
        }
    }
}

impl Default for DeviceSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for DeviceSink {
    fn configure(&mut self, config: &OutputConfig) -> Result<()> {
        self.release();

        let ring_buffer = Arc::new(RingBuffer::new(config.block_size * self.ring_blocks)?);

        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| MixerError::OutputDevice(format!("Failed to create audio stream: {e}")))?;
        let sink = Sink::try_new(&stream_handle)
            .map_err(|e| MixerError::OutputDevice(format!("Failed to create audio sink: {e}")))?;

        let finished = Arc::new(AtomicBool::new(false));
        sink.append(RingBufferSource::new(
            Arc::clone(&ring_buffer),
            config.sample_rate,
            Arc::clone(&finished),
        ));

        log::debug!(
            "audio device open: {} Hz, ring {} samples",
            config.sample_rate,
            ring_buffer.capacity()
        );
        self.device = Some(Device {
            _stream: stream,
            sink,
            ring_buffer,
            finished,
        });
        self.samples_written = 0;
        Ok(())
    }

    fn write(&mut self, block: &[i16]) -> Result<usize> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| MixerError::OutputDevice("audio device is not open".into()))?;

        let mut total_written = 0;
        let mut remaining = block;
        let mut retry_count = 0;
        while !remaining.is_empty() && retry_count < MAX_RETRIES {
            let written = device.ring_buffer.write(remaining);
            total_written += written;
            if written == 0 {
                std::thread::sleep(Duration::from_micros(BUFFER_BACKOFF_MICROS));
                retry_count += 1;
            } else {
                remaining = &remaining[written..];
                retry_count = 0;
            }
        }

        self.samples_written += total_written as u64;
        if !remaining.is_empty() {
            self.overruns += 1;
            return Err(MixerError::OutputDevice(format!(
                "audio device stalled, dropped {} samples",
                remaining.len()
            )));
        }
        Ok(total_written)
    }

    fn release(&mut self) {
        self.drain();
        if let Some(device) = self.device.take() {
            device.finished.store(true, Ordering::Relaxed);
            device.sink.stop();
            log::debug!("audio device closed after {} samples", self.samples_written);
        }
    }
}

impl Drop for DeviceSink {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_write_without_device_fails() {
        let mut sink = DeviceSink::new();
        assert!(!sink.is_open());
        assert!(sink.write(&[0; 4]).is_err());
    }

    #[test]
    fn test_ring_buffer_source_silence_on_underrun() {
        let ring = Arc::new(RingBuffer::new(64).unwrap());
        let mut source = RingBufferSource::new(ring, 32_000, Arc::new(AtomicBool::new(false)));
        assert_eq!(source.channels(), 1);
        assert_eq!(source.sample_rate(), 32_000);
        assert_eq!(source.next(), Some(0));
    }

    #[test]
    fn test_ring_buffer_source_plays_written_samples() {
        let ring = Arc::new(RingBuffer::new(64).unwrap());
        ring.write(&[5, 6, 7]);
        let mut source =
            RingBufferSource::new(Arc::clone(&ring), 32_000, Arc::new(AtomicBool::new(false)));
        assert_eq!(source.next(), Some(5));
        assert_eq!(source.next(), Some(6));
        assert_eq!(source.next(), Some(7));
        assert_eq!(source.next(), Some(0));
    }

    #[test]
    fn test_ring_buffer_source_finished_signal() {
        let ring = Arc::new(RingBuffer::new(64).unwrap());
        let finished = Arc::new(AtomicBool::new(false));
        let mut source = RingBufferSource::new(ring, 32_000, Arc::clone(&finished));
        assert!(source.next().is_some());
        finished.store(true, Ordering::Relaxed);
        assert_eq!(source.next(), None);
    }

    #[test]
    fn test_device_open_and_write() {
        let mut sink = DeviceSink::new();
        let config = OutputConfig::from(&EngineConfig::default());
        if let Err(err) = sink.configure(&config) {
            eprintln!("Skipping device test (audio backend unavailable): {err}");
            return;
        }
        assert!(sink.is_open());
        assert_eq!(sink.write(&[0; 512]).unwrap(), 512);
        sink.release();
        assert!(!sink.is_open());
    }
}
