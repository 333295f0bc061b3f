//! Output sinks
//!
//! The engine hands each completed mix block to an [`OutputSink`]. A sink is
//! configured once when the engine starts, receives blocks while it runs and is
//! released when the engine is cancelled.
//!
//! - [`MemorySink`]: keeps every block in memory (tests, offline rendering)
//! - [`WavFileSink`]: writes a 16-bit mono WAV file (`export-wav` feature)
//! - `DeviceSink`: plays through the default audio device (`streaming` feature)

#[cfg(feature = "export-wav")]
mod wav_file;

#[cfg(feature = "export-wav")]
pub use wav_file::WavFileSink;

use crate::config::{EngineConfig, PinConfig};
use crate::{MixerError, Result};

/// Output parameters derived from the engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Hardware pin assignment
    pub pins: PinConfig,
    /// Samples per block handed to [`OutputSink::write`]
    pub block_size: usize,
}

impl From<&EngineConfig> for OutputConfig {
    fn from(config: &EngineConfig) -> Self {
        OutputConfig {
            sample_rate: config.sample_rate,
            pins: config.pins,
            block_size: config.block_size,
        }
    }
}

/// Destination for mixed 16-bit mono blocks
pub trait OutputSink {
    /// Prepare the sink for output. Called once per engine start.
    fn configure(&mut self, config: &OutputConfig) -> Result<()>;

    /// Write a complete block. May block until the sink accepts it.
    ///
    /// Returns the number of samples accepted.
    fn write(&mut self, block: &[i16]) -> Result<usize>;

    /// Release the sink. Called once per engine cancel.
    fn release(&mut self);
}

impl<T: OutputSink + ?Sized> OutputSink for Box<T> {
    fn configure(&mut self, config: &OutputConfig) -> Result<()> {
        (**self).configure(config)
    }

    fn write(&mut self, block: &[i16]) -> Result<usize> {
        (**self).write(block)
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Sink that records every written block
#[derive(Debug, Default)]
pub struct MemorySink {
    config: Option<OutputConfig>,
    blocks: Vec<Vec<i16>>,
    fail_configure: bool,
    fail_writes: bool,
    configure_calls: usize,
    release_calls: usize,
}

impl MemorySink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose `configure` always fails
    pub fn failing_configure() -> Self {
        MemorySink {
            fail_configure: true,
            ..Self::default()
        }
    }

    /// Make subsequent writes fail (or succeed again)
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Configuration received by the last successful `configure`
    pub fn config(&self) -> Option<&OutputConfig> {
        self.config.as_ref()
    }

    /// True between a successful `configure` and the next `release`
    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    /// Blocks in write order
    pub fn blocks(&self) -> &[Vec<i16>] {
        &self.blocks
    }

    /// All written samples, concatenated
    pub fn samples(&self) -> Vec<i16> {
        self.blocks.concat()
    }

    /// Forget recorded blocks
    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    /// Number of `configure` calls, successful or not
    pub fn configure_calls(&self) -> usize {
        self.configure_calls
    }

    /// Number of `release` calls
    pub fn release_calls(&self) -> usize {
        self.release_calls
    }
}

impl OutputSink for MemorySink {
    fn configure(&mut self, config: &OutputConfig) -> Result<()> {
        self.configure_calls += 1;
        if self.fail_configure {
            return Err(MixerError::OutputDevice(
                "memory sink refused configuration".into(),
            ));
        }
        self.config = Some(*config);
        Ok(())
    }

    fn write(&mut self, block: &[i16]) -> Result<usize> {
        if self.fail_writes {
            return Err(MixerError::OutputDevice("memory sink write failed".into()));
        }
        self.blocks.push(block.to_vec());
        Ok(block.len())
    }

    fn release(&mut self) {
        self.release_calls += 1;
        self.config = None;
    }
}
