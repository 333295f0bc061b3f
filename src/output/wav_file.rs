//! WAV file output

use super::{OutputConfig, OutputSink};
use crate::{MixerError, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Sink that writes mixed blocks to a 16-bit mono WAV file.
///
/// The file is created on `configure` and finalized on `release`.
pub struct WavFileSink {
    path: PathBuf,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    samples_written: u64,
}

impl WavFileSink {
    /// Sink targeting `path`. Nothing is created until the engine starts.
    pub fn create<P: AsRef<Path>>(path: P) -> Self {
        WavFileSink {
            path: path.as_ref().to_path_buf(),
            writer: None,
            samples_written: 0,
        }
    }

    /// Output file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Samples written since the last `configure`
    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    fn finalize(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| MixerError::AudioFile(format!("Failed to finalize WAV file: {e}")))?;
            log::info!(
                "wrote {} samples to {}",
                self.samples_written,
                self.path.display()
            );
        }
        Ok(())
    }
}

impl OutputSink for WavFileSink {
    fn configure(&mut self, config: &OutputConfig) -> Result<()> {
        self.finalize()?;
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: config.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&self.path, spec)
            .map_err(|e| MixerError::AudioFile(format!("Failed to create WAV file: {e}")))?;
        self.writer = Some(writer);
        self.samples_written = 0;
        Ok(())
    }

    fn write(&mut self, block: &[i16]) -> Result<usize> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| MixerError::AudioFile("WAV sink is not configured".into()))?;
        for &sample in block {
            writer
                .write_sample(sample)
                .map_err(|e| MixerError::AudioFile(format!("Failed to write sample: {e}")))?;
        }
        self.samples_written += block.len() as u64;
        Ok(block.len())
    }

    fn release(&mut self) {
        if let Err(e) = self.finalize() {
            log::error!("{e}");
        }
    }
}

impl Drop for WavFileSink {
    fn drop(&mut self) {
        self.release();
    }
}
