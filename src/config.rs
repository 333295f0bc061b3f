//! Engine configuration
//!
//! Hardware pins, sample rate, block size and mixing policy. A configuration is
//! validated once by [`crate::MixEngine::new`] and is immutable afterwards.

use crate::{MixerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Number of track slots per engine
pub const MAX_TRACKS: usize = 4;

/// Default output sample rate (32 kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 32_000;

/// Default mix block size in samples
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Largest accepted mix block size in samples
pub const MAX_BLOCK_SIZE: usize = 16_384;

/// Default fade-in increment applied once per mix cycle
pub const DEFAULT_FADE_STEP: f32 = 0.1;

/// How scaled samples are summed into the 16-bit mix buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accumulation {
    /// Two's-complement wraparound on overflow
    #[default]
    Wrapping,
    /// Clip to `i16::MIN..=i16::MAX`
    Saturating,
}

/// I2S-style output pin assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    /// Bit clock pin
    pub bck: i32,
    /// Word select (LR clock) pin
    pub ws: i32,
    /// Serial data out pin
    pub data_out: i32,
}

impl Default for PinConfig {
    fn default() -> Self {
        PinConfig {
            bck: 26,
            ws: 25,
            data_out: 22,
        }
    }
}

/// Configuration for a [`crate::MixEngine`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output pin assignment
    pub pins: PinConfig,
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Samples per mix block (and per slot buffer)
    pub block_size: usize,
    /// Fade-in increment per cycle, in (0, 1]
    pub fade_step: f32,
    /// Overflow policy of the mix buffer
    pub accumulation: Accumulation,
}

impl EngineConfig {
    /// Default configuration at the given sample rate
    pub fn new(sample_rate: u32) -> Self {
        EngineConfig {
            sample_rate,
            ..Self::default()
        }
    }

    /// Set the mix block size in samples
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the per-cycle fade-in increment
    pub fn with_fade_step(mut self, fade_step: f32) -> Self {
        self.fade_step = fade_step;
        self
    }

    /// Set the mix buffer overflow policy
    pub fn with_accumulation(mut self, accumulation: Accumulation) -> Self {
        self.accumulation = accumulation;
        self
    }

    /// Set the output pins
    pub fn with_pins(mut self, pins: PinConfig) -> Self {
        self.pins = pins;
        self
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| MixerError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            MixerError::Config(format!("Failed to read config '{}': {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Check the configuration for values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(MixerError::Config("sample rate must be non-zero".into()));
        }
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(MixerError::Config(format!(
                "block size {} outside 1..={MAX_BLOCK_SIZE}",
                self.block_size
            )));
        }
        if !(self.fade_step > 0.0 && self.fade_step <= 1.0) {
            return Err(MixerError::Config(format!(
                "fade step {} outside (0, 1]",
                self.fade_step
            )));
        }
        Ok(())
    }

    /// Duration of one mix block in milliseconds
    pub fn block_duration_ms(&self) -> f32 {
        (self.block_size as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Number of cycles a fade-in takes to reach `volume`
    pub fn fade_in_cycles(&self, volume: f32) -> u32 {
        (volume.clamp(0.0, 1.0) / self.fade_step).ceil() as u32
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            pins: PinConfig::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            fade_step: DEFAULT_FADE_STEP,
            accumulation: Accumulation::default(),
        }
    }
}
