//! Mixing engine
//!
//! [`MixEngine`] owns the fixed slot array, the shared mix buffer and the output
//! sink. It has no threads of its own: an external scheduler calls
//! [`MixEngine::tick`] once per output block.
//!
//! # Lifecycle
//! - `new`: validate the configuration, zero the slots. Nothing is acquired.
//! - `start`: configure the sink, then allocate one decode buffer per slot.
//!   Idempotent. A failed allocation rolls back through `cancel`.
//! - `cancel`: stop every slot (with notifications), free the slot buffers,
//!   release the sink. Also runs on drop.
//!
//! # Re-entrancy
//! Event subscribers run inline and receive `&mut MixEngine`. They may call any
//! method, including `play` from a `Stopped` notification raised inside `tick`;
//! the resulting `Started` is delivered before that `play` returns. A subscriber
//! that cancels the engine mid-cycle ends that cycle without an output write. A
//! nested `tick` from inside a subscriber is refused.
//!
//! The engine is not thread-safe by itself; `tick` and the playback-control
//! calls must not run concurrently.

mod events;

pub use events::EventCallback;

use crate::config::{EngineConfig, MAX_TRACKS};
use crate::mixer;
use crate::output::{OutputConfig, OutputSink};
use crate::stream::SharedStream;
use crate::track::{Refill, TrackEvent, TrackSlot};
use crate::wav::{self, PcmLayout, SourceFormat};
use crate::{MixerError, Result};
use std::sync::Arc;

/// Counters collected while the engine runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Mix cycles executed
    pub cycles: u64,
    /// Blocks accepted by the sink
    pub blocks_written: u64,
    /// Blocks the sink rejected
    pub write_failures: u64,
    /// Looping slots rewound at end of stream
    pub loop_restarts: u64,
    /// Slots stopped because their stream ended
    pub end_of_stream_stops: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Stopped,
    Running,
    Cancelling,
}

/// Multi-track mixing engine writing to an [`OutputSink`]
pub struct MixEngine<S: OutputSink> {
    config: EngineConfig,
    sink: S,
    slots: [TrackSlot; MAX_TRACKS],
    lifecycle: Lifecycle,
    in_cycle: bool,
    mix_buffer: Vec<i16>,
    /// Raw bytes of one slot refill
    scratch: Vec<u8>,
    event_callback: Option<EventCallback<S>>,
    stats: EngineStats,
}

impl<S: OutputSink> MixEngine<S> {
    /// Create an engine. The sink is not touched until [`start`](Self::start).
    pub fn new(config: EngineConfig, sink: S) -> Result<Self> {
        config.validate()?;
        Ok(MixEngine {
            config,
            sink,
            slots: std::array::from_fn(|_| TrackSlot::new()),
            lifecycle: Lifecycle::Stopped,
            in_cycle: false,
            mix_buffer: vec![0; config.block_size],
            scratch: Vec::new(),
            event_callback: None,
            stats: EngineStats::default(),
        })
    }

    /// Acquire the output and allocate slot buffers.
    ///
    /// Succeeds without doing anything when already running. When the sink
    /// refuses its configuration nothing is allocated.
    pub fn start(&mut self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Running => return Ok(()),
            Lifecycle::Cancelling => {
                return Err(MixerError::Other("engine is shutting down".into()));
            }
            Lifecycle::Stopped => {}
        }

        self.sink.configure(&OutputConfig::from(&self.config))?;
        self.lifecycle = Lifecycle::Running;

        if let Err(e) = self.allocate_buffers() {
            log::error!("engine start failed, rolling back: {e}");
            self.cancel();
            return Err(e);
        }

        log::info!(
            "mix engine started: {} Hz, {} samples per block, {} tracks",
            self.config.sample_rate,
            self.config.block_size,
            MAX_TRACKS
        );
        Ok(())
    }

    fn allocate_buffers(&mut self) -> Result<()> {
        let block_size = self.config.block_size;
        let mut scratch = Vec::new();
        scratch.try_reserve_exact(block_size * 2).map_err(|e| {
            MixerError::Allocation(format!("refill buffer of {} bytes: {e}", block_size * 2))
        })?;
        scratch.resize(block_size * 2, 0);
        self.scratch = scratch;

        for slot in &mut self.slots {
            slot.allocate(block_size)?;
        }
        Ok(())
    }

    /// Stop every track, free the slot buffers and release the output.
    ///
    /// Returns `false` when there was nothing to cancel.
    pub fn cancel(&mut self) -> bool {
        if self.lifecycle != Lifecycle::Running {
            return false;
        }
        self.lifecycle = Lifecycle::Cancelling;

        for track in 0..MAX_TRACKS {
            self.stop(track);
        }
        for slot in &mut self.slots {
            slot.clear();
            slot.release();
        }
        self.scratch = Vec::new();
        self.sink.release();

        self.lifecycle = Lifecycle::Stopped;
        log::info!("mix engine cancelled");
        true
    }

    /// True between a successful `start` and `cancel`
    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    /// Start `stream` on `track` once. Returns `false` on any failure.
    pub fn play(&mut self, track: usize, stream: SharedStream, format: SourceFormat) -> bool {
        self.activate(track, stream, format, false)
            .map_err(|e| log::warn!("play on track {track} failed: {e}"))
            .is_ok()
    }

    /// Start `stream` on `track`, restarting it at every end of stream
    pub fn play_looped(&mut self, track: usize, stream: SharedStream, format: SourceFormat) -> bool {
        self.activate(track, stream, format, true)
            .map_err(|e| log::warn!("loop on track {track} failed: {e}"))
            .is_ok()
    }

    /// [`play`](Self::play) reporting why it failed and where the PCM data was found
    pub fn try_play(
        &mut self,
        track: usize,
        stream: SharedStream,
        format: SourceFormat,
    ) -> Result<PcmLayout> {
        self.activate(track, stream, format, false)
    }

    /// [`play_looped`](Self::play_looped) reporting why it failed
    pub fn try_play_looped(
        &mut self,
        track: usize,
        stream: SharedStream,
        format: SourceFormat,
    ) -> Result<PcmLayout> {
        self.activate(track, stream, format, true)
    }

    fn activate(
        &mut self,
        track: usize,
        stream: SharedStream,
        format: SourceFormat,
        looping: bool,
    ) -> Result<PcmLayout> {
        if track >= MAX_TRACKS {
            return Err(MixerError::InvalidTrack(track));
        }
        if self.lifecycle != Lifecycle::Running {
            return Err(MixerError::NotRunning);
        }

        let layout = {
            let mut guard = stream.lock();
            wav::locate_pcm(&mut *guard, format)?
        };
        if let Some(fmt) = layout.format {
            if fmt.sample_rate != self.config.sample_rate {
                log::warn!(
                    "track {track}: source is {} Hz, engine runs at {} Hz",
                    fmt.sample_rate,
                    self.config.sample_rate
                );
            }
        }

        self.slots[track].activate(stream, layout, looping);
        log::debug!(
            "track {track} started at offset {} (looping: {looping})",
            layout.data_offset
        );
        self.emit(track, TrackEvent::Started);
        Ok(layout)
    }

    /// Pause an active track. No-op when inactive or already paused.
    pub fn pause(&mut self, track: usize) {
        if !self.controllable(track) {
            return;
        }
        let slot = &mut self.slots[track];
        if !slot.is_active() || slot.paused {
            return;
        }
        slot.paused = true;
        log::debug!("track {track} paused");
        self.emit(track, TrackEvent::Paused);
    }

    /// Resume a paused track. No-op when inactive or not paused.
    pub fn resume(&mut self, track: usize) {
        if !self.controllable(track) {
            return;
        }
        let slot = &mut self.slots[track];
        if !slot.is_active() || !slot.paused {
            return;
        }
        slot.paused = false;
        log::debug!("track {track} resumed");
        self.emit(track, TrackEvent::Resumed);
    }

    /// Stop a track. Only an active track emits `Stopped`.
    pub fn stop(&mut self, track: usize) {
        if !self.controllable(track) || !self.slots[track].is_active() {
            return;
        }
        self.slots[track].clear();
        log::debug!("track {track} stopped");
        self.emit(track, TrackEvent::Stopped);
    }

    /// Set a track's target volume, clamped to [0, 1]
    pub fn set_volume(&mut self, track: usize, volume: f32) {
        if self.controllable(track) {
            self.slots[track].set_volume(volume);
        }
    }

    /// Target volume of a track.
    ///
    /// Reads 0 for an invalid index or while the engine is not started. The
    /// stored volume survives `cancel` and reads back after the next `start`.
    pub fn volume(&self, track: usize) -> f32 {
        self.readable(track).map_or(0.0, TrackSlot::volume)
    }

    /// Current fade-in gain of a track, 0 for an invalid index or a stopped engine
    pub fn fade_volume(&self, track: usize) -> f32 {
        self.readable(track).map_or(0.0, TrackSlot::fade_volume)
    }

    /// Track is active and not paused
    pub fn is_playing(&self, track: usize) -> bool {
        self.readable(track).is_some_and(TrackSlot::is_audible)
    }

    /// Track is active and paused
    pub fn is_paused(&self, track: usize) -> bool {
        self.readable(track)
            .is_some_and(|slot| slot.is_active() && slot.paused)
    }

    /// Number of active tracks, paused ones included
    pub fn active_tracks(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_active()).count()
    }

    /// Read-only view of a slot
    pub fn track(&self, track: usize) -> Option<&TrackSlot> {
        self.slots.get(track)
    }

    /// Subscribe to track events, replacing any previous subscriber
    ///
    /// Takes effect immediately, also when called from inside a notification.
    pub fn on_event<F>(&mut self, callback: F)
    where
        F: Fn(&mut MixEngine<S>, usize, TrackEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(Arc::new(callback));
    }

    /// Remove the event subscriber
    pub fn clear_event_callback(&mut self) {
        self.event_callback = None;
    }

    /// True when a subscriber is registered
    pub fn has_event_callback(&self) -> bool {
        self.event_callback.is_some()
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Output sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Output sink, mutably
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Counters since construction
    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    fn controllable(&self, track: usize) -> bool {
        track < MAX_TRACKS && self.lifecycle != Lifecycle::Stopped
    }

    fn readable(&self, track: usize) -> Option<&TrackSlot> {
        if self.lifecycle == Lifecycle::Stopped {
            return None;
        }
        self.slots.get(track)
    }

    /// Run one mix cycle.
    ///
    /// Refills and mixes every active, unpaused track, then writes the block if
    /// any track produced samples. Returns `false` when the engine is not running.
    pub fn tick(&mut self) -> bool {
        if self.lifecycle != Lifecycle::Running || self.in_cycle {
            return false;
        }
        self.in_cycle = true;
        self.stats.cycles += 1;
        self.mix_buffer.fill(0);

        let mut produced = false;
        for track in 0..MAX_TRACKS {
            // A subscriber may have cancelled the engine
            if self.lifecycle != Lifecycle::Running {
                break;
            }
            if !self.slots[track].is_audible() {
                continue;
            }
            if self.slots[track].needs_refill() && !self.refill(track) {
                continue;
            }

            let slot = &mut self.slots[track];
            let gain = slot.fade_volume();
            let samples = slot.take_pending();
            produced |= !samples.is_empty();
            mixer::accumulate(
                &mut self.mix_buffer,
                samples,
                gain,
                self.config.accumulation,
            );
            let fade = mixer::advance_fade(gain, slot.volume(), self.config.fade_step);
            slot.set_fade_volume(fade);
        }

        if produced && self.lifecycle == Lifecycle::Running {
            match self.sink.write(&self.mix_buffer) {
                Ok(_) => self.stats.blocks_written += 1,
                Err(e) => {
                    self.stats.write_failures += 1;
                    log::warn!("output write failed: {e}");
                }
            }
        }

        self.in_cycle = false;
        true
    }

    /// Refill a slot, handling end of stream. Returns `true` when samples are ready.
    fn refill(&mut self, track: usize) -> bool {
        if let Refill::Filled(_) = self.slots[track].refill(&mut self.scratch) {
            return true;
        }

        if !self.slots[track].looping {
            self.stats.end_of_stream_stops += 1;
            self.stop(track);
            return false;
        }

        self.stats.loop_restarts += 1;
        if let Err(e) = self.slots[track].rewind() {
            log::warn!("track {track}: rewind failed: {e}");
            self.stats.end_of_stream_stops += 1;
            self.stop(track);
            return false;
        }
        match self.slots[track].refill(&mut self.scratch) {
            Refill::Filled(_) => {
                log::trace!("track {track} looped");
                true
            }
            Refill::EndOfStream => {
                log::warn!("track {track}: looping source has no PCM data");
                self.stats.end_of_stream_stops += 1;
                self.stop(track);
                false
            }
        }
    }
}

impl<S: OutputSink> Drop for MixEngine<S> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<S: OutputSink> std::fmt::Debug for MixEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixEngine")
            .field("config", &self.config)
            .field("lifecycle", &self.lifecycle)
            .field("slots", &self.slots)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
