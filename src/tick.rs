//! Scheduler seam
//!
//! A periodic scheduler (timer interrupt, audio callback, a plain loop) drives
//! anything implementing [`Tick`] at the output block rate.

use crate::engine::MixEngine;
use crate::output::OutputSink;
use crate::Result;

/// Periodically driven task
pub trait Tick {
    /// Acquire resources. Idempotent.
    fn start(&mut self) -> Result<()>;

    /// Release resources. Returns `false` when there was nothing to release.
    fn cancel(&mut self) -> bool;

    /// Run one cycle. Returns `false` when the task is not running.
    fn tick(&mut self) -> bool;
}

impl<S: OutputSink> Tick for MixEngine<S> {
    fn start(&mut self) -> Result<()> {
        MixEngine::start(self)
    }

    fn cancel(&mut self) -> bool {
        MixEngine::cancel(self)
    }

    fn tick(&mut self) -> bool {
        MixEngine::tick(self)
    }
}

/// Tick `task` until `done` returns true or `max_cycles` cycles have run.
///
/// Returns the number of cycles executed. Stops early if the task stops running.
pub fn run_until<T, F>(task: &mut T, max_cycles: Option<u64>, mut done: F) -> u64
where
    T: Tick + ?Sized,
    F: FnMut(&T) -> bool,
{
    let mut cycles = 0;
    while !done(task) && max_cycles.map_or(true, |max| cycles < max) {
        if !task.tick() {
            break;
        }
        cycles += 1;
    }
    cycles
}
