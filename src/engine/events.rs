//! Track event notification
//!
//! One optional subscriber is called synchronously from the call that caused the
//! transition. There is no queueing: the subscriber receives the engine itself and
//! may call back into it, e.g. to start the next track from a `Stopped`
//! notification. Events raised by those nested calls reach the subscriber inline,
//! before the nested call returns.
//!
//! Subscribers are shared `Fn` handles so a nested notification can run while an
//! outer one is still on the stack. Keep subscriber state behind a lock or an
//! atomic. A subscriber that reacts to its own events with the call that raised
//! them recurses without bound.

use super::MixEngine;
use crate::output::OutputSink;
use crate::track::TrackEvent;
use std::sync::Arc;

/// Subscriber for track state transitions
pub type EventCallback<S> = Arc<dyn Fn(&mut MixEngine<S>, usize, TrackEvent) + Send + Sync>;

impl<S: OutputSink> MixEngine<S> {
    pub(crate) fn emit(&mut self, track: usize, event: TrackEvent) {
        if let Some(callback) = self.event_callback.clone() {
            callback(self, track, event);
        }
    }
}
