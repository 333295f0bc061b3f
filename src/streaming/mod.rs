//! Real-time output to the system audio device
//!
//! Enabled by the `streaming` feature. [`DeviceSink`] implements
//! [`crate::OutputSink`] on top of rodio, buffering a few mix blocks ahead of the
//! device in a [`RingBuffer`].

mod device;
mod ring_buffer;

pub use device::DeviceSink;
pub use ring_buffer::RingBuffer;

/// Back-off between retries while the ring buffer is full, in microseconds
pub const BUFFER_BACKOFF_MICROS: u64 = 100;
