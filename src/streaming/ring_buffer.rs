//! Ring buffer between the mix cycle and the audio device
//!
//! One producer (the engine's output write) and one consumer (the rodio source).
//! Memory is fixed at `capacity * size_of::<i16>()`. Positions are atomics so the
//! fill level can be read without taking the buffer lock.

use crate::{MixerError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fixed-capacity sample ring buffer
#[derive(Debug)]
pub struct RingBuffer {
    buffer: Mutex<Vec<i16>>,
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
    /// Power of two
    capacity: usize,
    /// `pos & mask == pos % capacity`
    mask: usize,
}

impl RingBuffer {
    /// Create a ring buffer. Capacity is rounded up to the next power of two.
    ///
    /// # Errors
    ///
    /// Fails for a zero capacity or one above 64 MB worth of samples.
    pub fn new(requested_capacity: usize) -> Result<Self> {
        if requested_capacity == 0 {
            return Err(MixerError::Allocation(
                "Ring buffer capacity must be greater than 0".into(),
            ));
        }

        let capacity = requested_capacity.next_power_of_two();
        const MAX_CAPACITY: usize = 64 * 1024 * 1024 / std::mem::size_of::<i16>();
        if capacity > MAX_CAPACITY {
            return Err(MixerError::Allocation(format!(
                "Ring buffer capacity {capacity} exceeds maximum safe size {MAX_CAPACITY}"
            )));
        }

        Ok(RingBuffer {
            buffer: Mutex::new(vec![0; capacity]),
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
            capacity,
            mask: capacity - 1,
        })
    }

    /// Buffer capacity in samples
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples waiting to be read
    pub fn available_read(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    /// Free space in samples. One slot stays empty to tell full from empty.
    pub fn available_write(&self) -> usize {
        self.capacity - self.available_read() - 1
    }

    /// Write as many samples as fit. Returns the number written (0 when full).
    pub fn write(&self, samples: &[i16]) -> usize {
        let mut buf = self.buffer.lock();

        let write_pos = self.write_pos.load(Ordering::Acquire);
        let read_pos = self.read_pos.load(Ordering::Acquire);
        let available = self.capacity - write_pos.wrapping_sub(read_pos) - 1;

        let to_write = samples.len().min(available);
        if to_write == 0 {
            return 0;
        }

        let write_idx = write_pos & self.mask;
        if write_idx + to_write <= self.capacity {
            buf[write_idx..write_idx + to_write].copy_from_slice(&samples[..to_write]);
        } else {
            let first_part = self.capacity - write_idx;
            buf[write_idx..].copy_from_slice(&samples[..first_part]);
            buf[..to_write - first_part].copy_from_slice(&samples[first_part..to_write]);
        }
        drop(buf);

        self.write_pos
            .store(write_pos.wrapping_add(to_write), Ordering::Release);
        to_write
    }

    /// Read up to `dest.len()` samples. Returns the number read.
    pub fn read(&self, dest: &mut [i16]) -> usize {
        let buf = self.buffer.lock();

        let write_pos = self.write_pos.load(Ordering::Acquire);
        let read_pos = self.read_pos.load(Ordering::Acquire);
        let available = write_pos.wrapping_sub(read_pos);

        let to_read = dest.len().min(available);
        if to_read == 0 {
            return 0;
        }

        let read_idx = read_pos & self.mask;
        if read_idx + to_read <= self.capacity {
            dest[..to_read].copy_from_slice(&buf[read_idx..read_idx + to_read]);
        } else {
            let first_part = self.capacity - read_idx;
            dest[..first_part].copy_from_slice(&buf[read_idx..]);
            dest[first_part..to_read].copy_from_slice(&buf[..to_read - first_part]);
        }
        drop(buf);

        self.read_pos
            .store(read_pos.wrapping_add(to_read), Ordering::Release);
        to_read
    }

    /// Fill level (0.0 to 1.0)
    pub fn fill_percentage(&self) -> f32 {
        self.available_read() as f32 / self.capacity as f32
    }
}
