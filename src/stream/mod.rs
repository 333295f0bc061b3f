//! Track data sources
//!
//! A track reads its PCM bytes from a [`Stream`]: a sequential byte source with
//! absolute seeking. Anything implementing `Read + Seek` (files, `Cursor`s over
//! in-memory sample banks) is a `Stream`.
//!
//! Streams are owned by the caller. The engine only holds a [`SharedStream`]
//! handle while a slot is active and never mutates a stream outside a mix cycle
//! or a playback-control call.

use parking_lot::Mutex;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

/// Sequential byte source with absolute seeking
pub trait Stream {
    /// Read up to `buf.len()` bytes. Returns 0 at end of stream.
    ///
    /// Short reads are allowed; callers handle partial fills.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Move the cursor to an absolute byte offset
    fn seek(&mut self, pos: u64) -> io::Result<()>;

    /// Current absolute byte offset
    fn position(&mut self) -> io::Result<u64>;
}

impl<T: Read + Seek> Stream for T {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn seek(&mut self, pos: u64) -> io::Result<()> {
        Seek::seek(self, SeekFrom::Start(pos)).map(|_| ())
    }

    fn position(&mut self) -> io::Result<u64> {
        self.stream_position()
    }
}

/// Handle to an externally owned stream
pub type SharedStream = Arc<Mutex<dyn Stream + Send>>;

/// Wrap a stream into a [`SharedStream`] handle.
///
/// Keep a clone of the handle to inspect or reuse the stream after the slot
/// releases it.
pub fn shared<S: Stream + Send + 'static>(stream: S) -> SharedStream {
    Arc::new(Mutex::new(stream))
}

/// Read until `buf` is full or the stream ends. Returns the number of bytes read.
pub fn read_fully(stream: &mut (dyn Stream + Send), buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
