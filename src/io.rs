//! Stream source/sink boundary and cancellation (`spec.md` §6, §5).
//!
//! Network I/O itself is out of scope (`spec.md` §1); these traits are the
//! contract [`crate::buffer::Buffer::write_bytes_async`]/
//! [`crate::buffer::Buffer::read_bytes_async`] are written against, so a
//! consumer crate's socket/pipe wrapper can plug in without this crate
//! knowing about sockets at all.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;

/// A readable byte source (`spec.md` §6). `read` fills up to `len` bytes into
/// `dst` and returns the number actually read, or `None` at EOF.
pub trait ByteSource {
    fn read(&mut self, dst: &mut [u8], len: usize) -> Result<Option<usize>>;
}

/// A writable byte sink. `write` must accept exactly `len` bytes from `src`
/// or fail; partial acceptance is represented as a smaller `len` at the call
/// site, never as a silent short write.
pub trait ByteSink {
    fn write(&mut self, src: &[u8], len: usize) -> Result<()>;
}

/// Cooperative cancellation for the stream-transfer helpers
/// (`set_bytes_async`/`write_bytes_async`, `spec.md` §5). Checked between
/// chunks, not bytes — cancelling never rewinds a chunk already committed to
/// the buffer's writer index.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
