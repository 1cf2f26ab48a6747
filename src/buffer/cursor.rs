//! Shared reader/writer index state (`spec.md` §3, §4.B), embedded by value
//! in every non-forwarding [`crate::buffer::Buffer`] variant.
//!
//! Per `spec.md` §9 "Polymorphism": rather than deep inheritance, the common
//! cursor bookkeeping lives in one small struct plus free functions, and each
//! variant just owns a [`Cursor`] field.

use crate::error::{BufError, Result};

/// `reader_index`/`writer_index`/marks (`spec.md` §3). Invariant maintained
/// by every mutator in this module: `0 <= reader <= writer <= capacity`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    reader: u32,
    writer: u32,
    marked_reader: u32,
    marked_writer: u32,
}

impl Cursor {
    /// A cursor for a freshly allocated buffer: `reader = writer = 0`.
    pub fn new_empty() -> Self {
        Self::default()
    }

    /// A cursor positioned as "fully readable": `reader = 0, writer = len`.
    /// Used by views (slice/duplicate) that expose pre-existing content.
    pub fn new_full(len: u32) -> Self {
        Self { reader: 0, writer: len, marked_reader: 0, marked_writer: len }
    }

    pub fn reader_index(&self) -> u32 {
        self.reader
    }

    pub fn writer_index(&self) -> u32 {
        self.writer
    }

    pub fn readable_bytes(&self) -> u32 {
        self.writer - self.reader
    }

    pub fn set_reader_index(&mut self, index: u32) -> Result<()> {
        if index > self.writer {
            return Err(BufError::OutOfBounds(format!(
                "reader index {index} exceeds writer index {}",
                self.writer
            )));
        }
        self.reader = index;
        Ok(())
    }

    pub fn set_writer_index(&mut self, index: u32, capacity: u32) -> Result<()> {
        if index < self.reader {
            return Err(BufError::OutOfBounds(format!(
                "writer index {index} precedes reader index {}",
                self.reader
            )));
        }
        if index > capacity {
            return Err(BufError::OutOfBounds(format!(
                "writer index {index} exceeds capacity {capacity}"
            )));
        }
        self.writer = index;
        Ok(())
    }

    pub fn advance_reader(&mut self, len: u32) {
        self.reader += len;
    }

    pub fn advance_writer(&mut self, len: u32) {
        self.writer += len;
    }

    pub fn mark_reader(&mut self) {
        self.marked_reader = self.reader;
    }

    pub fn reset_reader(&mut self) -> Result<()> {
        self.set_reader_index(self.marked_reader)
    }

    pub fn mark_writer(&mut self) {
        self.marked_writer = self.writer;
    }

    pub fn reset_writer(&mut self, capacity: u32) -> Result<()> {
        self.set_writer_index(self.marked_writer, capacity)
    }

    pub fn clear(&mut self) {
        self.reader = 0;
        self.writer = 0;
    }

    /// Preconditions for a read of `len` bytes starting at the reader index
    /// (`spec.md` §4.B "Read: R + len <= W").
    pub fn check_readable(&self, len: u32) -> Result<()> {
        if self.reader.checked_add(len).map_or(true, |end| end > self.writer) {
            return Err(BufError::OutOfBounds(format!(
                "read of {len} bytes at reader {} exceeds writer {}",
                self.reader, self.writer
            )));
        }
        Ok(())
    }

    /// `discard_read_bytes` (`spec.md` §4.B): shifts `[R, W)` down to
    /// `[0, W-R)` and floors both marks at 0 relative to the shift.
    pub fn discard_read(&mut self) -> u32 {
        let shift = self.reader;
        self.writer -= shift;
        self.reader = 0;
        self.marked_reader = self.marked_reader.saturating_sub(shift);
        self.marked_writer = self.marked_writer.saturating_sub(shift);
        shift
    }

    /// `discard_some_read_bytes`: hint-based variant, only compacts once the
    /// reader has consumed at least half of capacity.
    pub fn should_discard_some(&self, capacity: u32) -> bool {
        self.reader >= capacity / 2
    }

    /// Clamps `reader`/`writer`/marks after `adjust_capacity(new_cap)`
    /// truncates the buffer (`spec.md` §4.B "if n < W, truncate W to n, and R
    /// to n if larger").
    pub fn clamp_to_capacity(&mut self, new_capacity: u32) {
        if self.writer > new_capacity {
            self.writer = new_capacity;
        }
        if self.reader > self.writer {
            self.reader = self.writer;
        }
        self.marked_writer = self.marked_writer.min(new_capacity);
        self.marked_reader = self.marked_reader.min(self.marked_writer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discard_read_shifts_window_to_zero() {
        let mut c = Cursor::new_empty();
        c.set_writer_index(10, 16).unwrap();
        c.set_reader_index(4).unwrap();
        let shift = c.discard_read();
        assert_eq!(shift, 4);
        assert_eq!(c.reader_index(), 0);
        assert_eq!(c.writer_index(), 6);
    }

    #[test]
    fn clamp_truncates_writer_then_reader() {
        let mut c = Cursor::new_empty();
        c.set_writer_index(10, 16).unwrap();
        c.set_reader_index(8).unwrap();
        c.clamp_to_capacity(5);
        assert_eq!(c.writer_index(), 5);
        assert_eq!(c.reader_index(), 5);
    }
}
