//! Composite buffer (`spec.md` §4.D): a logical byte range over an ordered,
//! gap-free list of component buffers, located by binary search on
//! `(offset, end_offset)` rather than a linear scan.
//!
//! The component list lives behind [`CompositeStore`], which itself
//! implements [`RawStore`] so a slice or duplicate taken of a composite
//! shares the exact same "flat addressable bytes plus reference count" seam
//! every other buffer variant exposes (`buffer::store` module doc).
//! `CompositeBuf` then just pairs that store with its own independent
//! [`Cursor`], the same shape as [`super::StoreBuf`].

use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::cursor::Cursor;
use crate::buffer::gate_accessible;
use crate::buffer::store::RawStore;
use crate::buffer::{BufKind, Buffer};
use crate::error::{BufError, Result};
use crate::leak::{Hint, TrackedRecord};
use crate::refcount::RefCount;

fn bounds_check(capacity: u32, offset: u32, len: u32) -> Result<()> {
    if offset.checked_add(len).map_or(true, |end| end > capacity) {
        return Err(BufError::OutOfBounds(format!(
            "offset {offset} + len {len} exceeds composite capacity {capacity}"
        )));
    }
    Ok(())
}

/// One entry of the component list: an owned child buffer plus its
/// composite-relative `[offset, end_offset)` window. `length` is the child's
/// own `capacity` at the time it was added — the addressable span composite
/// reads/writes translate into child-absolute indices.
struct Component {
    buf: Buffer,
    offset: u32,
    end_offset: u32,
    length: u32,
}

struct CompositeInner {
    components: Vec<Component>,
    max_num_components: usize,
}

impl CompositeInner {
    fn capacity(&self) -> u32 {
        self.components.last().map_or(0, |c| c.end_offset)
    }

    /// Binary search on `(offset, end_offset)` pairs (`spec.md` §4.D
    /// "component_at_offset"): worst case O(log n).
    fn component_index_at(&self, offset: u32) -> Result<usize> {
        self.components
            .binary_search_by(|c| {
                if offset < c.offset {
                    Ordering::Greater
                } else if offset >= c.end_offset {
                    Ordering::Less
                } else {
                    Ordering::Equal
                }
            })
            .map_err(|_| BufError::OutOfBounds(format!("no component covers offset {offset}")))
    }

    /// Recomputes `offset`/`end_offset` for every component from `from`
    /// onward, maintaining "`components[i].offset == components[i-1].end_offset`,
    /// `components[0].offset == 0`" (`spec.md` §4.D "Offset invariant").
    fn recompute_offsets(&mut self, from: usize) {
        let mut offset = if from == 0 { 0 } else { self.components[from - 1].end_offset };
        for c in self.components[from..].iter_mut() {
            c.offset = offset;
            c.end_offset = offset + c.length;
            offset = c.end_offset;
        }
    }

    fn get_bytes_into(&self, index: u32, dst: &mut [u8]) -> Result<()> {
        bounds_check(self.capacity(), index, dst.len() as u32)?;
        let mut pos = index;
        let mut written = 0usize;
        while written < dst.len() {
            let idx = self.component_index_at(pos)?;
            let comp = &self.components[idx];
            let rel = pos - comp.offset;
            let avail = comp.length - rel;
            let take = (dst.len() - written).min(avail as usize);
            comp.buf.get_bytes_into(rel, &mut dst[written..written + take])?;
            pos += take as u32;
            written += take;
        }
        Ok(())
    }

    fn set_bytes_from(&mut self, index: u32, src: &[u8]) -> Result<()> {
        bounds_check(self.capacity(), index, src.len() as u32)?;
        let mut pos = index;
        let mut consumed = 0usize;
        while consumed < src.len() {
            let idx = self.component_index_at(pos)?;
            let comp = &mut self.components[idx];
            let rel = pos - comp.offset;
            let avail = comp.length - rel;
            let take = (src.len() - consumed).min(avail as usize);
            comp.buf.set_bytes_from(rel, &src[consumed..consumed + take])?;
            pos += take as u32;
            consumed += take;
        }
        Ok(())
    }

    /// `consolidate([cIndex, n])` (`spec.md` §4.D): replaces `n` components
    /// starting at `c_index` with a single flat heap buffer holding their
    /// concatenated readable bytes, releasing the originals exactly once.
    fn consolidate_range(&mut self, c_index: usize, n: usize) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        if c_index + n > self.components.len() {
            return Err(BufError::OutOfBounds(format!(
                "consolidate range [{c_index}, {c_index}+{n}) exceeds {} components",
                self.components.len()
            )));
        }
        if n <= 1 {
            return Ok(());
        }
        let start_offset = self.components[c_index].offset;
        let end_offset = self.components[c_index + n - 1].end_offset;
        let total_len = end_offset - start_offset;

        let mut merged = Buffer::heap(total_len, total_len)?;
        let mut write_off = 0u32;
        for comp in &self.components[c_index..c_index + n] {
            let bytes = comp.buf.get_bytes(0, comp.length)?;
            merged.set_bytes(write_off, &bytes)?;
            write_off += comp.length;
        }
        merged.set_writer_index(total_len)?;

        let removed: Vec<Component> = self
            .components
            .splice(
                c_index..c_index + n,
                std::iter::once(Component { buf: merged, offset: start_offset, end_offset, length: total_len }),
            )
            .collect();
        for comp in removed {
            comp.buf.release()?;
        }
        self.recompute_offsets(c_index);
        Ok(())
    }

    /// `spec.md` §4.D "Auto-consolidation policy": collapse everything into
    /// one component once the list outgrows `max_num_components`.
    fn maybe_auto_consolidate(&mut self) -> Result<()> {
        if self.components.len() > self.max_num_components {
            let n = self.components.len();
            self.consolidate_range(0, n)?;
        }
        Ok(())
    }
}

/// The flat-store face of a composite: what a [`super::SliceBuf`] or
/// duplicate taken of a composite actually shares and retains, via
/// [`CompositeBuf::store_handle`].
struct CompositeStore {
    inner: Mutex<CompositeInner>,
    refcount: RefCount,
    tracked: Option<Arc<TrackedRecord>>,
}

impl RawStore for CompositeStore {
    fn capacity(&self) -> u32 {
        self.inner.lock().capacity()
    }

    fn max_capacity(&self) -> u32 {
        // A composite's ceiling is whatever its components currently sum to;
        // it never grows except via add_component (spec.md §4.D), so there is
        // no separate max_capacity distinct from capacity.
        self.capacity()
    }

    fn kind(&self) -> BufKind {
        BufKind::Composite
    }

    fn get_bytes(&self, offset: u32, dst: &mut [u8]) -> Result<()> {
        self.inner.lock().get_bytes_into(offset, dst)
    }

    fn set_bytes(&self, offset: u32, src: &[u8]) -> Result<()> {
        self.inner.lock().set_bytes_from(offset, src)
    }

    fn adjust_capacity(&self, _new_capacity: u32) -> Result<()> {
        Err(BufError::Unsupported(
            "composite capacity changes only through add/remove/consolidate component".into(),
        ))
    }

    fn refcount(&self) -> &RefCount {
        &self.refcount
    }

    fn tracked(&self) -> Option<&Arc<TrackedRecord>> {
        self.tracked.as_ref()
    }
}

/// Public composite buffer (`spec.md` §4.D). Pairs a [`CompositeStore`] with
/// its own cursor, the same "shared store + independent cursor" shape every
/// other buffer variant uses.
pub struct CompositeBuf {
    store: Arc<CompositeStore>,
    cursor: Cursor,
}

impl CompositeBuf {
    /// `max_num_components` must be `>= 2` (`spec.md` §9 constructor-arg
    /// validation): a composite with fewer couldn't usefully hold more than
    /// one component before auto-consolidating it away.
    pub fn new(max_num_components: usize) -> Result<Self> {
        if max_num_components < 2 {
            return Err(BufError::OutOfBounds(format!(
                "max_num_components must be >= 2, got {max_num_components}"
            )));
        }
        let tracked = crate::bootstrap::leak_tracker().maybe_track(BufKind::Composite.type_name());
        let store = Arc::new(CompositeStore {
            inner: Mutex::new(CompositeInner { components: Vec::new(), max_num_components }),
            refcount: RefCount::new(),
            tracked,
        });
        Ok(Self { store, cursor: Cursor::new_empty() })
    }

    pub fn capacity(&self) -> u32 {
        self.store.capacity()
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn cursor_mut(&mut self) -> &mut Cursor {
        &mut self.cursor
    }

    /// The `Arc<dyn RawStore>` a slice/duplicate of this composite shares.
    pub fn store_handle(&self) -> Arc<dyn RawStore> {
        self.store.clone() as Arc<dyn RawStore>
    }

    pub fn num_components(&self) -> usize {
        self.store.inner.lock().components.len()
    }

    pub fn get_bytes_into(&self, index: u32, dst: &mut [u8]) -> Result<()> {
        gate_accessible(&self.store.refcount)?;
        self.store.inner.lock().get_bytes_into(index, dst)
    }

    pub fn set_bytes_from(&mut self, index: u32, src: &[u8]) -> Result<()> {
        gate_accessible(&self.store.refcount)?;
        self.store.inner.lock().set_bytes_from(index, src)
    }

    pub fn retain_n(&self, n: u32) -> Result<()> {
        self.store.refcount.retain_n(n)
    }

    pub fn release_n(&self, n: u32) -> Result<bool> {
        let zero = self.store.refcount.release_n(n)?;
        if zero {
            if let Some(record) = &self.store.tracked {
                record.mark_released();
            }
        }
        Ok(zero)
    }

    pub fn ref_count(&self) -> u32 {
        self.store.refcount.get()
    }

    pub fn touch(&self, hint: &str) {
        crate::refcount::touch(self.store.tracked.as_deref(), Hint(hint.to_string()));
    }

    /// `add_component(at, child, advance_writer?)` (`spec.md` §4.D): inserts
    /// at component-index `at`, recomputing every following offset. Ownership
    /// of `child` transfers to the composite; the caller must not separately
    /// release it.
    pub fn add_component(&mut self, at: usize, child: Buffer, advance_writer: bool) -> Result<()> {
        let mut inner = self.store.inner.lock();
        if at > inner.components.len() {
            return Err(BufError::OutOfBounds(format!(
                "component index {at} exceeds {} existing components",
                inner.components.len()
            )));
        }
        let length = child.capacity();
        let readable = child.readable_bytes();
        inner.components.insert(at, Component { buf: child, offset: 0, end_offset: 0, length });
        inner.recompute_offsets(0);
        inner.maybe_auto_consolidate()?;
        let new_capacity = inner.capacity();
        drop(inner);
        self.cursor.clamp_to_capacity(new_capacity);
        if advance_writer {
            self.cursor.advance_writer(readable);
        }
        Ok(())
    }

    /// Appends `child` after the last existing component.
    pub fn append_component(&mut self, child: Buffer, advance_writer: bool) -> Result<()> {
        let at = self.num_components();
        self.add_component(at, child, advance_writer)
    }

    /// `remove_component(at)` (`spec.md` §4.D): releases the removed
    /// component exactly once, recomputes following offsets, and clips
    /// `R`/`W` (never panics) if they now exceed the shrunk capacity.
    pub fn remove_component(&mut self, at: usize) -> Result<()> {
        self.remove_components(at, 1)
    }

    pub fn remove_components(&mut self, at: usize, n: usize) -> Result<()> {
        let mut inner = self.store.inner.lock();
        if n == 0 {
            return Ok(());
        }
        if at + n > inner.components.len() {
            return Err(BufError::OutOfBounds(format!(
                "remove range [{at}, {at}+{n}) exceeds {} components",
                inner.components.len()
            )));
        }
        let removed: Vec<Component> = inner.components.drain(at..at + n).collect();
        inner.recompute_offsets(at);
        let new_capacity = inner.capacity();
        drop(inner);
        for comp in removed {
            comp.buf.release()?;
        }
        self.cursor.clamp_to_capacity(new_capacity);
        Ok(())
    }

    /// Consolidates every component into one flat heap buffer.
    pub fn consolidate(&mut self) -> Result<()> {
        let n = self.num_components();
        self.consolidate_range(0, n)
    }

    /// `consolidate([cIndex, n])` over a sub-range of the component list.
    pub fn consolidate_range(&mut self, c_index: usize, n: usize) -> Result<()> {
        self.store.inner.lock().consolidate_range(c_index, n)
    }

    /// `component_at_offset(offset)` (`spec.md` §4.D): binary-searched
    /// component index covering the absolute `offset`.
    pub fn component_at_offset(&self, offset: u32) -> Result<usize> {
        self.store.inner.lock().component_index_at(offset)
    }

    /// `decompose(offset, length)` (`spec.md` §4.D): a list of slices, each
    /// retaining its source component, spanning `[offset, offset+length)`.
    pub fn decompose(&self, offset: u32, length: u32) -> Result<Vec<Buffer>> {
        let inner = self.store.inner.lock();
        bounds_check(inner.capacity(), offset, length)?;
        let mut result = Vec::new();
        let mut pos = offset;
        let mut remaining = length;
        while remaining > 0 {
            let idx = inner.component_index_at(pos)?;
            let comp = &inner.components[idx];
            let rel = pos - comp.offset;
            let take = remaining.min(comp.length - rel);
            result.push(comp.buf.retained_slice(rel, take)?);
            pos += take;
            remaining -= take;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap_with(bytes: &[u8]) -> Buffer {
        let mut b = Buffer::heap(bytes.len() as u32, bytes.len() as u32).unwrap();
        b.write_bytes(bytes).unwrap();
        b
    }

    #[test]
    fn new_rejects_max_components_below_two() {
        assert!(matches!(CompositeBuf::new(1), Err(BufError::OutOfBounds(_))));
        assert!(CompositeBuf::new(2).is_ok());
    }

    #[test]
    fn s4_composite_decompose_and_remove_scenario() {
        let mut c = CompositeBuf::new(8).unwrap();
        c.append_component(heap_with(b"abc"), true).unwrap();
        c.append_component(heap_with(b"defgh"), true).unwrap();
        c.append_component(heap_with(b"ij"), true).unwrap();
        assert_eq!(c.capacity(), 10);

        let parts = c.decompose(2, 6).unwrap();
        let mut joined = Vec::new();
        for mut p in parts {
            joined.extend(p.read_bytes(p.readable_bytes()).unwrap());
        }
        assert_eq!(joined, b"cdefgh");

        c.remove_component(1).unwrap();
        assert_eq!(c.capacity(), 5);
        let mut dst = vec![0u8; 5];
        c.get_bytes_into(0, &mut dst).unwrap();
        assert_eq!(dst, b"abcij");
    }

    #[test]
    fn property4_decompose_concatenation_matches_get_bytes() {
        let mut c = CompositeBuf::new(8).unwrap();
        c.append_component(heap_with(b"hello"), true).unwrap();
        c.append_component(heap_with(b" world"), true).unwrap();

        let mut expected = vec![0u8; 7];
        c.get_bytes_into(2, &mut expected).unwrap();

        let parts = c.decompose(2, 7).unwrap();
        let mut joined = Vec::new();
        for mut p in parts {
            joined.extend(p.read_bytes(p.readable_bytes()).unwrap());
        }
        assert_eq!(joined, expected);
    }

    #[test]
    fn component_at_offset_binary_searches_correctly() {
        let mut c = CompositeBuf::new(8).unwrap();
        c.append_component(heap_with(b"abc"), true).unwrap();
        c.append_component(heap_with(b"defgh"), true).unwrap();
        assert_eq!(c.component_at_offset(0).unwrap(), 0);
        assert_eq!(c.component_at_offset(2).unwrap(), 0);
        assert_eq!(c.component_at_offset(3).unwrap(), 1);
        assert_eq!(c.component_at_offset(7).unwrap(), 1);
        assert!(c.component_at_offset(8).is_err());
    }

    #[test]
    fn auto_consolidation_collapses_once_limit_exceeded() {
        let mut c = CompositeBuf::new(2).unwrap();
        c.append_component(heap_with(b"aa"), true).unwrap();
        c.append_component(heap_with(b"bb"), true).unwrap();
        assert_eq!(c.num_components(), 2);
        c.append_component(heap_with(b"cc"), true).unwrap();
        assert_eq!(c.num_components(), 1);
        let mut dst = vec![0u8; 6];
        c.get_bytes_into(0, &mut dst).unwrap();
        assert_eq!(dst, b"aabbcc");
    }

    #[test]
    fn consolidate_merges_components_into_one() {
        let mut c = CompositeBuf::new(8).unwrap();
        c.append_component(heap_with(b"foo"), true).unwrap();
        c.append_component(heap_with(b"bar"), true).unwrap();
        c.consolidate().unwrap();
        assert_eq!(c.num_components(), 1);
        let mut dst = vec![0u8; 6];
        c.get_bytes_into(0, &mut dst).unwrap();
        assert_eq!(dst, b"foobar");
    }

    #[test]
    fn remove_clips_reader_writer_without_panicking() {
        let mut c = CompositeBuf::new(8).unwrap();
        c.append_component(heap_with(b"abc"), true).unwrap();
        c.append_component(heap_with(b"defgh"), true).unwrap();
        c.cursor_mut().set_writer_index(8, c.capacity()).unwrap();
        c.cursor_mut().set_reader_index(8).unwrap();
        c.remove_component(1).unwrap();
        assert_eq!(c.capacity(), 3);
        assert_eq!(c.cursor().writer_index(), 3);
        assert_eq!(c.cursor().reader_index(), 3);
    }
}
