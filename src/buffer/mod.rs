//! Dual-cursor buffer core and its derived-view family (`spec.md` §4.B–§4.D).
//!
//! `spec.md` §9 "Polymorphism" asks for a tagged union with one shared
//! contract rather than deep inheritance. That contract is the [`Buf`]
//! trait; [`Buffer`] is the closed sum type over it. Every variant that
//! shares a flat backing store (heap/pooled/direct origins, and duplicates
//! of any of those) collapses into one struct, [`store::StoreBuf`], because
//! their only behavioral difference is which [`store::RawStore`] impl or
//! diagnostic [`BufKind`] they carry — see `DESIGN.md` for the reasoning.

pub mod composite;
pub mod cursor;
pub mod store;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::codec;
use crate::error::{BufError, Result};
use crate::leak::Hint;
use crate::text::TextCodec;

use cursor::Cursor;
use store::{grow_target, DirectStore, EmptyStoreState, HeapStore, PooledStore, RawStore};

pub use composite::CompositeBuf;

/// Diagnostic/leak-tracker tag for the eight variants `spec.md` §4.B names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufKind {
    Heap,
    Pooled,
    Direct,
    Composite,
    Slice,
    Duplicate,
    Empty,
    Unreleasable,
}

impl BufKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            BufKind::Heap => "HeapBuf",
            BufKind::Pooled => "PooledBuf",
            BufKind::Direct => "DirectBuf",
            BufKind::Composite => "CompositeBuf",
            BufKind::Slice => "SliceBuf",
            BufKind::Duplicate => "DuplicateBuf",
            BufKind::Empty => "EmptyBuf",
            BufKind::Unreleasable => "UnreleasableBuf",
        }
    }
}

pub(crate) fn gate_accessible(refcount: &crate::refcount::RefCount) -> Result<()> {
    if crate::bootstrap::tunables().check_accessible {
        refcount.check_accessible()?;
    }
    Ok(())
}

/// A heap/pooled/direct origin buffer, or a duplicate of any buffer variant:
/// all of these are "a shared store plus an independent cursor", so they
/// share one struct. `is_duplicate` only affects `kind()` (diagnostics) —
/// duplicates otherwise behave exactly like the store they wrap.
pub struct StoreBuf {
    store: Arc<dyn RawStore>,
    cursor: Cursor,
    is_duplicate: bool,
}

impl StoreBuf {
    fn capacity(&self) -> u32 {
        self.store.capacity()
    }

    fn max_capacity(&self) -> u32 {
        self.store.max_capacity()
    }

    fn kind(&self) -> BufKind {
        if self.is_duplicate {
            BufKind::Duplicate
        } else {
            self.store.kind()
        }
    }

    fn get_bytes_into(&self, index: u32, dst: &mut [u8]) -> Result<()> {
        gate_accessible(self.store.refcount())?;
        self.store.get_bytes(index, dst)
    }

    fn set_bytes_from(&mut self, index: u32, src: &[u8]) -> Result<()> {
        gate_accessible(self.store.refcount())?;
        self.store.set_bytes(index, src)
    }

    fn adjust_capacity(&mut self, new_capacity: u32) -> Result<()> {
        let old = self.store.capacity();
        self.store.adjust_capacity(new_capacity)?;
        self.cursor.clamp_to_capacity(new_capacity);
        let _ = old;
        Ok(())
    }

    fn retain_n(&self, n: u32) -> Result<()> {
        self.store.refcount().retain_n(n)
    }

    fn release_n(&self, n: u32) -> Result<bool> {
        let zero = self.store.refcount().release_n(n)?;
        if zero {
            if let Some(record) = self.store.tracked() {
                record.mark_released();
            }
        }
        Ok(zero)
    }

    fn ref_count(&self) -> u32 {
        self.store.refcount().get()
    }

    fn touch(&self, hint: &str) {
        crate::refcount::touch(self.store.tracked(), Hint(hint.to_string()));
    }
}

/// `Slice(parent, offset, length)` (`spec.md` §4.C): `capacity == max_capacity
/// == length`; `adjust_capacity` is unsupported; indices translate into the
/// shared store by adding `base_offset`.
pub struct SliceBuf {
    store: Arc<dyn RawStore>,
    base_offset: u32,
    length: u32,
    cursor: Cursor,
}

impl SliceBuf {
    fn check_in_range(&self, index: u32, len: u32) -> Result<()> {
        if index.checked_add(len).map_or(true, |end| end > self.length) {
            return Err(BufError::OutOfBounds(format!(
                "index {index} + len {len} exceeds slice length {}",
                self.length
            )));
        }
        Ok(())
    }

    fn get_bytes_into(&self, index: u32, dst: &mut [u8]) -> Result<()> {
        self.check_in_range(index, dst.len() as u32)?;
        gate_accessible(self.store.refcount())?;
        self.store.get_bytes(self.base_offset + index, dst)
    }

    fn set_bytes_from(&mut self, index: u32, src: &[u8]) -> Result<()> {
        self.check_in_range(index, src.len() as u32)?;
        gate_accessible(self.store.refcount())?;
        self.store.set_bytes(self.base_offset + index, src)
    }

    fn retain_n(&self, n: u32) -> Result<()> {
        self.store.refcount().retain_n(n)
    }

    fn release_n(&self, n: u32) -> Result<bool> {
        let zero = self.store.refcount().release_n(n)?;
        if zero {
            if let Some(record) = self.store.tracked() {
                record.mark_released();
            }
        }
        Ok(zero)
    }

    fn ref_count(&self) -> u32 {
        self.store.refcount().get()
    }

    fn touch(&self, hint: &str) {
        crate::refcount::touch(self.store.tracked(), Hint(hint.to_string()));
    }
}

/// The closed sum type over every buffer variant `spec.md` §4.B describes.
/// See `store::StoreBuf` doc comment for why Heap/Pooled/Direct/Duplicate
/// share one representation.
pub enum Buffer {
    Store(StoreBuf),
    Slice(SliceBuf),
    Composite(CompositeBuf),
    /// Wraps any other variant (never another `Unreleasable`) behind a lock
    /// so `retain`/`release` become no-ops while reads/writes still work
    /// (`spec.md` §4.C). Used to hand out shared constants/sentinels.
    Unreleasable(Arc<Mutex<Buffer>>),
}

impl Buffer {
    // ---- constructors ----------------------------------------------------

    /// A heap-backed buffer with `capacity == initial_capacity`.
    pub fn heap(initial_capacity: u32, max_capacity: u32) -> Result<Self> {
        if initial_capacity > max_capacity {
            return Err(BufError::OutOfBounds(format!(
                "initial_capacity {initial_capacity} exceeds max_capacity {max_capacity}"
            )));
        }
        let tracked = crate::bootstrap::leak_tracker().maybe_track(BufKind::Heap.type_name());
        let store: Arc<dyn RawStore> = Arc::new(HeapStore::new(initial_capacity, max_capacity, tracked));
        Ok(Buffer::Store(StoreBuf { store, cursor: Cursor::new_empty(), is_duplicate: false }))
    }

    /// A direct/pinned buffer (`spec.md` §3); see `store::DirectStore`.
    pub fn direct(initial_capacity: u32, max_capacity: u32) -> Result<Self> {
        if initial_capacity > max_capacity {
            return Err(BufError::OutOfBounds(format!(
                "initial_capacity {initial_capacity} exceeds max_capacity {max_capacity}"
            )));
        }
        let tracked = crate::bootstrap::leak_tracker().maybe_track(BufKind::Direct.type_name());
        let store: Arc<dyn RawStore> = Arc::new(DirectStore::new(initial_capacity, max_capacity, tracked));
        Ok(Buffer::Store(StoreBuf { store, cursor: Cursor::new_empty(), is_duplicate: false }))
    }

    /// A slab-pooled buffer carved from `arena` (`spec.md` §4.I).
    pub fn pooled(arena: Arc<crate::alloc::arena::Arena>, initial_capacity: u32, max_capacity: u32) -> Result<Self> {
        if initial_capacity > max_capacity {
            return Err(BufError::OutOfBounds(format!(
                "initial_capacity {initial_capacity} exceeds max_capacity {max_capacity}"
            )));
        }
        let region = arena.allocate(initial_capacity)?;
        let tracked = crate::bootstrap::leak_tracker().maybe_track(BufKind::Pooled.type_name());
        let store: Arc<dyn RawStore> = Arc::new(PooledStore::new(region, arena, max_capacity, tracked));
        Ok(Buffer::Store(StoreBuf { store, cursor: Cursor::new_empty(), is_duplicate: false }))
    }

    /// The shared zero-capacity sentinel (`spec.md` §4.B "Empty").
    pub fn empty() -> Self {
        let store: Arc<dyn RawStore> = Arc::new(EmptyStoreState::new());
        Buffer::Store(StoreBuf { store, cursor: Cursor::new_empty(), is_duplicate: false })
    }

    /// Wraps `inner` so `retain`/`release` become no-ops (`spec.md` §4.C).
    pub fn unreleasable(inner: Buffer) -> Self {
        Buffer::Unreleasable(Arc::new(Mutex::new(inner)))
    }

    // ---- required-method dispatch -----------------------------------------

    pub fn capacity(&self) -> u32 {
        match self {
            Buffer::Store(b) => b.capacity(),
            Buffer::Slice(b) => b.length,
            Buffer::Composite(b) => b.capacity(),
            Buffer::Unreleasable(inner) => inner.lock().capacity(),
        }
    }

    pub fn max_capacity(&self) -> u32 {
        match self {
            Buffer::Store(b) => b.max_capacity(),
            Buffer::Slice(b) => b.length,
            Buffer::Composite(b) => b.capacity(),
            Buffer::Unreleasable(inner) => inner.lock().max_capacity(),
        }
    }

    pub fn kind(&self) -> BufKind {
        match self {
            Buffer::Store(b) => b.kind(),
            Buffer::Slice(_) => BufKind::Slice,
            Buffer::Composite(_) => BufKind::Composite,
            Buffer::Unreleasable(_) => BufKind::Unreleasable,
        }
    }

    pub fn reader_index(&self) -> u32 {
        match self {
            Buffer::Store(b) => b.cursor.reader_index(),
            Buffer::Slice(b) => b.cursor.reader_index(),
            Buffer::Composite(b) => b.cursor().reader_index(),
            Buffer::Unreleasable(inner) => inner.lock().reader_index(),
        }
    }

    pub fn writer_index(&self) -> u32 {
        match self {
            Buffer::Store(b) => b.cursor.writer_index(),
            Buffer::Slice(b) => b.cursor.writer_index(),
            Buffer::Composite(b) => b.cursor().writer_index(),
            Buffer::Unreleasable(inner) => inner.lock().writer_index(),
        }
    }

    pub fn set_reader_index(&mut self, index: u32) -> Result<()> {
        match self {
            Buffer::Store(b) => b.cursor.set_reader_index(index),
            Buffer::Slice(b) => b.cursor.set_reader_index(index),
            Buffer::Composite(b) => b.cursor_mut().set_reader_index(index),
            Buffer::Unreleasable(inner) => inner.lock().set_reader_index(index),
        }
    }

    pub fn set_writer_index(&mut self, index: u32) -> Result<()> {
        let capacity = self.capacity();
        match self {
            Buffer::Store(b) => b.cursor.set_writer_index(index, capacity),
            Buffer::Slice(b) => b.cursor.set_writer_index(index, capacity),
            Buffer::Composite(b) => b.cursor_mut().set_writer_index(index, capacity),
            Buffer::Unreleasable(inner) => inner.lock().set_writer_index(index),
        }
    }

    pub fn mark_reader_index(&mut self) {
        match self {
            Buffer::Store(b) => b.cursor.mark_reader(),
            Buffer::Slice(b) => b.cursor.mark_reader(),
            Buffer::Composite(b) => b.cursor_mut().mark_reader(),
            Buffer::Unreleasable(inner) => inner.lock().mark_reader_index(),
        }
    }

    pub fn reset_reader_index(&mut self) -> Result<()> {
        match self {
            Buffer::Store(b) => b.cursor.reset_reader(),
            Buffer::Slice(b) => b.cursor.reset_reader(),
            Buffer::Composite(b) => b.cursor_mut().reset_reader(),
            Buffer::Unreleasable(inner) => inner.lock().reset_reader_index(),
        }
    }

    pub fn mark_writer_index(&mut self) {
        match self {
            Buffer::Store(b) => b.cursor.mark_writer(),
            Buffer::Slice(b) => b.cursor.mark_writer(),
            Buffer::Composite(b) => b.cursor_mut().mark_writer(),
            Buffer::Unreleasable(inner) => inner.lock().mark_writer_index(),
        }
    }

    pub fn reset_writer_index(&mut self) -> Result<()> {
        let capacity = self.capacity();
        match self {
            Buffer::Store(b) => b.cursor.reset_writer(capacity),
            Buffer::Slice(b) => b.cursor.reset_writer(capacity),
            Buffer::Composite(b) => b.cursor_mut().reset_writer(capacity),
            Buffer::Unreleasable(inner) => inner.lock().reset_writer_index(),
        }
    }

    /// `clear` (`spec.md` §4.B): `R = W = 0`, memory untouched.
    pub fn clear(&mut self) {
        match self {
            Buffer::Store(b) => b.cursor.clear(),
            Buffer::Slice(b) => b.cursor.clear(),
            Buffer::Composite(b) => b.cursor_mut().clear(),
            Buffer::Unreleasable(inner) => inner.lock().clear(),
        }
    }

    pub fn adjust_capacity(&mut self, new_capacity: u32) -> Result<()> {
        match self {
            Buffer::Store(b) => b.adjust_capacity(new_capacity),
            Buffer::Slice(_) => {
                Err(BufError::Unsupported("adjust_capacity is unsupported on a slice view".into()))
            }
            Buffer::Composite(_) => Err(BufError::Unsupported(
                "composite capacity changes only through add/remove/consolidate component".into(),
            )),
            Buffer::Unreleasable(inner) => inner.lock().adjust_capacity(new_capacity),
        }
    }

    pub fn get_bytes_into(&self, index: u32, dst: &mut [u8]) -> Result<()> {
        match self {
            Buffer::Store(b) => b.get_bytes_into(index, dst),
            Buffer::Slice(b) => b.get_bytes_into(index, dst),
            Buffer::Composite(b) => b.get_bytes_into(index, dst),
            Buffer::Unreleasable(inner) => inner.lock().get_bytes_into(index, dst),
        }
    }

    pub fn set_bytes_from(&mut self, index: u32, src: &[u8]) -> Result<()> {
        match self {
            Buffer::Store(b) => b.set_bytes_from(index, src),
            Buffer::Slice(b) => b.set_bytes_from(index, src),
            Buffer::Composite(b) => b.set_bytes_from(index, src),
            Buffer::Unreleasable(inner) => inner.lock().set_bytes_from(index, src),
        }
    }

    pub fn retain(&self) -> Result<()> {
        self.retain_n(1)
    }

    pub fn retain_n(&self, n: u32) -> Result<()> {
        match self {
            Buffer::Store(b) => b.retain_n(n),
            Buffer::Slice(b) => b.retain_n(n),
            Buffer::Composite(b) => b.retain_n(n),
            Buffer::Unreleasable(_) => Ok(()),
        }
    }

    pub fn release(&self) -> Result<bool> {
        self.release_n(1)
    }

    pub fn release_n(&self, n: u32) -> Result<bool> {
        match self {
            Buffer::Store(b) => b.release_n(n),
            Buffer::Slice(b) => b.release_n(n),
            Buffer::Composite(b) => b.release_n(n),
            Buffer::Unreleasable(_) => Ok(false),
        }
    }

    pub fn ref_count(&self) -> u32 {
        match self {
            Buffer::Store(b) => b.ref_count(),
            Buffer::Slice(b) => b.ref_count(),
            Buffer::Composite(b) => b.ref_count(),
            Buffer::Unreleasable(inner) => inner.lock().ref_count(),
        }
    }

    pub fn touch(&self, hint: &str) {
        match self {
            Buffer::Store(b) => b.touch(hint),
            Buffer::Slice(b) => b.touch(hint),
            Buffer::Composite(b) => b.touch(hint),
            Buffer::Unreleasable(inner) => inner.lock().touch(hint),
        }
    }

    // ---- derived views -----------------------------------------------------

    /// `Slice(parent, offset, length)` (`spec.md` §4.C). Does not retain the
    /// parent — see `retained_slice` for the variant that does.
    pub fn slice(&self, offset: u32, length: u32) -> Result<Buffer> {
        if offset.checked_add(length).map_or(true, |end| end > self.capacity()) {
            return Err(BufError::OutOfBounds(format!(
                "slice({offset}, {length}) exceeds capacity {}",
                self.capacity()
            )));
        }
        match self {
            Buffer::Store(b) => Ok(Buffer::Slice(SliceBuf {
                store: b.store.clone(),
                base_offset: offset,
                length,
                cursor: Cursor::new_full(length),
            })),
            Buffer::Slice(b) => Ok(Buffer::Slice(SliceBuf {
                store: b.store.clone(),
                base_offset: b.base_offset + offset,
                length,
                cursor: Cursor::new_full(length),
            })),
            Buffer::Composite(b) => Ok(Buffer::Slice(SliceBuf {
                store: b.store_handle(),
                base_offset: offset,
                length,
                cursor: Cursor::new_full(length),
            })),
            Buffer::Unreleasable(inner) => {
                Ok(Buffer::unreleasable(inner.lock().slice(offset, length)?))
            }
        }
    }

    /// `retained_slice`: builds the slice and retains the parent once more,
    /// so the caller owns an extra reference it must release itself.
    pub fn retained_slice(&self, offset: u32, length: u32) -> Result<Buffer> {
        let view = self.slice(offset, length)?;
        view.retain()?;
        Ok(view)
    }

    /// `Duplicate(parent)` (`spec.md` §4.C): full parent capacity, independent cursor.
    pub fn duplicate(&self) -> Result<Buffer> {
        match self {
            Buffer::Store(b) => Ok(Buffer::Store(StoreBuf {
                store: b.store.clone(),
                cursor: Cursor::new_full(b.cursor.writer_index()).also_reader(b.cursor.reader_index()),
                is_duplicate: true,
            })),
            Buffer::Slice(b) => Ok(Buffer::Slice(SliceBuf {
                store: b.store.clone(),
                base_offset: b.base_offset,
                length: b.length,
                cursor: b.cursor,
            })),
            Buffer::Composite(b) => Ok(Buffer::Store(StoreBuf {
                store: b.store_handle(),
                cursor: Cursor::new_full(b.cursor().writer_index()).also_reader(b.cursor().reader_index()),
                is_duplicate: true,
            })),
            Buffer::Unreleasable(inner) => Ok(Buffer::unreleasable(inner.lock().duplicate()?)),
        }
    }

    pub fn retained_duplicate(&self) -> Result<Buffer> {
        let view = self.duplicate()?;
        view.retain()?;
        Ok(view)
    }

    // ---- byte-width accessors (absolute) ------------------------------------

    pub fn get_u8(&self, index: u32) -> Result<u8> {
        let mut b = [0u8; 1];
        self.get_bytes_into(index, &mut b)?;
        Ok(b[0])
    }

    pub fn set_u8(&mut self, index: u32, value: u8) -> Result<()> {
        self.set_bytes_from(index, &[value])
    }

    pub fn get_i8(&self, index: u32) -> Result<i8> {
        Ok(self.get_u8(index)? as i8)
    }

    pub fn set_i8(&mut self, index: u32, value: i8) -> Result<()> {
        self.set_u8(index, value as u8)
    }
}

macro_rules! endian_accessors {
    ($get_be:ident, $get_le:ident, $set_be:ident, $set_le:ident, $t:ty, $len:expr, $codec_read_be:path, $codec_read_le:path, $codec_write_be:path, $codec_write_le:path) => {
        impl Buffer {
            pub fn $get_be(&self, index: u32) -> Result<$t> {
                let mut buf = [0u8; $len];
                self.get_bytes_into(index, &mut buf)?;
                $codec_read_be(&buf, 0)
            }

            pub fn $get_le(&self, index: u32) -> Result<$t> {
                let mut buf = [0u8; $len];
                self.get_bytes_into(index, &mut buf)?;
                $codec_read_le(&buf, 0)
            }

            pub fn $set_be(&mut self, index: u32, value: $t) -> Result<()> {
                let mut buf = [0u8; $len];
                $codec_write_be(&mut buf, 0, value)?;
                self.set_bytes_from(index, &buf)
            }

            pub fn $set_le(&mut self, index: u32, value: $t) -> Result<()> {
                let mut buf = [0u8; $len];
                $codec_write_le(&mut buf, 0, value)?;
                self.set_bytes_from(index, &buf)
            }
        }
    };
}

endian_accessors!(
    get_u16_be, get_u16_le, set_u16_be, set_u16_le, u16, 2,
    codec::read_u16_be, codec::read_u16_le, codec::write_u16_be, codec::write_u16_le
);
endian_accessors!(
    get_i16_be, get_i16_le, set_i16_be, set_i16_le, i16, 2,
    codec::read_i16_be, codec::read_i16_le, codec::write_i16_be, codec::write_i16_le
);
endian_accessors!(
    get_u24_be, get_u24_le, set_u24_be, set_u24_le, u32, 3,
    codec::read_u24_be, codec::read_u24_le, codec::write_u24_be, codec::write_u24_le
);
endian_accessors!(
    get_i24_be, get_i24_le, set_i24_be, set_i24_le, i32, 3,
    codec::read_i24_be, codec::read_i24_le, codec::write_i24_be, codec::write_i24_le
);
endian_accessors!(
    get_u32_be, get_u32_le, set_u32_be, set_u32_le, u32, 4,
    codec::read_u32_be, codec::read_u32_le, codec::write_u32_be, codec::write_u32_le
);
endian_accessors!(
    get_i32_be, get_i32_le, set_i32_be, set_i32_le, i32, 4,
    codec::read_i32_be, codec::read_i32_le, codec::write_i32_be, codec::write_i32_le
);
endian_accessors!(
    get_u64_be, get_u64_le, set_u64_be, set_u64_le, u64, 8,
    codec::read_u64_be, codec::read_u64_le, codec::write_u64_be, codec::write_u64_le
);
endian_accessors!(
    get_i64_be, get_i64_le, set_i64_be, set_i64_le, i64, 8,
    codec::read_i64_be, codec::read_i64_le, codec::write_i64_be, codec::write_i64_le
);
endian_accessors!(
    get_f32_be, get_f32_le, set_f32_be, set_f32_le, f32, 4,
    codec::read_f32_be, codec::read_f32_le, codec::write_f32_be, codec::write_f32_le
);
endian_accessors!(
    get_f64_be, get_f64_le, set_f64_be, set_f64_le, f64, 8,
    codec::read_f64_be, codec::read_f64_le, codec::write_f64_be, codec::write_f64_le
);

macro_rules! relative_accessors {
    ($read_be:ident, $read_le:ident, $write_be:ident, $write_le:ident, $get_be:ident, $get_le:ident, $set_be:ident, $set_le:ident, $t:ty, $len:expr) => {
        impl Buffer {
            pub fn $read_be(&mut self) -> Result<$t> {
                let idx = self.prepare_read($len)?;
                let v = self.$get_be(idx)?;
                self.advance_reader($len);
                Ok(v)
            }

            pub fn $read_le(&mut self) -> Result<$t> {
                let idx = self.prepare_read($len)?;
                let v = self.$get_le(idx)?;
                self.advance_reader($len);
                Ok(v)
            }

            pub fn $write_be(&mut self, value: $t) -> Result<()> {
                let idx = self.prepare_write($len)?;
                self.$set_be(idx, value)?;
                self.advance_writer($len);
                Ok(())
            }

            pub fn $write_le(&mut self, value: $t) -> Result<()> {
                let idx = self.prepare_write($len)?;
                self.$set_le(idx, value)?;
                self.advance_writer($len);
                Ok(())
            }
        }
    };
}

relative_accessors!(
    read_u16_be, read_u16_le, write_u16_be, write_u16_le,
    get_u16_be, get_u16_le, set_u16_be, set_u16_le, u16, 2
);
relative_accessors!(
    read_i16_be, read_i16_le, write_i16_be, write_i16_le,
    get_i16_be, get_i16_le, set_i16_be, set_i16_le, i16, 2
);
relative_accessors!(
    read_u24_be, read_u24_le, write_u24_be, write_u24_le,
    get_u24_be, get_u24_le, set_u24_be, set_u24_le, u32, 3
);
relative_accessors!(
    read_i24_be, read_i24_le, write_i24_be, write_i24_le,
    get_i24_be, get_i24_le, set_i24_be, set_i24_le, i32, 3
);
relative_accessors!(
    read_u32_be, read_u32_le, write_u32_be, write_u32_le,
    get_u32_be, get_u32_le, set_u32_be, set_u32_le, u32, 4
);
relative_accessors!(
    read_i32_be, read_i32_le, write_i32_be, write_i32_le,
    get_i32_be, get_i32_le, set_i32_be, set_i32_le, i32, 4
);
relative_accessors!(
    read_u64_be, read_u64_le, write_u64_be, write_u64_le,
    get_u64_be, get_u64_le, set_u64_be, set_u64_le, u64, 8
);
relative_accessors!(
    read_i64_be, read_i64_le, write_i64_be, write_i64_le,
    get_i64_be, get_i64_le, set_i64_be, set_i64_le, i64, 8
);
relative_accessors!(
    read_f32_be, read_f32_le, write_f32_be, write_f32_le,
    get_f32_be, get_f32_le, set_f32_be, set_f32_le, f32, 4
);
relative_accessors!(
    read_f64_be, read_f64_le, write_f64_be, write_f64_le,
    get_f64_be, get_f64_le, set_f64_be, set_f64_le, f64, 8
);

impl Buffer {
    pub fn read_u8(&mut self) -> Result<u8> {
        let idx = self.prepare_read(1)?;
        let v = self.get_u8(idx)?;
        self.advance_reader(1);
        Ok(v)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        let idx = self.prepare_write(1)?;
        self.set_u8(idx, value)?;
        self.advance_writer(1);
        Ok(())
    }

    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_u8(value as u8)
    }

    // ---- cursor-advancing plumbing shared by every relative accessor --------

    fn check_readable(&self, len: u32) -> Result<()> {
        let r = self.reader_index();
        let w = self.writer_index();
        if r.checked_add(len).map_or(true, |end| end > w) {
            return Err(BufError::OutOfBounds(format!(
                "read of {len} bytes at reader {r} exceeds writer {w}"
            )));
        }
        Ok(())
    }

    /// Validates the read precondition and returns the absolute index to
    /// read from, without advancing the cursor (callers do that after the
    /// concrete get succeeds, keeping "no partial state on error" true).
    fn prepare_read(&self, len: u32) -> Result<u32> {
        self.check_readable(len)?;
        Ok(self.reader_index())
    }

    fn advance_reader(&mut self, len: u32) {
        match self {
            Buffer::Store(b) => b.cursor.advance_reader(len),
            Buffer::Slice(b) => b.cursor.advance_reader(len),
            Buffer::Composite(b) => b.cursor_mut().advance_reader(len),
            Buffer::Unreleasable(inner) => inner.lock().advance_reader(len),
        }
    }

    /// Validates/performs the growth policy for a write of `len` bytes
    /// (`spec.md` §4.B "Write: W + len <= max_capacity; ... buffer MUST
    /// grow"), returning the absolute index to write at.
    fn prepare_write(&mut self, len: u32) -> Result<u32> {
        let w = self.writer_index();
        let max_capacity = self.max_capacity();
        let needed = w.checked_add(len).ok_or_else(|| {
            BufError::OutOfBounds(format!("write of {len} bytes at writer {w} overflows"))
        })?;
        if needed > max_capacity {
            return Err(BufError::InsufficientCapacity(format!(
                "write of {len} bytes at writer {w} would exceed max_capacity {max_capacity}"
            )));
        }
        if needed > self.capacity() {
            let target = grow_target(needed, max_capacity, crate::config::Tunables::GROWTH_THRESHOLD);
            self.adjust_capacity(target)?;
        }
        Ok(w)
    }

    fn advance_writer(&mut self, len: u32) {
        match self {
            Buffer::Store(b) => b.cursor.advance_writer(len),
            Buffer::Slice(b) => b.cursor.advance_writer(len),
            Buffer::Composite(b) => b.cursor_mut().advance_writer(len),
            Buffer::Unreleasable(inner) => inner.lock().advance_writer(len),
        }
    }

    // ---- derived scalars -----------------------------------------------------

    pub fn readable_bytes(&self) -> u32 {
        self.writer_index() - self.reader_index()
    }

    pub fn writable_bytes(&self) -> u32 {
        self.capacity() - self.writer_index()
    }

    pub fn max_writable_bytes(&self) -> u32 {
        self.max_capacity() - self.writer_index()
    }

    pub fn is_readable(&self) -> bool {
        self.readable_bytes() > 0
    }

    pub fn is_writable(&self) -> bool {
        self.writer_index() < self.capacity()
    }

    // ---- bulk byte transfer ----------------------------------------------------

    pub fn get_bytes(&self, index: u32, len: u32) -> Result<Vec<u8>> {
        let mut out = vec![0u8; len as usize];
        self.get_bytes_into(index, &mut out)?;
        Ok(out)
    }

    pub fn set_bytes(&mut self, index: u32, src: &[u8]) -> Result<()> {
        self.set_bytes_from(index, src)
    }

    pub fn read_bytes(&mut self, len: u32) -> Result<Vec<u8>> {
        let idx = self.prepare_read(len)?;
        let out = self.get_bytes(idx, len)?;
        self.advance_reader(len);
        Ok(out)
    }

    pub fn write_bytes(&mut self, src: &[u8]) -> Result<()> {
        let len = src.len() as u32;
        let idx = self.prepare_write(len)?;
        self.set_bytes_from(idx, src)?;
        self.advance_writer(len);
        Ok(())
    }

    /// Transfers `len` readable bytes from `self` into `dst`'s writable
    /// region, through one intermediate copy (`spec.md` §4.B "Bulk
    /// transfer"). Composite sources/destinations walk their components
    /// transparently since `get_bytes_into`/`set_bytes_from` already do.
    pub fn transfer_to(&mut self, dst: &mut Buffer, len: u32) -> Result<()> {
        let bytes = self.read_bytes(len)?;
        dst.write_bytes(&bytes)
    }

    // ---- zero-fill --------------------------------------------------------------

    /// Zero-fills `len` bytes starting at the absolute `index`.
    pub fn set_zero(&mut self, index: u32, len: u32) -> Result<()> {
        let zeros = vec![0u8; len as usize];
        self.set_bytes_from(index, &zeros)
    }

    // ---- search -------------------------------------------------------------------

    /// `index_of(from, to, byte)` (`spec.md` §4.B): linear scan, forward if
    /// `from <= to`, reverse otherwise. Returns the sentinel `-1` on miss.
    pub fn index_of(&self, from: u32, to: u32, byte: u8) -> Result<i64> {
        if from <= to {
            for i in from..to {
                if self.get_u8(i)? == byte {
                    return Ok(i as i64);
                }
            }
        } else {
            let mut i = from;
            while i > to {
                if self.get_u8(i)? == byte {
                    return Ok(i as i64);
                }
                i -= 1;
            }
        }
        Ok(-1)
    }

    /// `for_each_byte(range, processor)` (`spec.md` §4.B): stops and returns
    /// the visited index on the first `false` from `processor`.
    pub fn for_each_byte(&self, from: u32, to: u32, mut processor: impl FnMut(u8) -> bool) -> Result<Option<u32>> {
        for i in from..to {
            if !processor(self.get_u8(i)?) {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    pub fn for_each_byte_desc(&self, from: u32, to: u32, mut processor: impl FnMut(u8) -> bool) -> Result<Option<u32>> {
        let mut i = from;
        while i > to {
            if !processor(self.get_u8(i)?) {
                return Ok(Some(i));
            }
            i -= 1;
        }
        Ok(None)
    }

    // ---- compaction ---------------------------------------------------------------

    /// `discard_read_bytes` (`spec.md` §4.B): shifts `[R, W)` down to
    /// `[0, W-R)`.
    pub fn discard_read_bytes(&mut self) -> Result<()> {
        let r = self.reader_index();
        let w = self.writer_index();
        if r == 0 {
            return Ok(());
        }
        let readable = self.get_bytes(r, w - r)?;
        self.set_bytes_from(0, &readable)?;
        match self {
            Buffer::Store(b) => {
                b.cursor.discard_read();
            }
            Buffer::Slice(b) => {
                b.cursor.discard_read();
            }
            Buffer::Composite(b) => {
                b.cursor_mut().discard_read();
            }
            Buffer::Unreleasable(inner) => inner.lock().discard_read_bytes()?,
        }
        tracing::trace!(shifted = r, "discard_read_bytes compacted buffer");
        Ok(())
    }

    /// `discard_some_read_bytes`: only compacts once the reader has consumed
    /// at least half of capacity.
    pub fn discard_some_read_bytes(&mut self) -> Result<()> {
        let should = match self {
            Buffer::Store(b) => b.cursor.should_discard_some(b.capacity()),
            Buffer::Slice(b) => b.cursor.should_discard_some(b.length),
            Buffer::Composite(b) => b.cursor().should_discard_some(b.capacity()),
            Buffer::Unreleasable(inner) => {
                let g = inner.lock();
                g.reader_index() >= g.capacity() / 2
            }
        };
        if should {
            tracing::debug!("discard_some_read_bytes hint triggered compaction");
            self.discard_read_bytes()?;
        }
        Ok(())
    }

    // ---- string transcoding --------------------------------------------------------

    /// UTF-8 fast path (`spec.md` §6): the core writes directly rather than
    /// round-tripping through a `TextCodec`, since it knows the exact byte
    /// count from `str::len`.
    pub fn write_utf8(&mut self, s: &str) -> Result<()> {
        self.write_bytes(s.as_bytes())
    }

    pub fn read_utf8(&mut self, len: u32) -> Result<String> {
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|e| BufError::Unsupported(format!("invalid utf8: {e}")))
    }

    /// ASCII fast path: every `char` must fit in one byte.
    pub fn write_ascii(&mut self, s: &str) -> Result<()> {
        if !s.is_ascii() {
            return Err(BufError::Unsupported("write_ascii called with non-ascii input".into()));
        }
        self.write_bytes(s.as_bytes())
    }

    pub fn read_ascii(&mut self, len: u32) -> Result<String> {
        let bytes = self.read_bytes(len)?;
        Ok(bytes.iter().map(|&b| b as char).collect())
    }

    /// Generic path through an abstract `TextCodec` (`spec.md` §6), for
    /// encodings the buffer core has no built-in fast path for.
    pub fn write_string(&mut self, s: &str, codec: &dyn TextCodec) -> Result<()> {
        let mut scratch = vec![0u8; codec.max_bytes_for_chars(s.chars().count())];
        let n = codec.encode(s, &mut scratch)?;
        self.write_bytes(&scratch[..n])
    }

    pub fn read_string(&mut self, len: u32, codec: &dyn TextCodec) -> Result<String> {
        let bytes = self.read_bytes(len)?;
        codec.decode(&bytes)
    }

    // ---- stream transfer ------------------------------------------------------

    /// `set_bytes_async` (`spec.md` §5, §6): fills `len` bytes at the absolute
    /// `index` from `source`, in bounded chunks so `token` is checked between
    /// them rather than between individual bytes. On `IoFailure` or
    /// cancellation, no partial chunk is left half-written — the error just
    /// reports how many whole bytes landed before the source stopped handing
    /// them over; the caller-visible writer index (if this was a relative
    /// write) is only ever advanced by `write_bytes_async`, never here.
    pub fn set_bytes_from_stream(
        &mut self,
        index: u32,
        len: u32,
        source: &mut dyn crate::io::ByteSource,
        token: Option<&crate::io::CancellationToken>,
    ) -> Result<u32> {
        const CHUNK: usize = 8192;
        let mut scratch = vec![0u8; CHUNK.min(len.max(1) as usize)];
        let mut done = 0u32;
        while done < len {
            if token.is_some_and(|t| t.is_cancelled()) {
                break;
            }
            let want = ((len - done) as usize).min(scratch.len());
            match source.read(&mut scratch[..want], want)? {
                None => break,
                Some(0) => break,
                Some(n) => {
                    self.set_bytes_from(index + done, &scratch[..n])?;
                    done += n as u32;
                }
            }
        }
        Ok(done)
    }

    /// `write_bytes_async` (`spec.md` §5, §6): relative write variant of
    /// [`Self::set_bytes_from_stream`] — advances `W` by exactly the number of
    /// bytes actually transferred, never past it, even on cancellation or
    /// `IoFailure` partway through.
    pub fn write_bytes_async(
        &mut self,
        len: u32,
        source: &mut dyn crate::io::ByteSource,
        token: Option<&crate::io::CancellationToken>,
    ) -> Result<u32> {
        let idx = self.prepare_write(len)?;
        let transferred = self.set_bytes_from_stream(idx, len, source, token)?;
        self.advance_writer(transferred);
        Ok(transferred)
    }

    /// Relative read variant draining `len` readable bytes into `sink`
    /// (`spec.md` §5, §6). `R` advances only by the bytes actually handed to
    /// `sink`.
    pub fn read_bytes_async(
        &mut self,
        len: u32,
        sink: &mut dyn crate::io::ByteSink,
        token: Option<&crate::io::CancellationToken>,
    ) -> Result<u32> {
        self.check_readable(len)?;
        const CHUNK: usize = 8192;
        let start = self.reader_index();
        let mut done = 0u32;
        while done < len {
            if token.is_some_and(|t| t.is_cancelled()) {
                break;
            }
            let take = ((len - done) as usize).min(CHUNK) as u32;
            let bytes = self.get_bytes(start + done, take)?;
            sink.write(&bytes, bytes.len())?;
            done += take;
        }
        self.advance_reader(done);
        Ok(done)
    }
}

impl Cursor {
    fn also_reader(mut self, reader: u32) -> Self {
        let _ = self.set_reader_index(reader);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_endian_writer_reader_scenario() {
        let mut b = Buffer::heap(16, 16).unwrap();
        b.write_i32_be(0x0A0B0C0D).unwrap();
        b.write_i32_le(0x0A0B0C0D).unwrap();
        let bytes = b.get_bytes(0, 8).unwrap();
        assert_eq!(bytes, vec![0x0A, 0x0B, 0x0C, 0x0D, 0x0D, 0x0C, 0x0B, 0x0A]);
        assert_eq!(b.read_i32_be().unwrap(), 0x0A0B0C0D);
        assert_eq!(b.read_i32_le().unwrap(), 0x0A0B0C0D);
    }

    #[test]
    fn s2_grow_under_max_capacity() {
        let mut b = Buffer::heap(8, 32).unwrap();
        b.write_bytes(&(1u8..=10).collect::<Vec<_>>()).unwrap();
        assert_eq!(b.capacity(), 16);
        b.write_bytes(&(11u8..=32).collect::<Vec<_>>()).unwrap();
        assert_eq!(b.capacity(), 32);
        assert!(matches!(b.write_u8(99), Err(BufError::InsufficientCapacity(_))));
    }

    #[test]
    fn s3_slice_independence() {
        let mut b = Buffer::heap(32, 32).unwrap();
        b.write_utf8("hello world").unwrap();
        let mut s = b.slice(6, 5).unwrap();
        assert_eq!(s.read_utf8(5).unwrap(), "world");
        assert_eq!(b.reader_index(), 0);
    }

    #[test]
    fn s5_reference_count_scenario() {
        let b = Buffer::heap(64, 64).unwrap();
        b.retain().unwrap();
        b.retain().unwrap();
        assert_eq!(b.ref_count(), 3);
        b.release().unwrap();
        b.release().unwrap();
        assert_eq!(b.ref_count(), 1);
        assert!(b.release().unwrap());
        assert!(matches!(b.get_u8(0), Err(BufError::IllegalReferenceCount(_))));
    }

    #[test]
    fn duplicate_has_independent_cursor_over_shared_storage() {
        let mut b = Buffer::heap(16, 16).unwrap();
        b.write_utf8("abcdef").unwrap();
        let mut dup = b.duplicate().unwrap();
        assert_eq!(dup.read_utf8(6).unwrap(), "abcdef");
        assert_eq!(b.reader_index(), 0);
        dup.set_u8(0, b'Z').unwrap();
        assert_eq!(b.get_u8(0).unwrap(), b'Z');
    }

    #[test]
    fn retain_after_zero_release_fails() {
        let b = Buffer::heap(8, 8).unwrap();
        assert!(b.release().unwrap());
        assert!(matches!(b.retain(), Err(BufError::IllegalReferenceCount(_))));
    }

    #[test]
    fn discard_read_bytes_preserves_readable_window() {
        let mut b = Buffer::heap(16, 16).unwrap();
        b.write_utf8("hello world").unwrap();
        b.read_bytes(6).unwrap();
        let before = b.get_bytes(b.reader_index(), b.readable_bytes()).unwrap();
        b.discard_read_bytes().unwrap();
        assert_eq!(b.reader_index(), 0);
        let after = b.get_bytes(0, b.writer_index()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn empty_buffer_rejects_nonzero_length_access() {
        let mut b = Buffer::empty();
        assert!(matches!(b.write_u8(1), Err(BufError::InsufficientCapacity(_)) | Err(BufError::OutOfBounds(_))));
        assert!(b.get_bytes(0, 0).unwrap().is_empty());
    }

    #[test]
    fn unreleasable_ignores_retain_release() {
        let b = Buffer::unreleasable(Buffer::heap(8, 8).unwrap());
        assert!(!b.release().unwrap());
        assert_eq!(b.ref_count(), 1);
    }

    #[test]
    fn index_of_scans_forward_and_reverse() {
        let mut b = Buffer::heap(8, 8).unwrap();
        b.write_bytes(b"abcabc").unwrap();
        assert_eq!(b.index_of(0, 6, b'c').unwrap(), 2);
        assert_eq!(b.index_of(5, 0, b'c').unwrap(), 5);
        assert_eq!(b.index_of(0, 6, b'z').unwrap(), -1);
    }
}
