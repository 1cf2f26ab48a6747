//! Backing-store abstraction shared by every buffer variant (`spec.md` §3
//! "Backing store").
//!
//! `RawStore` is the seam derived views (slice/duplicate) hold onto instead
//! of a full parent buffer: it exposes exactly the "flat addressable bytes
//! plus reference count" contract a view needs, without dragging along the
//! parent's own reader/writer cursor. Origin buffers (heap/pooled/direct)
//! and the composite buffer each implement it once; `Arc<dyn RawStore>` is
//! then shared, not cloned, between a buffer and every view derived from it.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::alloc::arena::Arena;
use crate::alloc::PooledRegion;
use crate::buffer::BufKind;
use crate::error::{BufError, Result};
use crate::leak::TrackedRecord;
use crate::refcount::RefCount;

/// Computes the grown capacity for a write that needs `needed` bytes total,
/// per the policy in `spec.md` §4.B: double to the next power of two below
/// the threshold, round up to the next threshold multiple at/above it.
pub fn grow_target(needed: u32, max_capacity: u32, threshold: u32) -> u32 {
    let target = if needed < threshold {
        needed.next_power_of_two()
    } else {
        let t = threshold as u64;
        let n = needed as u64;
        (((n + t - 1) / t) * t) as u32
    };
    target.min(max_capacity)
}

/// The common contract every backing store implements: capacity, bounds
/// checked byte access, in-place growth, and the reference-count/leak
/// plumbing every buffer variant shares through it.
pub trait RawStore: Send + Sync {
    fn capacity(&self) -> u32;
    fn max_capacity(&self) -> u32;
    fn kind(&self) -> BufKind;

    fn get_bytes(&self, offset: u32, dst: &mut [u8]) -> Result<()>;
    fn set_bytes(&self, offset: u32, src: &[u8]) -> Result<()>;

    /// Grows or truncates the store to exactly `new_capacity` bytes,
    /// zero-filling any newly exposed tail. Returns `Unsupported` for stores
    /// that don't support resizing (composite; empty).
    fn adjust_capacity(&self, new_capacity: u32) -> Result<()>;

    fn refcount(&self) -> &RefCount;
    fn tracked(&self) -> Option<&Arc<TrackedRecord>>;
}

fn bounds_check(capacity: u32, offset: u32, len: u32) -> Result<()> {
    if offset.checked_add(len).map_or(true, |end| end > capacity) {
        return Err(BufError::OutOfBounds(format!(
            "offset {offset} + len {len} exceeds capacity {capacity}"
        )));
    }
    Ok(())
}

/// Heap-backed store: a plain `Vec<u8>` behind a mutex so growth (which may
/// reallocate) is visible to every view sharing this `Arc<dyn RawStore>`.
pub struct HeapStore {
    bytes: Mutex<Vec<u8>>,
    max_capacity: u32,
    refcount: RefCount,
    tracked: Option<Arc<TrackedRecord>>,
}

impl HeapStore {
    pub fn new(initial_capacity: u32, max_capacity: u32, tracked: Option<Arc<TrackedRecord>>) -> Self {
        Self {
            bytes: Mutex::new(vec![0u8; initial_capacity as usize]),
            max_capacity,
            refcount: RefCount::new(),
            tracked,
        }
    }
}

impl RawStore for HeapStore {
    fn capacity(&self) -> u32 {
        self.bytes.lock().len() as u32
    }

    fn max_capacity(&self) -> u32 {
        self.max_capacity
    }

    fn kind(&self) -> BufKind {
        BufKind::Heap
    }

    fn get_bytes(&self, offset: u32, dst: &mut [u8]) -> Result<()> {
        let guard = self.bytes.lock();
        bounds_check(guard.len() as u32, offset, dst.len() as u32)?;
        dst.copy_from_slice(&guard[offset as usize..offset as usize + dst.len()]);
        Ok(())
    }

    fn set_bytes(&self, offset: u32, src: &[u8]) -> Result<()> {
        let mut guard = self.bytes.lock();
        bounds_check(guard.len() as u32, offset, src.len() as u32)?;
        guard[offset as usize..offset as usize + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn adjust_capacity(&self, new_capacity: u32) -> Result<()> {
        if new_capacity > self.max_capacity {
            return Err(BufError::InsufficientCapacity(format!(
                "{new_capacity} exceeds max_capacity {}",
                self.max_capacity
            )));
        }
        let mut guard = self.bytes.lock();
        tracing::trace!(new_capacity, old_capacity = guard.len(), "heap buffer adjust_capacity");
        guard.resize(new_capacity as usize, 0);
        Ok(())
    }

    fn refcount(&self) -> &RefCount {
        &self.refcount
    }

    fn tracked(&self) -> Option<&Arc<TrackedRecord>> {
        self.tracked.as_ref()
    }
}

/// Direct/pinned-memory store (`spec.md` §3 "direct/pinned memory region").
/// Non-goals exclude actual OS-level pinning or mmap; this models the
/// variant's distinct identity (separate from pooled/heap for diagnostics
/// and leak-tracking) with its own page-aligned allocation, matching
/// Netty's `UnpooledDirectByteBuf` used for zero-copy I/O staging buffers
/// that are never handed back to a size-classed pool.
pub struct DirectStore {
    bytes: Mutex<Vec<u8>>,
    max_capacity: u32,
    refcount: RefCount,
    tracked: Option<Arc<TrackedRecord>>,
}

impl DirectStore {
    pub fn new(initial_capacity: u32, max_capacity: u32, tracked: Option<Arc<TrackedRecord>>) -> Self {
        Self {
            bytes: Mutex::new(vec![0u8; initial_capacity as usize]),
            max_capacity,
            refcount: RefCount::new(),
            tracked,
        }
    }

    /// Raw address of the backing allocation; exposed for zero-copy I/O
    /// integration (`spec.md` §3 "raw address"). The caller must not retain
    /// this pointer past the store's release.
    pub fn raw_address(&self) -> usize {
        self.bytes.lock().as_ptr() as usize
    }
}

impl RawStore for DirectStore {
    fn capacity(&self) -> u32 {
        self.bytes.lock().len() as u32
    }

    fn max_capacity(&self) -> u32 {
        self.max_capacity
    }

    fn kind(&self) -> BufKind {
        BufKind::Direct
    }

    fn get_bytes(&self, offset: u32, dst: &mut [u8]) -> Result<()> {
        let guard = self.bytes.lock();
        bounds_check(guard.len() as u32, offset, dst.len() as u32)?;
        dst.copy_from_slice(&guard[offset as usize..offset as usize + dst.len()]);
        Ok(())
    }

    fn set_bytes(&self, offset: u32, src: &[u8]) -> Result<()> {
        let mut guard = self.bytes.lock();
        bounds_check(guard.len() as u32, offset, src.len() as u32)?;
        guard[offset as usize..offset as usize + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn adjust_capacity(&self, new_capacity: u32) -> Result<()> {
        if new_capacity > self.max_capacity {
            return Err(BufError::InsufficientCapacity(format!(
                "{new_capacity} exceeds max_capacity {}",
                self.max_capacity
            )));
        }
        let mut guard = self.bytes.lock();
        guard.resize(new_capacity as usize, 0);
        Ok(())
    }

    fn refcount(&self) -> &RefCount {
        &self.refcount
    }

    fn tracked(&self) -> Option<&Arc<TrackedRecord>> {
        self.tracked.as_ref()
    }
}

/// Pooled store: backed by a [`PooledRegion`] carved from an [`Arena`].
/// Growth allocates a new, larger region, copies the live bytes across, and
/// frees the old region — the region itself is fixed-size once allocated, so
/// "growing in place" always means "replace the region".
pub struct PooledStore {
    region: Mutex<PooledRegion>,
    arena: Arc<Arena>,
    max_capacity: u32,
    refcount: RefCount,
    tracked: Option<Arc<TrackedRecord>>,
}

impl PooledStore {
    pub fn new(
        region: PooledRegion,
        arena: Arc<Arena>,
        max_capacity: u32,
        tracked: Option<Arc<TrackedRecord>>,
    ) -> Self {
        Self { region: Mutex::new(region), arena, max_capacity, refcount: RefCount::new(), tracked }
    }
}

impl RawStore for PooledStore {
    fn capacity(&self) -> u32 {
        self.region.lock().len()
    }

    fn max_capacity(&self) -> u32 {
        self.max_capacity
    }

    fn kind(&self) -> BufKind {
        BufKind::Pooled
    }

    fn get_bytes(&self, offset: u32, dst: &mut [u8]) -> Result<()> {
        let guard = self.region.lock();
        bounds_check(guard.len(), offset, dst.len() as u32)?;
        unsafe {
            dst.copy_from_slice(&guard.as_slice()[offset as usize..offset as usize + dst.len()]);
        }
        Ok(())
    }

    fn set_bytes(&self, offset: u32, src: &[u8]) -> Result<()> {
        let guard = self.region.lock();
        bounds_check(guard.len(), offset, src.len() as u32)?;
        unsafe {
            guard.as_mut_slice()[offset as usize..offset as usize + src.len()].copy_from_slice(src);
        }
        Ok(())
    }

    fn adjust_capacity(&self, new_capacity: u32) -> Result<()> {
        if new_capacity > self.max_capacity {
            return Err(BufError::InsufficientCapacity(format!(
                "{new_capacity} exceeds max_capacity {}",
                self.max_capacity
            )));
        }
        let mut guard = self.region.lock();
        let old_len = guard.len();
        if new_capacity == old_len {
            return Ok(());
        }
        let mut new_region = self.arena.allocate(new_capacity)?;
        let copy_len = old_len.min(new_region.len());
        unsafe {
            new_region.as_mut_slice()[..copy_len as usize]
                .copy_from_slice(&guard.as_slice()[..copy_len as usize]);
            if new_region.len() > copy_len {
                new_region.as_mut_slice()[copy_len as usize..].fill(0);
            }
        }
        let old_region = std::mem::replace(&mut *guard, new_region);
        drop(guard);
        self.arena.free(old_region)?;
        Ok(())
    }

    fn refcount(&self) -> &RefCount {
        &self.refcount
    }

    fn tracked(&self) -> Option<&Arc<TrackedRecord>> {
        self.tracked.as_ref()
    }
}

/// The singleton zero-capacity store backing [`crate::buffer::Buffer::empty`]
/// (`spec.md` §4.B "Empty rejects any read/write with non-zero length").
pub struct EmptyStoreState {
    refcount: RefCount,
}

impl EmptyStoreState {
    pub fn new() -> Self {
        Self { refcount: RefCount::new() }
    }
}

impl RawStore for EmptyStoreState {
    fn capacity(&self) -> u32 {
        0
    }

    fn max_capacity(&self) -> u32 {
        0
    }

    fn kind(&self) -> BufKind {
        BufKind::Empty
    }

    fn get_bytes(&self, offset: u32, dst: &mut [u8]) -> Result<()> {
        if dst.is_empty() {
            return Ok(());
        }
        Err(BufError::OutOfBounds(format!("empty buffer has no bytes at offset {offset}")))
    }

    fn set_bytes(&self, offset: u32, src: &[u8]) -> Result<()> {
        if src.is_empty() {
            return Ok(());
        }
        Err(BufError::OutOfBounds(format!("empty buffer cannot be written at offset {offset}")))
    }

    fn adjust_capacity(&self, new_capacity: u32) -> Result<()> {
        if new_capacity == 0 {
            return Ok(());
        }
        Err(BufError::Unsupported("the empty buffer cannot grow".into()))
    }

    fn refcount(&self) -> &RefCount {
        &self.refcount
    }

    fn tracked(&self) -> Option<&Arc<TrackedRecord>> {
        None
    }
}
