//! Pooled slab/buddy allocator (`spec.md` §2 components G–J).
//!
//! Allocation flow: `Arena` → thread-cache fast path → subpage (tiny/small)
//! or chunk (normal) → the result is wrapped by [`crate::buffer::pooled`] into
//! a buffer. Free reverses: buffer drop → reference count reaches zero →
//! thread cache or direct arena free. Organized the way `rusty-db` lays out
//! `src/memory/allocator/*` — one file per concern, re-exported from this
//! module root.

pub mod arena;
pub mod chunk;
pub mod size_class;
pub mod subpage;
pub mod thread_cache;

use std::ptr::NonNull;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::alloc::chunk::{Chunk, Handle};
use arena::Arena;

/// One allocated region handed back to a caller: a raw byte range inside a
/// shared [`Chunk`], plus everything [`Arena::free`] needs to return it.
///
/// Safety: the region's byte range is disjoint from every other outstanding
/// allocation in the same chunk (buddy-tree and bitmap invariants guarantee
/// this), so handing out a raw pointer here does not alias any other live
/// `PooledRegion`. The chunk's backing `Box<[u8]>` never moves or resizes
/// for the chunk's lifetime, which the `Arc<Mutex<Chunk>>` this region holds
/// keeps alive.
pub struct PooledRegion {
    pub(crate) chunk: Arc<Mutex<Chunk>>,
    pub(crate) handle: Handle,
    pub(crate) ptr: NonNull<u8>,
    pub(crate) len: u32,
    pub(crate) arena: Arc<Arena>,
}

unsafe impl Send for PooledRegion {}

impl PooledRegion {
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// # Safety
    /// Caller must not retain the slice past the region's free.
    pub unsafe fn as_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(self.ptr.as_ptr(), self.len as usize)
    }

    /// # Safety
    /// Caller must not retain the slice past the region's free, and must not
    /// alias it with another live reference to the same region.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_mut_slice(&self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len as usize)
    }

    pub fn arena(&self) -> &Arc<Arena> {
        &self.arena
    }
}
