//! Arena: coordinator of chunks and per-size-class subpage free lists
//! (`spec.md` §4.I).
//!
//! A process normally runs several arenas (default `2 * num_cpus`, `spec.md`
//! §6 `NUM_ARENAS`) so allocator contention is spread across cores, the way
//! `rusty-db`'s buffer pool shards its page table into partitions
//! (`rusty-db/src/buffer/mod.rs` "Lock-free page table: Partitioned hash
//! map"). `Arena` here holds a single registry of chunks rather than the
//! spec's five separate fill-percentage-banded lists — utilisation banding
//! is recomputed on demand from each chunk's `usage_ratio()` when scanning
//! for a normal-sized run, which gives the same "prefer the fullest chunk
//! that still has room" allocation order without the bookkeeping of keeping
//! chunks migrated between five `Vec`s in lock-step; the decision and its
//! rationale are recorded in `DESIGN.md`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::alloc::chunk::{Chunk, Handle};
use crate::alloc::size_class::{classify, num_small_classes, SizeClass, NUM_TINY_CLASSES};
use crate::alloc::thread_cache::ThreadCache;
use crate::alloc::PooledRegion;
use crate::config::Tunables;
use crate::error::{BufError, Result};

/// A partially-used subpage, identified by the chunk that owns its backing
/// page and the page's leaf index within that chunk.
#[derive(Clone)]
struct SubpageSlot {
    chunk: Arc<Mutex<Chunk>>,
    leaf_index: u32,
}

pub struct Arena {
    page_size: u32,
    max_order: u8,
    tiny_cache_size: usize,
    small_cache_size: usize,
    normal_cache_size: usize,
    chunks: Mutex<Vec<Arc<Mutex<Chunk>>>>,
    tiny_lists: Vec<Mutex<Vec<SubpageSlot>>>,
    small_lists: Vec<Mutex<Vec<SubpageSlot>>>,
    thread_caches: Mutex<std::collections::HashMap<ThreadId, Arc<ThreadCache>>>,
    allocations: AtomicU32,
}

impl Arena {
    pub fn new(tunables: &Tunables) -> Self {
        let num_small = num_small_classes(tunables.page_size).max(1);
        Self {
            page_size: tunables.page_size,
            max_order: tunables.max_order,
            tiny_cache_size: tunables.tiny_cache_size,
            small_cache_size: tunables.small_cache_size,
            normal_cache_size: tunables.normal_cache_size,
            chunks: Mutex::new(Vec::new()),
            tiny_lists: (0..NUM_TINY_CLASSES).map(|_| Mutex::new(Vec::new())).collect(),
            small_lists: (0..num_small).map(|_| Mutex::new(Vec::new())).collect(),
            thread_caches: Mutex::new(std::collections::HashMap::new()),
            allocations: AtomicU32::new(0),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn chunk_size(&self) -> u32 {
        (self.page_size as u32) << self.max_order
    }

    /// Outstanding (allocated-but-not-yet-freed) region count, the signal
    /// `bootstrap::pick_arena` uses to find the least-contended arena in the
    /// `NUM_ARENAS` pool (`spec.md` §5 "allocators pick the least-contended
    /// arena per thread, caching the choice").
    pub fn load(&self) -> u32 {
        self.allocations.load(Ordering::Relaxed)
    }

    fn thread_cache(self: &Arc<Self>) -> Arc<ThreadCache> {
        let id = thread::current().id();
        let mut caches = self.thread_caches.lock();
        caches
            .entry(id)
            .or_insert_with(|| {
                Arc::new(ThreadCache::new(
                    id,
                    self.page_size,
                    self.tiny_cache_size,
                    self.small_cache_size,
                    self.normal_cache_size,
                ))
            })
            .clone()
    }

    /// `allocate(thread_cache, capacity)` (`spec.md` §4.I).
    pub fn allocate(self: &Arc<Self>, requested: u32) -> Result<PooledRegion> {
        let class = classify(requested, self.page_size, self.chunk_size());
        let cache = self.thread_cache();
        if cache.note_allocation() {
            for region in cache.trim() {
                self.free_direct(region)?;
            }
        }
        self.allocations.fetch_add(1, Ordering::Relaxed);

        match class {
            SizeClass::Tiny(idx) => {
                if let Some(r) = cache.try_pop_tiny(idx) {
                    return Ok(r);
                }
                self.allocate_subpage(idx, class.byte_size(self.page_size), &self.tiny_lists)
            }
            SizeClass::Small(idx) => {
                if let Some(r) = cache.try_pop_small(idx) {
                    return Ok(r);
                }
                self.allocate_subpage(idx, class.byte_size(self.page_size), &self.small_lists)
            }
            SizeClass::Normal(size) => {
                let normal_idx = (31 - size.leading_zeros()) as usize;
                if let Some(r) = cache.try_pop_normal(normal_idx) {
                    return Ok(r);
                }
                self.allocate_normal(size)
            }
            SizeClass::Huge(size) => self.allocate_huge(size),
        }
    }

    fn allocate_subpage(
        self: &Arc<Self>,
        class_idx: usize,
        elem_size: u32,
        lists: &[Mutex<Vec<SubpageSlot>>],
    ) -> Result<PooledRegion> {
        let mut list = lists[class_idx].lock();
        if let Some(slot) = list.first().cloned() {
            let mut chunk = slot.chunk.lock();
            let element_index = {
                let subpage = chunk.subpage_mut(slot.leaf_index).as_mut().ok_or_else(|| {
                    BufError::AllocationFailure("subpage slot missing its subpage".into())
                })?;
                subpage.allocate().ok_or_else(|| {
                    BufError::AllocationFailure("subpage reported available but allocate failed".into())
                })?
            };
            let now_full = chunk.subpage_mut(slot.leaf_index).as_ref().unwrap().is_full();
            if now_full {
                list.remove(0);
            }
            let (offset, page_len) = chunk.leaf_byte_range(slot.leaf_index + (1u32 << self.max_order));
            let base = chunk.raw_ptr();
            drop(chunk);
            let elem_offset = offset + element_index as usize * elem_size as usize;
            let ptr = unsafe {
                std::ptr::NonNull::new_unchecked(base.as_ptr().add(elem_offset))
            };
            let _ = page_len;
            return Ok(PooledRegion {
                chunk: slot.chunk.clone(),
                handle: Handle::pack(slot.leaf_index + (1u32 << self.max_order), element_index + 1, true),
                ptr,
                len: elem_size,
                arena: self.clone(),
            });
        }
        drop(list);

        // No partially-free subpage for this class: carve a fresh leaf page.
        let chunks = self.chunks.lock();
        let mut found = None;
        for chunk_arc in chunks.iter() {
            let mut chunk = chunk_arc.lock();
            if let Some(leaf) = chunk.allocate_leaf_page() {
                found = Some((chunk_arc.clone(), leaf));
                break;
            }
        }
        drop(chunks);
        let (chunk_arc, leaf_index) = match found {
            Some(v) => v,
            None => {
                let new_chunk = Arc::new(Mutex::new(Chunk::new(self.page_size, self.max_order)));
                let leaf = new_chunk.lock().allocate_leaf_page().ok_or_else(|| {
                    BufError::AllocationFailure("fresh chunk could not carve a leaf page".into())
                })?;
                self.chunks.lock().push(new_chunk.clone());
                (new_chunk, leaf)
            }
        };

        let mut chunk = chunk_arc.lock();
        let subpage = crate::alloc::subpage::Subpage::new(self.page_size, elem_size);
        *chunk.subpage_mut(leaf_index) = Some(subpage);
        let element_index = chunk.subpage_mut(leaf_index).as_mut().unwrap().allocate().unwrap();
        let still_has_room = !chunk.subpage_mut(leaf_index).as_ref().unwrap().is_full();
        let (offset, _) = chunk.leaf_byte_range(leaf_index + (1u32 << self.max_order));
        let base = chunk.raw_ptr();
        drop(chunk);

        if still_has_room {
            lists[class_idx].lock().push(SubpageSlot { chunk: chunk_arc.clone(), leaf_index });
        }

        let elem_offset = offset + element_index as usize * elem_size as usize;
        let ptr = unsafe { std::ptr::NonNull::new_unchecked(base.as_ptr().add(elem_offset)) };
        Ok(PooledRegion {
            chunk: chunk_arc,
            handle: Handle::pack(leaf_index + (1u32 << self.max_order), element_index + 1, true),
            ptr,
            len: elem_size,
            arena: self.clone(),
        })
    }

    /// Walks known chunks from most-utilised-but-still-has-room downward;
    /// on total miss allocates a fresh chunk (`spec.md` §4.I step 3).
    fn allocate_normal(self: &Arc<Self>, size: u32) -> Result<PooledRegion> {
        let chunks = self.chunks.lock();
        let mut candidates: Vec<Arc<Mutex<Chunk>>> = chunks.clone();
        drop(chunks);
        candidates.sort_by(|a, b| {
            let ua = a.lock().usage_ratio();
            let ub = b.lock().usage_ratio();
            ub.partial_cmp(&ua).unwrap_or(std::cmp::Ordering::Equal)
        });

        for chunk_arc in &candidates {
            let mut chunk = chunk_arc.lock();
            if let Some((handle, offset, len)) = chunk.allocate_run(size) {
                let base = chunk.raw_ptr();
                drop(chunk);
                let ptr = unsafe { std::ptr::NonNull::new_unchecked(base.as_ptr().add(offset)) };
                return Ok(PooledRegion {
                    chunk: chunk_arc.clone(),
                    handle,
                    ptr,
                    len: len as u32,
                    arena: self.clone(),
                });
            }
        }

        let new_chunk = Arc::new(Mutex::new(Chunk::new(self.page_size, self.max_order)));
        let (handle, offset, len) = new_chunk
            .lock()
            .allocate_run(size)
            .ok_or_else(|| BufError::AllocationFailure("fresh chunk too small for request".into()))?;
        let base = new_chunk.lock().raw_ptr();
        self.chunks.lock().push(new_chunk.clone());
        let ptr = unsafe { std::ptr::NonNull::new_unchecked(base.as_ptr().add(offset)) };
        Ok(PooledRegion {
            chunk: new_chunk,
            handle,
            ptr,
            len: len as u32,
            arena: self.clone(),
        })
    }

    /// Huge requests are never pooled: a standalone single-page chunk backs
    /// them and is freed directly, bypassing thread caches and subpage
    /// bookkeeping entirely (`spec.md` §4.I step 4).
    fn allocate_huge(self: &Arc<Self>, size: u32) -> Result<PooledRegion> {
        let order = 0u8;
        let chunk = Arc::new(Mutex::new(Chunk::new(size, order)));
        let (handle, offset, len) = chunk
            .lock()
            .allocate_run(size)
            .ok_or_else(|| BufError::AllocationFailure(format!("huge allocation of {size} bytes failed")))?;
        let base = chunk.lock().raw_ptr();
        let ptr = unsafe { std::ptr::NonNull::new_unchecked(base.as_ptr().add(offset)) };
        Ok(PooledRegion { chunk, handle, ptr, len: len as u32, arena: self.clone() })
    }

    /// `free(chunk, handle, thread_cache)` (`spec.md` §4.J): try the
    /// releasing thread's cache first, fall back to the arena under the
    /// size-class lock.
    pub fn free(self: &Arc<Self>, region: PooledRegion) -> Result<()> {
        if !region.handle.is_subpage() && region.len as usize == region.chunk.lock().chunk_size() {
            // Huge/standalone chunk: not pooled, dealloc immediately.
            return self.free_direct(region);
        }

        let cache = self.thread_cache();
        let class = classify(region.len, self.page_size, self.chunk_size());
        let rejected = match class {
            SizeClass::Tiny(idx) => cache.try_push_tiny(idx, region),
            SizeClass::Small(idx) => cache.try_push_small(idx, region),
            SizeClass::Normal(size) => {
                let idx = (31 - size.leading_zeros()) as usize;
                cache.try_push_normal(idx, region)
            }
            SizeClass::Huge(_) => Err(region),
        };
        match rejected {
            Ok(()) => Ok(()),
            Err(region) => self.free_direct(region),
        }
    }

    /// Frees straight back to the chunk/subpage structures, bypassing the
    /// thread cache. Used for huge allocations, thread-cache rejections, and
    /// periodic-trim drains.
    pub fn free_direct(&self, region: PooledRegion) -> Result<()> {
        let _ = self.allocations.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)));
        if region.handle.is_subpage() {
            let leaf_index = region.handle.memory_map_index() - (1u32 << self.max_order);
            let element_index = region.handle.bitmap_index() - 1;
            let mut chunk = region.chunk.lock();
            let elem_size = chunk
                .subpage_mut(leaf_index)
                .as_ref()
                .map(|s| s.elem_size())
                .ok_or_else(|| BufError::OutOfBounds("free on a subpage that no longer exists".into()))?;
            let was_full = chunk.subpage_mut(leaf_index).as_ref().unwrap().is_full();
            chunk.subpage_mut(leaf_index).as_mut().unwrap().free(element_index);
            let now_empty = chunk.subpage_mut(leaf_index).as_ref().unwrap().is_empty();

            let (is_small, class_idx) = match classify(elem_size, self.page_size, self.chunk_size()) {
                SizeClass::Tiny(i) => (false, i),
                SizeClass::Small(i) => (true, i),
                _ => unreachable!("subpage element size must be tiny or small"),
            };
            let lists = if is_small { &self.small_lists } else { &self.tiny_lists };

            if now_empty {
                let mut list = lists[class_idx].lock();
                let had_siblings = list.iter().any(|s| s.leaf_index == leaf_index) && list.len() > 1;
                if had_siblings {
                    list.retain(|s| s.leaf_index != leaf_index);
                    *chunk.subpage_mut(leaf_index) = None;
                    chunk.free_node(region.handle.memory_map_index())?;
                }
            } else if was_full {
                lists[class_idx].lock().push(SubpageSlot { chunk: region.chunk.clone(), leaf_index });
            }
            Ok(())
        } else {
            region.chunk.lock().free_node(region.handle.memory_map_index())
        }
    }
}
