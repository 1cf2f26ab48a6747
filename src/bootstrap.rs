//! Process-wide bootstrap for the default allocator pool, leak detector, and
//! environment tunables (`spec.md` §9 "Global state").
//!
//! Initialisation is explicit: call [`init`] once, early in `main`, the way
//! `rusty-db`'s `MemoryManager` is constructed once and threaded through the
//! rest of the system rather than reached for via hidden first-use statics.
//! Code that forgets to call it still works — [`tunables`], [`default_arena`],
//! and [`pick_arena`] lazily fall back to [`crate::config::Tunables::default`]
//! — but production call sites should bootstrap explicitly so configuration
//! is visible at startup.

use std::cell::Cell;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::alloc::arena::Arena;
use crate::buffer::Buffer;
use crate::config::{AllocatorType, Tunables};
use crate::error::Result;
use crate::leak::LeakTracker;

static TUNABLES: OnceCell<Tunables> = OnceCell::new();
/// `NUM_ARENAS` independent arenas (`spec.md` §5, §6): allocators spread
/// contention across this pool rather than serialising on one lock.
static ARENA_POOL: OnceCell<Vec<Arc<Arena>>> = OnceCell::new();
static LEAK_TRACKER: OnceCell<Arc<LeakTracker>> = OnceCell::new();

thread_local! {
    /// Each thread picks an arena once (`spec.md` §5 "allocators pick the
    /// least-contended arena per thread, caching the choice") and reuses that
    /// index for the rest of its lifetime instead of re-scanning the pool on
    /// every allocation.
    static CACHED_ARENA_INDEX: Cell<Option<usize>> = Cell::new(None);
}

/// Install process-wide tunables and construct the arena pool and leak
/// tracker from them. Calling this more than once is a no-op after the first
/// call succeeds (later calls are ignored, matching `OnceCell` semantics) —
/// tests that need isolated configuration should build their own `Arena`
/// directly instead of relying on this global.
pub fn init(tunables: Tunables) {
    let pool = build_pool(&tunables);
    let tracker = Arc::new(LeakTracker::new(tunables.leak_detection_level));
    let _ = TUNABLES.set(tunables);
    let _ = ARENA_POOL.set(pool);
    let _ = LEAK_TRACKER.set(tracker);
}

fn build_pool(tunables: &Tunables) -> Vec<Arc<Arena>> {
    (0..tunables.num_arenas.max(1)).map(|_| Arc::new(Arena::new(tunables))).collect()
}

/// Bootstrap with compiled-in defaults.
pub fn init_default() {
    init(Tunables::default());
}

/// Currently installed tunables, or the compiled-in default if [`init`] was
/// never called.
pub fn tunables() -> &'static Tunables {
    TUNABLES.get_or_init(Tunables::default)
}

fn arena_pool() -> &'static [Arc<Arena>] {
    ARENA_POOL.get_or_init(|| build_pool(tunables()))
}

/// The arena the calling thread's allocations round-robin across, lazily
/// built from [`tunables`] if [`init`] was never called explicitly. The
/// first call on a thread scans [`Arena::load`] across the whole
/// `NUM_ARENAS` pool and caches the least-contended index for that thread;
/// later calls on the same thread reuse it without rescanning.
pub fn pick_arena() -> Arc<Arena> {
    let pool = arena_pool();
    let idx = CACHED_ARENA_INDEX.with(|cached| {
        if let Some(idx) = cached.get() {
            return idx;
        }
        let idx = pool
            .iter()
            .enumerate()
            .min_by_key(|(_, arena)| arena.load())
            .map(|(i, _)| i)
            .unwrap_or(0);
        cached.set(Some(idx));
        idx
    });
    pool[idx].clone()
}

/// The first arena in the pool. Kept for callers that only need a concrete
/// arena (e.g. tests building an isolated buffer) rather than per-thread load
/// balancing — [`pick_arena`] is what allocation call sites should use.
pub fn default_arena() -> Arc<Arena> {
    arena_pool()[0].clone()
}

/// The process-wide leak tracker.
pub fn leak_tracker() -> Arc<LeakTracker> {
    LEAK_TRACKER
        .get_or_init(|| Arc::new(LeakTracker::new(tunables().leak_detection_level)))
        .clone()
}

/// Allocates a buffer honoring `Tunables::allocator_type` (`spec.md` §6
/// `ALLOCATOR_TYPE`): `Pooled` carves from the least-contended arena via
/// [`pick_arena`]; `Unpooled` always goes straight to the heap, bypassing
/// pooling entirely (useful under fuzzers/debuggers where pooling hides
/// use-after-free bugs behind reused memory).
pub fn allocate_buffer(initial_capacity: u32, max_capacity: u32) -> Result<Buffer> {
    match tunables().allocator_type {
        AllocatorType::Pooled => Buffer::pooled(pick_arena(), initial_capacity, max_capacity),
        AllocatorType::Unpooled => Buffer::heap(initial_capacity, max_capacity),
    }
}
