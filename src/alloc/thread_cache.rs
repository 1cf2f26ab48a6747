//! Per-thread free-region cache (`spec.md` §4.J).
//!
//! Grounded on `rusty-db/src/memory/allocator/slab_allocator.rs`'s
//! `THREAD_CACHE` thread-local + `Magazine`, adapted with
//! `crossbeam_queue::ArrayQueue` so a *different* thread releasing a region
//! whose owner is this cache (the MPSC free path in `spec.md` §4.J) can push
//! into it without taking a lock — `ArrayQueue` is a bounded lock-free MPMC
//! ring; a single-consumer cache is a safe specialisation of that.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::ThreadId;

use crossbeam_queue::ArrayQueue;
use crossbeam_utils::CachePadded;

use crate::alloc::size_class::{num_small_classes, NUM_TINY_CLASSES};
use crate::alloc::PooledRegion;

/// Bounded per-size-class ring of recently-released regions for one size
/// tier (tiny/small/normal), owned by exactly one consumer thread.
struct Tier {
    queues: Vec<ArrayQueue<PooledRegion>>,
}

impl Tier {
    fn new(num_classes: usize, capacity: usize) -> Self {
        Self {
            queues: (0..num_classes).map(|_| ArrayQueue::new(capacity.max(1))).collect(),
        }
    }
}

/// Per-thread cache: one [`Tier`] each for tiny/small/normal classes, plus a
/// running allocation counter that drives the periodic trim.
pub struct ThreadCache {
    pub owner: ThreadId,
    tiny: Tier,
    small: Tier,
    normal: Tier,
    /// Touched on every allocation from the owning thread; padded to its own
    /// cache line so the hot counter never bounces against the `Tier` queues'
    /// cache lines on a shared-memory machine.
    allocations_since_trim: CachePadded<AtomicUsize>,
}

/// Every `TRIM_INTERVAL` allocations the owning thread scans its rings and
/// returns `TRIM_FRACTION_DENOM`-th of each ring's contents to the arena, to
/// bound memory held per idle thread (`spec.md` §4.J "Periodic trim").
const TRIM_INTERVAL: usize = 4096;
const TRIM_FRACTION_DENOM: usize = 4;

impl ThreadCache {
    pub fn new(owner: ThreadId, page_size: u32, tiny_cap: usize, small_cap: usize, normal_cap: usize) -> Self {
        Self {
            owner,
            tiny: Tier::new(NUM_TINY_CLASSES, tiny_cap),
            small: Tier::new(num_small_classes(page_size).max(1), small_cap),
            normal: Tier::new(64, normal_cap),
            allocations_since_trim: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    pub fn try_pop_tiny(&self, idx: usize) -> Option<PooledRegion> {
        self.tiny.queues.get(idx).and_then(|q| q.pop())
    }

    pub fn try_pop_small(&self, idx: usize) -> Option<PooledRegion> {
        self.small.queues.get(idx).and_then(|q| q.pop())
    }

    pub fn try_pop_normal(&self, idx: usize) -> Option<PooledRegion> {
        self.normal.queues.get(idx.min(self.normal.queues.len() - 1)).and_then(|q| q.pop())
    }

    /// Attempts to cache a released region. Returns the region back on
    /// rejection (cache full) so the caller can fall back to the arena.
    pub fn try_push_tiny(&self, idx: usize, region: PooledRegion) -> Result<(), PooledRegion> {
        self.tiny.queues[idx].push(region)
    }

    pub fn try_push_small(&self, idx: usize, region: PooledRegion) -> Result<(), PooledRegion> {
        self.small.queues[idx].push(region)
    }

    pub fn try_push_normal(&self, idx: usize, region: PooledRegion) -> Result<(), PooledRegion> {
        let idx = idx.min(self.normal.queues.len() - 1);
        self.normal.queues[idx].push(region)
    }

    pub fn note_allocation(&self) -> bool {
        let prev = self.allocations_since_trim.fetch_add(1, Ordering::Relaxed);
        (prev + 1) % TRIM_INTERVAL == 0
    }

    /// Drains a `1/TRIM_FRACTION_DENOM` fraction of every ring, returning the
    /// drained regions for the caller to hand back to the arena.
    pub fn trim(&self) -> Vec<PooledRegion> {
        let mut drained = Vec::new();
        for tier in [&self.tiny, &self.small, &self.normal] {
            for q in &tier.queues {
                let n = q.len() / TRIM_FRACTION_DENOM;
                for _ in 0..n {
                    if let Some(r) = q.pop() {
                        drained.push(r);
                    }
                }
            }
        }
        drained
    }
}
