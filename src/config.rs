//! Environment tunables (`spec.md` §6).
//!
//! Recognised options mirror the table in the specification; each has a
//! compiled-in default so a consumer that never calls [`crate::bootstrap::init`]
//! still observes correct, conservative behavior.

/// Which allocation strategy the arena uses for `Normal`/`Huge` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocatorType {
    /// Size-classed slab/buddy pooling (the default).
    Pooled,
    /// Every allocation goes straight to the heap; useful for debugging and
    /// for environments (e.g. fuzzers) where pooling hides bugs.
    Unpooled,
}

/// Sampling intensity of the leak tracker (`spec.md` §4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeakDetectionLevel {
    Disabled,
    /// Samples roughly 1 in 128 allocations.
    Simple,
    /// Same sampling rate as `Simple`, but also records `touch` hints.
    Advanced,
    /// Samples every allocation. Expensive; intended for tests/CI.
    Paranoid,
}

impl LeakDetectionLevel {
    /// Sampling probability as `1 / rate`. `None` means "never sample".
    pub fn sample_rate(self) -> Option<u32> {
        match self {
            LeakDetectionLevel::Disabled => None,
            LeakDetectionLevel::Simple | LeakDetectionLevel::Advanced => Some(128),
            LeakDetectionLevel::Paranoid => Some(1),
        }
    }

    pub fn records_hints(self) -> bool {
        matches!(self, LeakDetectionLevel::Advanced | LeakDetectionLevel::Paranoid)
    }
}

/// Process-wide configuration, normally installed once via
/// [`crate::bootstrap::init`].
#[derive(Debug, Clone)]
pub struct Tunables {
    /// Gate the reference-count accessibility check on every read/write.
    pub check_accessible: bool,
    pub allocator_type: AllocatorType,
    pub leak_detection_level: LeakDetectionLevel,
    /// Number of arenas allocators round-robin across; default 2x CPU count.
    pub num_arenas: usize,
    /// Bytes per page; must be a power of two, >= 4096.
    pub page_size: u32,
    /// log2(chunk_size / page_size); 0..=14.
    pub max_order: u8,
    pub tiny_cache_size: usize,
    pub small_cache_size: usize,
    pub normal_cache_size: usize,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            check_accessible: true,
            allocator_type: AllocatorType::Pooled,
            leak_detection_level: LeakDetectionLevel::Simple,
            num_arenas: num_cpus::get() * 2,
            page_size: 8192,
            max_order: 11,
            tiny_cache_size: 512,
            small_cache_size: 256,
            normal_cache_size: 64,
        }
    }
}

impl Tunables {
    /// Total bytes carved out of a chunk: `page_size * 2^max_order`.
    pub fn chunk_size(&self) -> usize {
        (self.page_size as usize) << self.max_order
    }

    /// Threshold below which `adjust_capacity` doubles to the next power of
    /// two; at/above it growth rounds up to the next multiple of the
    /// threshold instead (`spec.md` §4.B).
    pub const GROWTH_THRESHOLD: u32 = 4 * 1024 * 1024;
}
