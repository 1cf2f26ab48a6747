//! Size classification (`spec.md` §4.I).
//!
//! Fixed for a given `page_size`: tiny requests in 16-byte steps below
//! 512 B, small requests doubling from 512 B up to `page_size`, normal
//! requests rounded up to the next power of two between `page_size` and
//! `chunk_size`, and huge requests above `chunk_size` that bypass pooling
//! entirely. Grounded on `rusty-db/src/memory/allocator/utils.rs`'s
//! `classify_allocation_size`, generalized to the spec's four-tier table.

pub const TINY_LIMIT: u32 = 512;
pub const TINY_STEP: u32 = 16;
pub const NUM_TINY_CLASSES: usize = (TINY_LIMIT / TINY_STEP) as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    /// Index into the 16-byte-step tiny table, `< 512 B`.
    Tiny(usize),
    /// Index into the doubling small table, `512 B..page_size`.
    Small(usize),
    /// Rounded-up-to-power-of-two normal allocation, `page_size..=chunk_size`.
    Normal(u32),
    /// Larger than one chunk; allocated standalone, never pooled.
    Huge(u32),
}

impl SizeClass {
    /// Bytes actually backing this class (>= the requested size).
    pub fn byte_size(&self, page_size: u32) -> u32 {
        match *self {
            SizeClass::Tiny(i) => (i as u32 + 1) * TINY_STEP,
            SizeClass::Small(i) => TINY_LIMIT << i,
            SizeClass::Normal(n) => n,
            SizeClass::Huge(n) => n,
        }
    }

    pub fn is_pooled(&self) -> bool {
        !matches!(self, SizeClass::Huge(_))
    }
}

/// Number of small classes for a given page size: doublings from 512 B up to
/// and including `page_size` itself — the top class (`byte_size == page_size`)
/// is what a request just under `page_size` rounds up to, since the next
/// doubling above it belongs to the `Normal` tier. Must stay in lock-step with
/// `classify`'s own doubling loop below, or callers indexing `num_small_classes`
/// slots will overrun by one on requests in `(page_size/2, page_size)`.
pub fn num_small_classes(page_size: u32) -> usize {
    let mut n = 1;
    let mut size = TINY_LIMIT;
    while size < page_size {
        size <<= 1;
        n += 1;
    }
    n
}

/// Classify a requested capacity into a size class for the given
/// `page_size`/`chunk_size`.
pub fn classify(requested: u32, page_size: u32, chunk_size: u32) -> SizeClass {
    if requested == 0 {
        return SizeClass::Tiny(0);
    }
    if requested < TINY_LIMIT {
        let idx = ((requested + TINY_STEP - 1) / TINY_STEP).saturating_sub(1) as usize;
        return SizeClass::Tiny(idx.min(NUM_TINY_CLASSES - 1));
    }
    if requested < page_size {
        let mut idx = 0usize;
        let mut size = TINY_LIMIT;
        while size < requested {
            size <<= 1;
            idx += 1;
        }
        return SizeClass::Small(idx);
    }
    if requested <= chunk_size {
        return SizeClass::Normal(requested.next_power_of_two().max(page_size));
    }
    SizeClass::Huge(requested)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny_rounds_up_to_16_byte_step() {
        let c = classify(17, 8192, 16 * 1024 * 1024);
        assert_eq!(c.byte_size(8192), 32);
    }

    #[test]
    fn small_doubles_between_512_and_page_size() {
        let c = classify(600, 8192, 16 * 1024 * 1024);
        assert!(matches!(c, SizeClass::Small(_)));
        assert_eq!(c.byte_size(8192), 1024);
    }

    #[test]
    fn small_starts_exactly_at_512() {
        let c = classify(512, 8192, 16 * 1024 * 1024);
        assert!(matches!(c, SizeClass::Small(0)));
        assert_eq!(c.byte_size(8192), 512);
    }

    #[test]
    fn classify_index_always_within_num_small_classes() {
        let page_size = 8192;
        let num_small = num_small_classes(page_size);
        for requested in TINY_LIMIT..page_size {
            let c = classify(requested, page_size, 16 * 1024 * 1024);
            match c {
                SizeClass::Small(idx) => assert!(
                    idx < num_small,
                    "classify({requested}) produced Small({idx}) but num_small_classes is {num_small}"
                ),
                other => panic!("expected Small for {requested}, got {other:?}"),
            }
        }
    }

    #[test]
    fn top_small_class_covers_requests_just_under_page_size() {
        let page_size = 8192;
        let c = classify(page_size - 1, page_size, 16 * 1024 * 1024);
        assert_eq!(c.byte_size(page_size), page_size);
        assert!(matches!(c, SizeClass::Small(idx) if idx == num_small_classes(page_size) - 1));
    }

    #[test]
    fn normal_rounds_to_next_power_of_two() {
        let c = classify(9000, 8192, 16 * 1024 * 1024);
        assert_eq!(c.byte_size(8192), 16384);
    }

    #[test]
    fn huge_above_chunk_size_is_unpooled() {
        let c = classify(32 * 1024 * 1024, 8192, 16 * 1024 * 1024);
        assert!(!c.is_pooled());
    }
}
