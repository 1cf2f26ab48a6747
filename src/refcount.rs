//! Atomic reference-count core (`spec.md` §4.E).
//!
//! One [`RefCount`] is shared (via `Arc`) between a buffer and every derived
//! view of it; a view's `retain`/`release` simply forwards to the same
//! counter its parent holds, which is how "creating a view retains the
//! parent exactly once" (`spec.md` §3) falls out for free.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{BufError, Result};
use crate::leak::Hint;

/// Atomic 32-bit counter with linearisable zero-crossing.
///
/// `release` never double-deallocates: the thread whose decrement observes
/// exactly `1 -> 0` is the one (and only one) that runs `deallocate()`.
pub struct RefCount {
    count: AtomicU32,
}

impl RefCount {
    pub fn new() -> Self {
        Self { count: AtomicU32::new(1) }
    }

    pub fn get(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_accessible(&self) -> bool {
        self.get() > 0
    }

    pub fn retain(&self) -> Result<()> {
        self.retain_n(1)
    }

    /// Increments by `n`. Fails with [`BufError::IllegalReferenceCount`] if
    /// the counter is currently 0 (already deallocated), `n == 0`, or the
    /// increment would overflow `u32`.
    pub fn retain_n(&self, n: u32) -> Result<()> {
        if n == 0 {
            return Err(BufError::IllegalReferenceCount(
                "retain amount must be positive".into(),
            ));
        }
        let mut current = self.count.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                return Err(BufError::IllegalReferenceCount(
                    "retain on a buffer with reference count 0".into(),
                ));
            }
            let new = current.checked_add(n).ok_or_else(|| {
                BufError::IllegalReferenceCount("reference count overflow".into())
            })?;
            match self.count.compare_exchange_weak(
                current,
                new,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(()),
                Err(observed) => current = observed,
            }
        }
    }

    pub fn release(&self) -> Result<bool> {
        self.release_n(1)
    }

    /// Decrements by `n`. Returns `Ok(true)` exactly once, for the decrement
    /// that observes the counter reach 0 — callers use that to trigger
    /// `deallocate()` precisely once. Fails if `n <= 0` or the decrement
    /// would go below 0.
    pub fn release_n(&self, n: u32) -> Result<bool> {
        if n == 0 {
            return Err(BufError::IllegalReferenceCount(
                "release amount must be positive".into(),
            ));
        }
        let mut current = self.count.load(Ordering::Relaxed);
        loop {
            if current < n {
                return Err(BufError::IllegalReferenceCount(format!(
                    "release({n}) on reference count {current}"
                )));
            }
            let new = current - n;
            match self.count.compare_exchange_weak(
                current,
                new,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(new == 0),
                Err(observed) => current = observed,
            }
        }
    }

    /// Asserts the buffer is still live. Used before any read/write that
    /// depends on the backing memory, gated by `Tunables::check_accessible`.
    pub fn check_accessible(&self) -> Result<()> {
        if self.is_accessible() {
            Ok(())
        } else {
            Err(BufError::IllegalReferenceCount(
                "operation on a buffer with reference count 0".into(),
            ))
        }
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

/// Records a diagnostic hint against the leak tracker, if one is attached.
/// A no-op when the buffer was never sampled for tracking.
pub fn touch(hint_sink: Option<&crate::leak::TrackedRecord>, hint: Hint) {
    if let Some(record) = hint_sink {
        record.touch(hint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retain_and_release_track_count() {
        let rc = RefCount::new();
        rc.retain().unwrap();
        rc.retain().unwrap();
        assert_eq!(rc.get(), 3);
        assert!(!rc.release().unwrap());
        assert!(!rc.release().unwrap());
        assert_eq!(rc.get(), 1);
        assert!(rc.release().unwrap());
        assert_eq!(rc.get(), 0);
    }

    #[test]
    fn retain_after_zero_fails() {
        let rc = RefCount::new();
        assert!(rc.release().unwrap());
        assert!(matches!(rc.retain(), Err(BufError::IllegalReferenceCount(_))));
    }

    #[test]
    fn release_below_zero_fails() {
        let rc = RefCount::new();
        assert!(rc.release().unwrap());
        assert!(matches!(rc.release(), Err(BufError::IllegalReferenceCount(_))));
    }

    #[test]
    fn s5_reference_count_scenario() {
        let rc = RefCount::new();
        rc.retain().unwrap();
        rc.retain().unwrap();
        assert_eq!(rc.get(), 3);
        rc.release().unwrap();
        rc.release().unwrap();
        assert_eq!(rc.get(), 1);
        assert!(rc.release().unwrap());
        assert!(rc.check_accessible().is_err());
    }
}
