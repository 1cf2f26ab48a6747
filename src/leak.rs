//! Sampling leak detector (`spec.md` §4.F).
//!
//! Resolves the Open Question in `spec.md` §9 on `touch` atomicity: hints
//! recorded in-flight across a concurrent `release` are **retained** — the
//! hint trail is append-only and read (not drained) when a leak report is
//! generated, so a hint added after a report was produced simply appears in
//! none of the reports taken so far, consistent with the "no ordering
//! guarantee across buffers" rule in `spec.md` §5.

use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;

use crate::config::LeakDetectionLevel;

/// A single diagnostic breadcrumb left by [`crate::refcount::touch`].
#[derive(Debug, Clone)]
pub struct Hint(pub String);

/// Sink a leak report is emitted to. The core never assumes a particular
/// transport — logging, metrics, a test-only in-memory `Vec`, anything
/// implementing this trait works.
pub trait LeakReporter: Send + Sync {
    fn report(&self, buffer_type_name: &str, hint_trail: &[Hint]);
}

/// Default reporter: emits a `tracing::warn!` event, the way `rusty-db`
/// surfaces resource-pressure events from its allocator modules.
pub struct TracingLeakReporter;

impl LeakReporter for TracingLeakReporter {
    fn report(&self, buffer_type_name: &str, hint_trail: &[Hint]) {
        let trail: Vec<&str> = hint_trail.iter().map(|h| h.0.as_str()).collect();
        tracing::warn!(
            buffer_type = buffer_type_name,
            hints = ?trail,
            "buffer garbage-collected without release"
        );
    }
}

/// Companion record attached to a sampled buffer at creation time.
pub struct TrackedRecord {
    buffer_type_name: &'static str,
    hints: Mutex<Vec<Hint>>,
    released: std::sync::atomic::AtomicBool,
}

impl TrackedRecord {
    fn new(buffer_type_name: &'static str) -> Self {
        Self {
            buffer_type_name,
            hints: Mutex::new(Vec::new()),
            released: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn touch(&self, hint: Hint) {
        self.hints.lock().push(hint);
    }

    /// Marks the buffer as properly released; the post-mortem hook (see
    /// [`Drop`] below) uses this to distinguish a clean release from a true
    /// leak.
    pub fn mark_released(&self) {
        self.released.store(true, std::sync::atomic::Ordering::Release);
    }
}

impl Drop for TrackedRecord {
    /// The "garbage-collected without prior release" signal. In Rust this is
    /// simply `Drop` on the tracked record itself, which a buffer holds for
    /// its whole lifetime — the post-mortem hook the spec asks for (weak-ref
    /// queue / finaliser in GC'd runtimes) is just RAII here.
    fn drop(&mut self) {
        if !self.released.load(std::sync::atomic::Ordering::Acquire) {
            let trail = self.hints.lock();
            TracingLeakReporter.report(self.buffer_type_name, &trail);
        }
    }
}

/// Samples buffers at creation time and tracks the ones selected.
pub struct LeakTracker {
    level: LeakDetectionLevel,
}

impl LeakTracker {
    pub fn new(level: LeakDetectionLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> LeakDetectionLevel {
        self.level
    }

    /// With sampling probability determined by the configured level, returns
    /// a new [`TrackedRecord`] for the caller to hold alongside the buffer.
    /// Returns `None` when the buffer was not selected (or detection is
    /// disabled) — callers treat that as "tracking is a no-op" rather than
    /// an error.
    pub fn maybe_track(&self, buffer_type_name: &'static str) -> Option<Arc<TrackedRecord>> {
        let rate = self.level.sample_rate()?;
        let sampled = if rate == 1 {
            true
        } else {
            rand::rng().random_ratio(1, rate)
        };
        sampled.then(|| Arc::new(TrackedRecord::new(buffer_type_name)))
    }
}
