// Sampling leak-tracker integration tests (spec.md §4.F). Test ID format: LEAK-XXX

use rusty_buf::config::LeakDetectionLevel;
use rusty_buf::leak::LeakTracker;
use rusty_buf::Buffer;

// LEAK-001: Disabled never samples, regardless of how many buffers are created.
#[test]
fn test_leak_001_disabled_level_never_samples() {
    let tracker = LeakTracker::new(LeakDetectionLevel::Disabled);
    for _ in 0..200 {
        assert!(tracker.maybe_track("HeapBuf").is_none());
    }
}

// LEAK-002: Paranoid samples every single allocation.
#[test]
fn test_leak_002_paranoid_level_always_samples() {
    let tracker = LeakTracker::new(LeakDetectionLevel::Paranoid);
    for _ in 0..200 {
        assert!(tracker.maybe_track("HeapBuf").is_some());
    }
}

// LEAK-003: Simple/Advanced share the same 1-in-128 sampling rate but differ
// on whether touch hints are recorded (spec.md §4.F level table).
#[test]
fn test_leak_003_simple_and_advanced_share_sample_rate_but_not_hint_recording() {
    assert_eq!(LeakDetectionLevel::Simple.sample_rate(), LeakDetectionLevel::Advanced.sample_rate());
    assert!(!LeakDetectionLevel::Simple.records_hints());
    assert!(LeakDetectionLevel::Advanced.records_hints());
}

// LEAK-004: Disabled has no sample rate at all, distinct from "rate of 0".
#[test]
fn test_leak_004_disabled_has_no_sample_rate() {
    assert_eq!(LeakDetectionLevel::Disabled.sample_rate(), None);
    assert!(!LeakDetectionLevel::Disabled.records_hints());
}

// LEAK-005: under Paranoid sampling, a buffer's normal touch/retain/release
// lifecycle still completes without panicking or erroring — the tracker
// attaches transparently regardless of level (spec.md §4.F "no observable
// change to I/O behavior").
#[test]
fn test_leak_005_tracked_buffer_lifecycle_is_unaffected_by_sampling() {
    rusty_buf::bootstrap::init({
        let mut t = rusty_buf::Tunables::default();
        t.leak_detection_level = LeakDetectionLevel::Paranoid;
        t
    });
    let mut b = Buffer::heap(16, 16).unwrap();
    b.write_bytes(b"tracked").unwrap();
    b.touch("example-hint");
    b.retain().unwrap();
    assert_eq!(b.ref_count(), 2);
    assert!(!b.release().unwrap());
    assert!(b.release().unwrap());
}

// LEAK-006: the sampling probability is approximately 1/128 for Simple over a
// large enough trial count — a loose statistical sanity check, not an exact
// bound, since sampling is randomized.
#[test]
fn test_leak_006_simple_sampling_rate_is_roughly_one_in_128() {
    let tracker = LeakTracker::new(LeakDetectionLevel::Simple);
    let trials = 20_000;
    let sampled = (0..trials).filter(|_| tracker.maybe_track("HeapBuf").is_some()).count();
    let expected = trials / 128;
    assert!(
        sampled < expected * 4 + 50,
        "sampled {sampled} far exceeds the expected ~{expected} for a 1-in-128 rate"
    );
}
