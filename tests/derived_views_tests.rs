// Derived-view family integration tests: slice, duplicate, unreleasable
// (spec.md §4.C). Test ID format: VIEW-XXX

use rusty_buf::{BufError, Buffer};

// VIEW-001: S3 slice independence scenario — a slice's cursor moves
// independently of its parent's.
#[test]
fn test_view_001_s3_slice_independence() {
    let mut b = Buffer::heap(32, 32).unwrap();
    b.write_utf8("hello world").unwrap();
    let mut s = b.slice(6, 5).unwrap();
    assert_eq!(s.read_utf8(5).unwrap(), "world");
    assert_eq!(b.reader_index(), 0);
}

// VIEW-002: a slice's capacity and max_capacity both equal its length, and
// adjust_capacity is unsupported on it (spec.md §4.C).
#[test]
fn test_view_002_slice_capacity_equals_length_and_is_fixed() {
    let b = Buffer::heap(32, 32).unwrap();
    let mut s = b.slice(4, 10).unwrap();
    assert_eq!(s.capacity(), 10);
    assert_eq!(s.max_capacity(), 10);
    assert!(matches!(s.adjust_capacity(20), Err(BufError::Unsupported(_))));
}

// VIEW-003: spec.md §8 property 6 — slice round-trip matches the parent's
// get_bytes over the same range.
#[test]
fn test_view_003_slice_round_trips_against_parent_get_bytes() {
    let mut b = Buffer::heap(16, 16).unwrap();
    b.write_bytes(b"0123456789abcdef").unwrap();
    let s = b.slice(3, 6).unwrap();
    assert_eq!(s.get_bytes(0, 6).unwrap(), b.get_bytes(3, 6).unwrap());
}

// VIEW-004: spec.md §8 property 3 — a duplicate reads the same content as
// its parent but mutating the duplicate's cursors leaves the parent's alone.
#[test]
fn test_view_004_duplicate_reads_full_parent_content_independently() {
    let mut b = Buffer::heap(16, 16).unwrap();
    b.write_utf8("abcdef").unwrap();
    let mut dup = b.duplicate().unwrap();
    assert_eq!(dup.read_utf8(6).unwrap(), "abcdef");
    assert_eq!(b.reader_index(), 0);
}

// VIEW-005: a duplicate shares storage with its parent — a write through one
// is visible through the other.
#[test]
fn test_view_005_duplicate_shares_storage_with_parent() {
    let mut b = Buffer::heap(16, 16).unwrap();
    b.write_utf8("abcdef").unwrap();
    let mut dup = b.duplicate().unwrap();
    dup.set_u8(0, b'Z').unwrap();
    assert_eq!(b.get_u8(0).unwrap(), b'Z');
}

// VIEW-006: retained_slice/retained_duplicate hand the caller an extra
// reference on the shared storage that must be separately released.
#[test]
fn test_view_006_retained_slice_increments_shared_refcount() {
    let b = Buffer::heap(16, 16).unwrap();
    assert_eq!(b.ref_count(), 1);
    let view = b.retained_slice(0, 4).unwrap();
    assert_eq!(b.ref_count(), 2);
    assert_eq!(view.ref_count(), 2);
    view.release().unwrap();
    assert_eq!(b.ref_count(), 1);
}

#[test]
fn test_view_006b_retained_duplicate_increments_shared_refcount() {
    let b = Buffer::heap(16, 16).unwrap();
    let dup = b.retained_duplicate().unwrap();
    assert_eq!(b.ref_count(), 2);
    dup.release().unwrap();
    assert_eq!(b.ref_count(), 1);
}

// VIEW-007: an unreleasable wrapper makes retain/release no-ops while still
// allowing reads/writes to pass through to the wrapped buffer.
#[test]
fn test_view_007_unreleasable_ignores_retain_release_but_allows_io() {
    let mut inner = Buffer::heap(8, 8).unwrap();
    inner.write_bytes(b"const").unwrap();
    let mut b = Buffer::unreleasable(inner);
    assert!(!b.release().unwrap());
    assert_eq!(b.ref_count(), 1);
    b.retain().unwrap(); // no-op, never errors
    assert_eq!(b.read_bytes(5).unwrap(), b"const");
}

// VIEW-008: slicing a slice composes offsets against the shared root store
// rather than the intermediate slice.
#[test]
fn test_view_008_slice_of_slice_composes_offsets() {
    let mut b = Buffer::heap(16, 16).unwrap();
    b.write_bytes(b"0123456789abcdef").unwrap();
    let s1 = b.slice(4, 8).unwrap(); // "456789ab"
    let s2 = s1.slice(2, 3).unwrap(); // "678"
    assert_eq!(s2.get_bytes(0, 3).unwrap(), b"678");
}

// VIEW-009: releasing a slice's only reference releases the shared parent
// storage, and subsequent access through the parent fails.
#[test]
fn test_view_009_releasing_last_slice_reference_deallocates_shared_storage() {
    let b = Buffer::heap(16, 16).unwrap();
    let s = b.slice(0, 4).unwrap();
    assert!(b.release().unwrap());
    assert!(matches!(s.get_bytes(0, 1), Err(BufError::IllegalReferenceCount(_))));
}
