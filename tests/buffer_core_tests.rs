// Buffer core integration tests: dual-cursor I/O, capacity growth, search,
// compaction (spec.md §4.B).
// Test ID format: BUFCORE-XXX

use rusty_buf::io::{ByteSink, ByteSource, CancellationToken};
use rusty_buf::{BufError, Buffer};

struct VecSource {
    data: Vec<u8>,
    pos: usize,
}

impl ByteSource for VecSource {
    fn read(&mut self, dst: &mut [u8], len: usize) -> rusty_buf::Result<Option<usize>> {
        let remaining = self.data.len() - self.pos;
        if remaining == 0 {
            return Ok(None);
        }
        let n = len.min(remaining).min(dst.len());
        dst[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(Some(n))
    }
}

#[derive(Default)]
struct VecSink {
    data: Vec<u8>,
}

impl ByteSink for VecSink {
    fn write(&mut self, src: &[u8], len: usize) -> rusty_buf::Result<()> {
        self.data.extend_from_slice(&src[..len]);
        Ok(())
    }
}

// BUFCORE-001: invariant 0 <= R <= W <= capacity <= max_capacity holds across
// a mixed sequence of reads/writes/marks.
#[test]
fn test_bufcore_001_cursor_invariant_holds_across_operations() {
    let mut b = Buffer::heap(8, 64).unwrap();
    b.write_bytes(&[1, 2, 3, 4]).unwrap();
    b.read_bytes(2).unwrap();
    b.mark_reader_index();
    b.write_bytes(&[5, 6, 7, 8, 9, 10]).unwrap();

    assert!(b.reader_index() <= b.writer_index());
    assert!(b.writer_index() <= b.capacity());
    assert!(b.capacity() <= b.max_capacity());
}

// BUFCORE-002: every scalar width round-trips through write_X/read_X, both
// endiannesses (spec.md §8 property 2).
#[test]
fn test_bufcore_002_every_scalar_width_round_trips() {
    let mut b = Buffer::heap(64, 64).unwrap();
    b.write_u8(0xAB).unwrap();
    b.write_u16_be(0x1234).unwrap();
    b.write_u16_le(0x1234).unwrap();
    b.write_u24_be(0x0A0B0C).unwrap();
    b.write_u24_le(0x0A0B0C).unwrap();
    b.write_u32_be(0xDEADBEEF).unwrap();
    b.write_u32_le(0xDEADBEEF).unwrap();
    b.write_u64_be(0x1122334455667788).unwrap();
    b.write_u64_le(0x1122334455667788).unwrap();
    b.write_f32_be(1.5f32).unwrap();
    b.write_f32_le(1.5f32).unwrap();
    b.write_f64_be(std::f64::consts::PI).unwrap();
    b.write_f64_le(std::f64::consts::PI).unwrap();

    assert_eq!(b.read_u8().unwrap(), 0xAB);
    assert_eq!(b.read_u16_be().unwrap(), 0x1234);
    assert_eq!(b.read_u16_le().unwrap(), 0x1234);
    assert_eq!(b.read_u24_be().unwrap(), 0x0A0B0C);
    assert_eq!(b.read_u24_le().unwrap(), 0x0A0B0C);
    assert_eq!(b.read_u32_be().unwrap(), 0xDEADBEEF);
    assert_eq!(b.read_u32_le().unwrap(), 0xDEADBEEF);
    assert_eq!(b.read_u64_be().unwrap(), 0x1122334455667788);
    assert_eq!(b.read_u64_le().unwrap(), 0x1122334455667788);
    assert_eq!(b.read_f32_be().unwrap(), 1.5f32);
    assert_eq!(b.read_f32_le().unwrap(), 1.5f32);
    assert_eq!(b.read_f64_be().unwrap(), std::f64::consts::PI);
    assert_eq!(b.read_f64_le().unwrap(), std::f64::consts::PI);
}

// BUFCORE-003: S2 grow-under-max-capacity scenario.
#[test]
fn test_bufcore_003_s2_grow_under_max_capacity() {
    let mut b = Buffer::heap(8, 32).unwrap();
    b.write_bytes(&(1u8..=10).collect::<Vec<_>>()).unwrap();
    assert_eq!(b.capacity(), 16);
    b.write_bytes(&(11u8..=32).collect::<Vec<_>>()).unwrap();
    assert_eq!(b.capacity(), 32);
    assert!(matches!(b.write_u8(99), Err(BufError::InsufficientCapacity(_))));
}

// BUFCORE-004: growth above the 4 MiB threshold rounds up to the next
// threshold multiple instead of doubling (spec.md §4.B growth policy).
#[test]
fn test_bufcore_004_growth_above_threshold_rounds_to_multiple() {
    const THRESHOLD: u32 = 4 * 1024 * 1024;
    let mut b = Buffer::heap(THRESHOLD, THRESHOLD * 4).unwrap();
    b.set_writer_index(THRESHOLD).unwrap();
    b.write_bytes(&vec![0u8; 1024]).unwrap();
    assert_eq!(b.capacity(), THRESHOLD * 2);
}

// BUFCORE-005: reads past the writer index and absolute accesses past
// capacity fail as OutOfBounds, never partially mutating state.
#[test]
fn test_bufcore_005_out_of_bounds_reads_and_absolute_access_fail() {
    let mut b = Buffer::heap(4, 4).unwrap();
    assert!(matches!(b.read_u32_be(), Err(BufError::OutOfBounds(_))));
    assert!(matches!(b.get_u8(10), Err(BufError::OutOfBounds(_))));
    assert_eq!(b.reader_index(), 0);
    assert_eq!(b.writer_index(), 0);
}

// BUFCORE-006: index_of linear scan, forward and reverse directions.
#[test]
fn test_bufcore_006_index_of_forward_and_reverse() {
    let mut b = Buffer::heap(8, 8).unwrap();
    b.write_bytes(b"abcabc").unwrap();
    assert_eq!(b.index_of(0, 6, b'c').unwrap(), 2);
    assert_eq!(b.index_of(5, 0, b'c').unwrap(), 5);
    assert_eq!(b.index_of(0, 6, b'z').unwrap(), -1);
}

// BUFCORE-007: for_each_byte halts on the first false from the predicate and
// returns the visited index.
#[test]
fn test_bufcore_007_for_each_byte_halts_on_false() {
    let mut b = Buffer::heap(8, 8).unwrap();
    b.write_bytes(b"aaXaaa").unwrap();
    let stopped_at = b.for_each_byte(0, 6, |byte| byte == b'a').unwrap();
    assert_eq!(stopped_at, Some(2));
}

// BUFCORE-008: discard_read_bytes preserves the readable window's content
// (spec.md §8 property 9).
#[test]
fn test_bufcore_008_discard_read_bytes_preserves_window() {
    let mut b = Buffer::heap(16, 16).unwrap();
    b.write_utf8("hello world").unwrap();
    b.read_bytes(6).unwrap();
    let before = b.get_bytes(b.reader_index(), b.readable_bytes()).unwrap();
    b.discard_read_bytes().unwrap();
    assert_eq!(b.reader_index(), 0);
    let after = b.get_bytes(0, b.writer_index()).unwrap();
    assert_eq!(before, after);
}

// BUFCORE-009: discard_some_read_bytes only compacts once the reader has
// consumed at least half of capacity.
#[test]
fn test_bufcore_009_discard_some_only_compacts_past_half_capacity() {
    let mut b = Buffer::heap(16, 16).unwrap();
    b.write_bytes(&[0u8; 16]).unwrap();
    b.read_bytes(4).unwrap();
    b.discard_some_read_bytes().unwrap();
    assert_eq!(b.reader_index(), 4, "below half capacity: no compaction yet");

    b.read_bytes(4).unwrap();
    b.discard_some_read_bytes().unwrap();
    assert_eq!(b.reader_index(), 0, "at/above half capacity: compacts");
}

// BUFCORE-010: adjust_capacity truncation clamps W then R without panicking,
// preserving the retained byte prefix.
#[test]
fn test_bufcore_010_adjust_capacity_truncates_and_preserves_prefix() {
    let mut b = Buffer::heap(16, 16).unwrap();
    b.write_bytes(b"0123456789abcdef").unwrap();
    b.set_reader_index(12).unwrap();
    b.adjust_capacity(5).unwrap();
    assert_eq!(b.capacity(), 5);
    assert_eq!(b.writer_index(), 5);
    assert_eq!(b.reader_index(), 5);
    assert_eq!(b.get_bytes(0, 5).unwrap(), b"01234");
}

// BUFCORE-011: S1 mixed-endian writer/reader scenario.
#[test]
fn test_bufcore_011_s1_endian_writer_reader_scenario() {
    let mut b = Buffer::heap(16, 16).unwrap();
    b.write_i32_be(0x0A0B0C0D).unwrap();
    b.write_i32_le(0x0A0B0C0D).unwrap();
    assert_eq!(b.get_bytes(0, 8).unwrap(), vec![0x0A, 0x0B, 0x0C, 0x0D, 0x0D, 0x0C, 0x0B, 0x0A]);
    assert_eq!(b.read_i32_be().unwrap(), 0x0A0B0C0D);
    assert_eq!(b.read_i32_le().unwrap(), 0x0A0B0C0D);
}

// BUFCORE-012: the empty buffer rejects any non-zero-length read/write.
#[test]
fn test_bufcore_012_empty_buffer_rejects_nonzero_access() {
    let mut b = Buffer::empty();
    assert!(b.write_u8(1).is_err());
    assert!(b.get_bytes(0, 0).unwrap().is_empty());
}

// BUFCORE-013: UTF-8 and ASCII fast-path round-trip through the buffer
// without an external TextCodec.
#[test]
fn test_bufcore_013_utf8_and_ascii_fast_paths_round_trip() {
    let mut b = Buffer::heap(64, 64).unwrap();
    b.write_utf8("héllo").unwrap();
    b.write_ascii("world").unwrap();
    assert_eq!(b.read_utf8("héllo".len() as u32).unwrap(), "héllo");
    assert_eq!(b.read_ascii(5).unwrap(), "world");
}

// BUFCORE-014: transfer_to moves exactly the requested readable bytes into
// the destination's writable region through one intermediate copy.
#[test]
fn test_bufcore_014_transfer_to_moves_readable_bytes() {
    let mut src = Buffer::heap(16, 16).unwrap();
    src.write_bytes(b"transfer-me").unwrap();
    let mut dst = Buffer::heap(16, 16).unwrap();
    src.transfer_to(&mut dst, 8).unwrap();
    assert_eq!(dst.get_bytes(0, 8).unwrap(), b"transfer");
    assert_eq!(src.readable_bytes(), 3);
}

// BUFCORE-015: write_bytes_async drains a ByteSource into the writer's
// window, advancing W by exactly the bytes transferred (spec.md §5, §6).
#[test]
fn test_bufcore_015_write_bytes_async_drains_source_and_advances_writer() {
    let mut b = Buffer::heap(32, 32).unwrap();
    let mut source = VecSource { data: b"hello network".to_vec(), pos: 0 };
    let n = b.write_bytes_async(source.data.len() as u32, &mut source, None).unwrap();
    assert_eq!(n, source.data.len() as u32);
    assert_eq!(b.writer_index(), n);
    assert_eq!(b.read_bytes(n).unwrap(), b"hello network");
}

// BUFCORE-016: cancelling mid-transfer stops write_bytes_async without
// advancing W past the bytes already committed.
#[test]
fn test_bufcore_016_write_bytes_async_cancellation_stops_short() {
    let mut b = Buffer::heap(32, 32).unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let mut source = VecSource { data: b"never written".to_vec(), pos: 0 };
    let n = b.write_bytes_async(source.data.len() as u32, &mut source, Some(&token)).unwrap();
    assert_eq!(n, 0);
    assert_eq!(b.writer_index(), 0);
}

// BUFCORE-017: read_bytes_async drains the readable window into a ByteSink,
// advancing R by exactly the bytes handed over.
#[test]
fn test_bufcore_017_read_bytes_async_drains_into_sink() {
    let mut b = Buffer::heap(32, 32).unwrap();
    b.write_bytes(b"outbound payload").unwrap();
    let mut sink = VecSink::default();
    let n = b.read_bytes_async(b.readable_bytes(), &mut sink, None).unwrap();
    assert_eq!(sink.data, b"outbound payload");
    assert_eq!(b.reader_index(), n);
}
