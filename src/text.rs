//! Abstract byte-encoder/decoder boundary (`spec.md` §6 "Encoding provider").
//!
//! String encoding registries are explicitly out of scope (`spec.md` §1); the
//! core only consumes this trait. UTF-8 and ASCII are special-cased in
//! [`crate::buffer`] because the buffer core knows the upper byte bound for
//! each (`4 * char_count` and `1 * char_count` respectively) and can write
//! directly without round-tripping through a provider call.

use crate::error::{BufError, Result};

/// A pluggable string codec. Implementors outside this crate can register
/// encodings (Shift-JIS, Latin-1, …) without the buffer core knowing about
/// them; the core only ever sees `encode`/`decode`.
pub trait TextCodec: Send + Sync {
    /// Encodes `s` into `dst`, returning the number of bytes written.
    /// `OutOfBounds` if `dst` is too small for the encoded form.
    fn encode(&self, s: &str, dst: &mut [u8]) -> Result<usize>;

    /// Decodes `src` into an owned `String`. `IoFailure`-adjacent decode
    /// errors are surfaced as `Unsupported` since they're a caller data
    /// problem, not a buffer bounds problem.
    fn decode(&self, src: &[u8]) -> Result<String>;

    /// Upper bound on bytes needed to encode a string of `char_count`
    /// Unicode scalar values, used by the buffer core to size scratch
    /// space before calling `encode`.
    fn max_bytes_for_chars(&self, char_count: usize) -> usize;
}

/// The buffer core's built-in fast path; also usable as a general-purpose
/// `TextCodec` by callers who don't need a registry.
pub struct Utf8Codec;

impl TextCodec for Utf8Codec {
    fn encode(&self, s: &str, dst: &mut [u8]) -> Result<usize> {
        let bytes = s.as_bytes();
        if bytes.len() > dst.len() {
            return Err(BufError::OutOfBounds(format!(
                "utf8 encoding of {} bytes does not fit in {} byte destination",
                bytes.len(),
                dst.len()
            )));
        }
        dst[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    fn decode(&self, src: &[u8]) -> Result<String> {
        String::from_utf8(src.to_vec())
            .map_err(|e| BufError::Unsupported(format!("invalid utf8: {e}")))
    }

    fn max_bytes_for_chars(&self, char_count: usize) -> usize {
        char_count * 4
    }
}

/// 7-bit ASCII; non-ASCII bytes on decode are replaced with `?` the way
/// Netty's `CharsetUtil.US_ASCII` decoder does, rather than failing outright.
pub struct AsciiCodec;

impl TextCodec for AsciiCodec {
    fn encode(&self, s: &str, dst: &mut [u8]) -> Result<usize> {
        if s.len() > dst.len() {
            return Err(BufError::OutOfBounds(format!(
                "ascii encoding of {} bytes does not fit in {} byte destination",
                s.len(),
                dst.len()
            )));
        }
        for (i, b) in s.bytes().enumerate() {
            dst[i] = if b.is_ascii() { b } else { b'?' };
        }
        Ok(s.len())
    }

    fn decode(&self, src: &[u8]) -> Result<String> {
        Ok(src.iter().map(|&b| if b.is_ascii() { b as char } else { '?' }).collect())
    }

    fn max_bytes_for_chars(&self, char_count: usize) -> usize {
        char_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_round_trips_multibyte_text() {
        let codec = Utf8Codec;
        let s = "héllo wörld";
        let mut buf = vec![0u8; codec.max_bytes_for_chars(s.chars().count())];
        let n = codec.encode(s, &mut buf).unwrap();
        assert_eq!(codec.decode(&buf[..n]).unwrap(), s);
    }

    #[test]
    fn ascii_replaces_non_ascii_on_decode() {
        let codec = AsciiCodec;
        assert_eq!(codec.decode(&[0x41, 0xFF, 0x42]).unwrap(), "A?B");
    }

    #[test]
    fn encode_into_too_small_destination_is_out_of_bounds() {
        let codec = Utf8Codec;
        let mut buf = [0u8; 2];
        assert!(matches!(codec.encode("abc", &mut buf), Err(BufError::OutOfBounds(_))));
    }
}
