//! Low-level binary decoding for the on-disk database format.
//!
//! Everything in the file is little-endian except keys, which are compared
//! and stored as **big-endian** unsigned integers. This module provides the
//! three primitives the rest of the crate builds on:
//!
//! - [`Cursor`] — a bounds-checked, by-value reading position over the
//!   memory-mapped file. Passing cursors by value replaces the mutable
//!   buffer position (and the push/pop position stack) a ported reader
//!   would otherwise need.
//! - Varints — 7 bits per byte, little-endian, continuation signalled by the
//!   high bit. Sizes and flags use the `u32` form; intra-block key deltas
//!   use the `u64` form via [`key_delta`].
//! - [`Key`] — a fixed-capacity, heap-free byte key. Raw (pre-mapping) keys
//!   are at most [`MAX_KEY_LEN`] bytes; mapped keys fit in 8 bytes and are
//!   ordered through [`Key::as_u64`].
//!
//! # Zero-panic guarantee
//!
//! No function in this module uses `unwrap()` or `expect()`. All failures
//! are reported through [`EncodingError`].

#[cfg(test)]
mod tests;

use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Limits
// ------------------------------------------------------------------------------------------------

/// Maximum length of an externally supplied (pre-mapping) key in bytes.
///
/// Mapped keys must fit an unsigned 64-bit integer (8 bytes); with the
/// optional 4-byte→2-byte prefix remapping, raw keys are at most 2 bytes
/// longer.
pub const MAX_KEY_LEN: usize = 10;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors produced while decoding primitives from the mapped file.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// The buffer ran out of bytes before decoding completed.
    #[error("unexpected end of buffer at offset {offset} (need {needed} bytes, have {available})")]
    UnexpectedEof {
        /// Offset the read started at.
        offset: usize,
        /// Bytes required to continue decoding.
        needed: usize,
        /// Bytes actually remaining.
        available: usize,
    },

    /// A varint kept its continuation bit set past the 32-bit range.
    #[error("varint exceeds 32 bits at offset {0}")]
    VarIntOverflow(usize),
}

// ------------------------------------------------------------------------------------------------
// Cursor
// ------------------------------------------------------------------------------------------------

/// A reading position over a byte buffer.
///
/// All reads are bounds-checked and advance the position. A `Cursor` is
/// cheap to create at any absolute offset, so callers seek by constructing
/// a new cursor rather than by rewinding shared state.
#[derive(Clone, Copy)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Cursor at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Cursor at absolute offset `pos` within `buf`.
    pub fn at(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    /// Current absolute offset.
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Move to an absolute offset. Validity is checked on the next read.
    #[inline]
    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Take the next `needed` bytes, advancing the position.
    pub fn read_bytes(&mut self, needed: usize) -> Result<&'a [u8], EncodingError> {
        let available = self.buf.len().saturating_sub(self.pos);
        if available < needed {
            return Err(EncodingError::UnexpectedEof {
                offset: self.pos,
                needed,
                available,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(bytes)
    }

    /// Read one byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, EncodingError> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Read a little-endian `u16`.
    #[inline]
    pub fn read_u16_le(&mut self) -> Result<u16, EncodingError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a little-endian `u32`.
    #[inline]
    pub fn read_u32_le(&mut self) -> Result<u32, EncodingError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a little-endian `f32`.
    #[inline]
    pub fn read_f32_le(&mut self) -> Result<f32, EncodingError> {
        let b = self.read_bytes(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Decode an unsigned varint: 7 bits per byte, least-significant group
    /// first, continuation signalled by the high bit of each byte.
    pub fn read_varint_u32(&mut self) -> Result<u32, EncodingError> {
        let start = self.pos;
        let mut result: u32 = 0;
        let mut shift: u32 = 0;
        loop {
            let byte = self.read_u8()?;
            if shift >= 32 {
                return Err(EncodingError::VarIntOverflow(start));
            }
            if byte & 0x80 != 0 {
                result |= u32::from(byte & 0x7F) << shift;
                shift += 7;
            } else {
                result |= u32::from(byte) << shift;
                return Ok(result);
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Key deltas
// ------------------------------------------------------------------------------------------------

/// Decode one `u64` varint delta from `buf` starting at `offset`.
///
/// Returns `(value, next_offset)`. A delta truncated by the end of the
/// buffer yields the bits accumulated so far; the caller's walk loop stops
/// on `next_offset` reaching the buffer length, so truncation surfaces as
/// an ordinary miss rather than an error.
pub fn key_delta(buf: &[u8], mut offset: usize) -> (u64, usize) {
    let mut acc: u64 = 0;
    let mut shift: u32 = 0;
    while offset < buf.len() {
        let byte = buf[offset];
        offset += 1;
        if byte & 0x80 != 0 {
            if shift < 64 {
                acc |= u64::from(byte & 0x7F) << shift;
            }
            shift += 7;
        } else {
            if shift < 64 {
                acc |= u64::from(byte) << shift;
            }
            break;
        }
    }
    (acc, offset)
}

// ------------------------------------------------------------------------------------------------
// Keys
// ------------------------------------------------------------------------------------------------

/// A database key: an immutable byte string of at most [`MAX_KEY_LEN`]
/// bytes, stored inline so that cache keys never allocate.
///
/// Identity is byte-wise; mapped keys (length ≤ 8) additionally order as
/// zero-extended big-endian unsigned integers via [`Key::as_u64`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    data: [u8; MAX_KEY_LEN],
    len: u8,
}

impl Key {
    /// Build a key from raw bytes. Lengths beyond [`MAX_KEY_LEN`] are
    /// truncated; callers validate lengths against the header first.
    pub fn new(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() <= MAX_KEY_LEN);
        let len = bytes.len().min(MAX_KEY_LEN);
        let mut data = [0u8; MAX_KEY_LEN];
        data[..len].copy_from_slice(&bytes[..len]);
        Self {
            data,
            len: len as u8,
        }
    }

    /// Concatenate two byte segments into a key (used by prefix remapping).
    pub fn from_segments(head: &[u8], tail: &[u8]) -> Self {
        debug_assert!(head.len() + tail.len() <= MAX_KEY_LEN);
        let mut data = [0u8; MAX_KEY_LEN];
        let head_len = head.len().min(MAX_KEY_LEN);
        data[..head_len].copy_from_slice(&head[..head_len]);
        let tail_len = tail.len().min(MAX_KEY_LEN - head_len);
        data[head_len..head_len + tail_len].copy_from_slice(&tail[..tail_len]);
        Self {
            data,
            len: (head_len + tail_len) as u8,
        }
    }

    /// The key bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// Key length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the key is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The key as a zero-extended big-endian unsigned integer.
    ///
    /// Only meaningful for mapped keys (length ≤ 8); longer keys use their
    /// low-order 8 bytes.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        key_to_u64(self.as_bytes())
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.as_bytes() {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

/// Interpret up to 8 bytes as a zero-extended big-endian unsigned integer.
pub fn key_to_u64(bytes: &[u8]) -> u64 {
    let mut value: u64 = 0;
    let take = bytes.len().min(8);
    for &byte in &bytes[bytes.len() - take..] {
        value = (value << 8) | u64::from(byte);
    }
    value
}
