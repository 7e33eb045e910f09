//! Block decoding: segment headers, the inverse-transform pipeline, the
//! delta-coded key walk, and coordinate reconstruction.
//!
//! A block holds three sequential segments — keys, coordinates, and (when
//! enabled) extra data. Each segment starts with a varint whose two low
//! bits carry decoder flags and whose remaining bits give the **stored**
//! byte length:
//!
//! ```text
//! bit 0 → ignore_zrlt     bit 1 → ignore_fse     length = varint >> 2
//! ```
//!
//! The stored length, not the decoded length, is the stride between
//! segments: the reader always advances past exactly `length` raw bytes,
//! whatever the decode pipeline produced.
//!
//! Decoding a segment runs the inverse pipeline
//! `FSE⁻¹ → ZRLT⁻¹ → SBRT⁻¹ → BWTS⁻¹`, with the first two stages skipped
//! when the corresponding flag is set. Scratch buffers are instance-owned
//! and reused across lookups; cache hits bypass the pipeline entirely.

#[cfg(test)]
mod tests;

use thiserror::Error;

use crate::bitstream::{BitStreamError, MsbBitReader};
use crate::encoding::{key_delta, Cursor, EncodingError};
use crate::fse::{FseDecoder, FseError};
use crate::transform::{Bwts, Sbrt, TransformError, Zrlt};

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Width of the per-block `lat_bits` / `lon_bits` fields.
pub const COORD_SPEC_BITS: u32 = 5;

/// Latitude domain lower bound in degrees.
pub const MIN_LAT: f64 = -90.0;
/// Latitude domain upper bound in degrees.
pub const MAX_LAT: f64 = 90.0;
/// Longitude domain lower bound in degrees.
pub const MIN_LON: f64 = -180.0;
/// Longitude domain upper bound in degrees.
pub const MAX_LON: f64 = 180.0;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors raised while decoding a block.
#[derive(Debug, Error)]
pub enum BlockError {
    /// A segment points past the end of the mapped file.
    #[error("segment out of bounds at offset {offset} ({len} bytes)")]
    SegmentOutOfBounds {
        /// Absolute file offset of the segment payload.
        offset: usize,
        /// Stored segment length.
        len: usize,
    },

    /// A decoded segment is shorter than the record being addressed.
    #[error("record {index} out of range of decoded segment ({len} bytes)")]
    RecordOutOfRange {
        /// Record index within the block.
        index: usize,
        /// Decoded segment length.
        len: usize,
    },

    /// Segment header varint decoding failed.
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// Entropy decoding failed.
    #[error(transparent)]
    Fse(#[from] FseError),

    /// An inverse transform failed.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// The coordinate bit stream ended early.
    #[error(transparent)]
    BitStream(#[from] BitStreamError),
}

// ------------------------------------------------------------------------------------------------
// Segment headers
// ------------------------------------------------------------------------------------------------

/// Decoded segment size header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Stored (on-disk) byte length of the segment payload.
    pub stored_len: usize,
    /// Skip the inverse zero run-length stage.
    pub ignore_zrlt: bool,
    /// The payload is not entropy coded; copy it through.
    pub ignore_fse: bool,
}

impl SegmentHeader {
    /// Read a segment header varint at the cursor.
    pub fn read(cursor: &mut Cursor<'_>) -> Result<Self, EncodingError> {
        let raw = cursor.read_varint_u32()?;
        Ok(Self {
            ignore_zrlt: raw & 0x01 != 0,
            ignore_fse: raw & 0x02 != 0,
            stored_len: (raw >> 2) as usize,
        })
    }
}

/// Borrow a stored segment's bytes out of the mapped file.
pub fn segment_bytes(buf: &[u8], offset: usize, len: usize) -> Result<&[u8], BlockError> {
    if offset.saturating_add(len) > buf.len() {
        return Err(BlockError::SegmentOutOfBounds { offset, len });
    }
    Ok(&buf[offset..offset + len])
}

// ------------------------------------------------------------------------------------------------
// Inverse pipeline
// ------------------------------------------------------------------------------------------------

/// The per-database segment decoder.
///
/// Holds the inverse transforms and three scratch buffers sized for the
/// worst-case block (`32 × max_entries_per_block`, grown on demand for
/// oversized raw segments).
#[derive(Debug)]
pub struct BlockDecoder {
    zrlt: Zrlt,
    sbrt: Sbrt,
    bwts: Bwts,
    tmp: Vec<u8>,
    stage: Vec<u8>,
    stage2: Vec<u8>,
}

impl BlockDecoder {
    /// Decoder with scratch sized for blocks of at most
    /// `max_entries_per_block` entries.
    pub fn new(max_entries_per_block: u16) -> Self {
        let capacity = 32 * max_entries_per_block.max(1) as usize;
        Self {
            zrlt: Zrlt,
            sbrt: Sbrt,
            bwts: Bwts::new(),
            tmp: vec![0; capacity],
            stage: vec![0; capacity],
            stage2: vec![0; capacity],
        }
    }

    /// Run the inverse pipeline over one stored segment and return the
    /// decoded bytes.
    pub fn decode_segment(
        &mut self,
        fse: &FseDecoder,
        segment: &[u8],
        header: &SegmentHeader,
    ) -> Result<Vec<u8>, BlockError> {
        // Entropy stage.
        let fse_len = if header.ignore_fse {
            if self.tmp.len() < segment.len() {
                self.tmp.resize(segment.len(), 0);
                self.stage.resize(segment.len(), 0);
                self.stage2.resize(segment.len(), 0);
            }
            self.tmp[..segment.len()].copy_from_slice(segment);
            segment.len()
        } else {
            fse.decompress(segment, &mut self.tmp)?
        };

        // Zero run-length stage.
        let zrlt_len = if header.ignore_zrlt {
            self.stage[..fse_len].copy_from_slice(&self.tmp[..fse_len]);
            fse_len
        } else {
            self.zrlt.inverse(&self.tmp[..fse_len], &mut self.stage)?
        };

        let sbrt_len = self.sbrt.inverse(&self.stage[..zrlt_len], &mut self.stage2)?;
        let bwts_len = self.bwts.inverse(&self.stage2[..sbrt_len], &mut self.stage)?;

        Ok(self.stage[..bwts_len].to_vec())
    }
}

// ------------------------------------------------------------------------------------------------
// Key walk
// ------------------------------------------------------------------------------------------------

/// Walk the delta-coded keys of a decoded keys segment looking for
/// `mapped_key`.
///
/// The segment stores one unsigned varint delta per key after the block's
/// index key; intra-block index 0 is the index key itself, so the first
/// decoded key has index 1. Returns the index of the exact match, or
/// `None` once a decoded key exceeds the target or the segment runs out.
pub fn find_block_key_index(
    encoded_keys: &[u8],
    index_key: u64,
    mapped_key: u64,
) -> Option<usize> {
    let mut prev = index_key;
    let mut offset = 0usize;
    let mut cur_index = 1usize;
    while offset < encoded_keys.len() {
        let (delta, next_offset) = key_delta(encoded_keys, offset);
        offset = next_offset;
        let decoded = prev.wrapping_add(delta);
        if decoded == mapped_key {
            return Some(cur_index);
        }
        if decoded > mapped_key {
            return None;
        }
        prev = decoded;
        cur_index += 1;
    }
    None
}

// ------------------------------------------------------------------------------------------------
// Coordinates
// ------------------------------------------------------------------------------------------------

/// A decoded coordinate pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coords {
    /// Latitude, `[-90, 90]`.
    pub lat: f32,
    /// Longitude, `[-180, 180]`.
    pub lon: f32,
}

/// Decode the coordinates of record `block_key_index` from a decoded
/// coordinate segment.
///
/// The segment is a MSB-first bit stream: four `bounding_box_bits`-wide
/// bounding-box indices, the two [`COORD_SPEC_BITS`]-wide per-record
/// widths, then `coords_bits` bits per record with latitude in the low
/// bits. Reconstruction runs in `f64` against the global grid steps and
/// narrows to `f32` at the end.
pub fn decode_coords(
    encoded: &[u8],
    block_key_index: usize,
    bounding_box_bits: u32,
    lat_step: f64,
    lon_step: f64,
) -> Result<Coords, BlockError> {
    let mut bits = MsbBitReader::new(encoded);

    let lat_min_index = bits.read_bits(bounding_box_bits)?;
    let lon_min_index = bits.read_bits(bounding_box_bits)?;
    let lat_max_index = bits.read_bits(bounding_box_bits)?;
    let lon_max_index = bits.read_bits(bounding_box_bits)?;
    let lat_bits = bits.read_bits(COORD_SPEC_BITS)? as u32;
    let lon_bits = bits.read_bits(COORD_SPEC_BITS)? as u32;
    let coords_bits = lat_bits + lon_bits;

    let min_corner_lat = lat_min_index as f64 * lat_step + MIN_LAT;
    let min_corner_lon = lon_min_index as f64 * lon_step + MIN_LON;
    let max_lat_diff = lat_max_index as f64 * lat_step + MIN_LAT - min_corner_lat;
    let max_lon_diff = lon_max_index as f64 * lon_step + MIN_LON - min_corner_lon;

    bits.skip(block_key_index * coords_bits as usize);
    let combined = bits.read_bits(coords_bits)?;

    let lat_idx = combined & ((1u64 << lat_bits) - 1);
    let lon_idx = (combined >> lat_bits) & ((1u64 << lon_bits) - 1);

    let lat_levels = (1u64 << lat_bits) - 1;
    let lon_levels = (1u64 << lon_bits) - 1;

    // A zero width means the whole block sits on the box minimum corner.
    let lat = if lat_levels == 0 {
        min_corner_lat
    } else {
        min_corner_lat + max_lat_diff * lat_idx as f64 / lat_levels as f64
    };
    let lon = if lon_levels == 0 {
        min_corner_lon
    } else {
        min_corner_lon + max_lon_diff * lon_idx as f64 / lon_levels as f64
    };

    Ok(Coords {
        lat: lat as f32,
        lon: lon as f32,
    })
}

// ------------------------------------------------------------------------------------------------
// Extra data
// ------------------------------------------------------------------------------------------------

/// Slice record `index`'s payload out of a decoded extra-data segment.
pub fn extra_data_slice(
    decoded: &[u8],
    index: usize,
    extra_data_size: usize,
) -> Result<&[u8], BlockError> {
    let start = index * extra_data_size;
    let end = start + extra_data_size;
    if end > decoded.len() {
        return Err(BlockError::RecordOutOfRange {
            index,
            len: decoded.len(),
        });
    }
    Ok(&decoded[start..end])
}
