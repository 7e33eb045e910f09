//! The database facade: open, look up, close.
//!
//! ## Design Overview
//!
//! A database is a single read-only file, memory-mapped at open. The header
//! is parsed once and fixes every decoding parameter; the rest of the file
//! is touched lazily, one block per lookup:
//!
//! ```text
//! raw key ──► key map ──► index binary search ──► block decode ──► result
//!                │                │                    │
//!                ▼                ▼                    ▼
//!          result cache     (mapped file)    keys/coords/extra caches
//! ```
//!
//! Lookups cache at two granularities: the final (possibly negative) result
//! per raw key, and the decoded segment buffers per block. Cache hits touch
//! neither the entropy coder nor the transforms and do not allocate.
//!
//! ## Error model
//!
//! Opening surfaces I/O and format errors — a database that cannot parse
//! its header is unusable. Once open, a format error inside one block only
//! proves that block corrupt: the lookup degrades to "not found" and the
//! rest of the file stays queryable. Argument errors (a key of the wrong
//! length) always surface.
//!
//! ## Concurrency
//!
//! One instance serves one thread: `lookup` takes `&mut self` because it
//! mutates the caches and scratch buffers. Separate instances share
//! nothing.


use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::block::{
    decode_coords, extra_data_slice, find_block_key_index, segment_bytes, BlockDecoder,
    BlockError, Coords, SegmentHeader, MAX_LAT, MAX_LON, MIN_LAT, MIN_LON,
};
use crate::cache::LruMap;
use crate::encoding::{key_to_u64, Cursor, EncodingError, Key};
use crate::fse::{FseDecoder, FseError};
use crate::index::{IndexMatch, IndexSearcher};
use crate::keymap::KeyMap;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// The 9-byte ASCII file signature.
pub const FILE_SIGNATURE: &[u8; 9] = b"DwarfIdea";

/// The only supported format version.
pub const SUPPORTED_VERSION: u16 = 1;

// ------------------------------------------------------------------------------------------------
// Error types
// ------------------------------------------------------------------------------------------------

/// A violation of the on-disk format.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The file does not start with [`FILE_SIGNATURE`].
    #[error("unexpected file signature")]
    Signature,

    /// The file's version is not [`SUPPORTED_VERSION`].
    #[error("unsupported format version {0}")]
    Version(u16),

    /// A header field holds a value outside its valid range.
    #[error("invalid header field {field}: {value}")]
    InvalidHeader {
        /// Name of the offending field.
        field: &'static str,
        /// The decoded value.
        value: u64,
    },

    /// A fixed-layout region ran past the end of the file.
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// An FSE probability table could not be read.
    #[error(transparent)]
    Fse(#[from] FseError),

    /// A block failed to decode.
    #[error(transparent)]
    Block(#[from] BlockError),
}

/// Errors surfaced by the public API.
#[derive(Debug, Error)]
pub enum DbError {
    /// The file could not be opened or mapped.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file violates the on-disk format.
    #[error("file format error: {0}")]
    Format(#[from] FormatError),

    /// The queried key does not have the length the header requires.
    #[error("invalid key length {actual}, expected {expected}")]
    InvalidKey {
        /// Required raw key length.
        expected: usize,
        /// Length of the supplied key.
        actual: usize,
    },
}

// ------------------------------------------------------------------------------------------------
// Configuration and results
// ------------------------------------------------------------------------------------------------

/// Cache sizing for a [`Database`] instance.
#[derive(Debug, Clone, Copy)]
pub struct DbConfig {
    /// Capacity of the per-key result cache (positive and negative results).
    pub results_cache_entries: usize,

    /// Capacity of each of the three per-block buffer caches (keys,
    /// coordinates, extra data).
    pub block_cache_entries: usize,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            results_cache_entries: 1024,
            block_cache_entries: 64,
        }
    }
}

/// A successful lookup: coordinates plus the optional extra payload.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupResult {
    /// Approximate coordinates, accurate to [`Database::max_dist_error`]
    /// meters of great-circle distance.
    pub coords: Coords,
    /// Extra payload of `extra_data_size` bytes, when the database carries
    /// one.
    pub data: Option<Vec<u8>>,
}

/// Header constants parsed once at open.
#[derive(Debug, Clone)]
pub(crate) struct Header {
    /// Stored key size in bytes, after the key-map adjustment.
    key_size: usize,
    /// Externally supplied key length (`key_size + 2` when a key map is
    /// present).
    raw_key_size: usize,
    extra_data_size: usize,
    num_entries: u32,
    index_size: u32,
    max_entries_per_block: u16,
    bounding_box_bits: u32,
    max_dist_error: f32,
}

// ------------------------------------------------------------------------------------------------
// Database
// ------------------------------------------------------------------------------------------------

/// A read-only handle to one database file.
#[derive(Debug)]
pub struct Database {
    mmap: Mmap,
    header: Header,
    key_map: Option<KeyMap>,
    keys_fse: FseDecoder,
    coords_fse: FseDecoder,
    extra_data_fse: Option<FseDecoder>,
    index: IndexSearcher,
    decoder: BlockDecoder,
    last_key: u64,
    lat_step: f64,
    lon_step: f64,
    results_cache: LruMap<Key, Option<Arc<LookupResult>>>,
    keys_cache: LruMap<u32, Arc<Vec<u8>>>,
    coords_cache: LruMap<u32, Arc<Vec<u8>>>,
    extra_data_cache: LruMap<u32, Arc<Vec<u8>>>,
}

impl Database {
    /// Open a database file.
    ///
    /// Memory-maps the file read-only, parses and validates the header,
    /// loads the optional key map and the per-stream FSE tables, and
    /// records where the block index begins. Header-level failures surface;
    /// nothing beyond the header is decoded yet.
    ///
    /// # Safety
    ///
    /// Uses `unsafe { Mmap::map(..) }`; sound because the mapping is
    /// read-only and the file is an immutable artifact of the offline
    /// builder. A file truncated behind our back surfaces as decode errors,
    /// never as unsoundness of this crate's safe API.
    pub fn open(path: impl AsRef<Path>, config: DbConfig) -> Result<Self, DbError> {
        let file = File::open(path.as_ref())?;
        let mmap = unsafe { Mmap::map(&file)? };

        let mut cursor = Cursor::new(&mmap);
        let signature = cursor.read_bytes(FILE_SIGNATURE.len()).map_err(FormatError::from)?;
        if signature != FILE_SIGNATURE {
            return Err(FormatError::Signature.into());
        }
        let version = cursor.read_u16_le().map_err(FormatError::from)?;
        if version != SUPPORTED_VERSION {
            return Err(FormatError::Version(version).into());
        }

        let parsed = Self::parse_header(&mmap, cursor)?;
        let ParsedHeader {
            header,
            key_map,
            last_key,
            keys_fse,
            coords_fse,
            extra_data_fse,
            index_offset,
        } = parsed;

        let bounding_box_max_index = ((1u64 << header.bounding_box_bits) - 1) as f64;
        let lat_step = (MAX_LAT - MIN_LAT) / bounding_box_max_index;
        let lon_step = (MAX_LON - MIN_LON) / bounding_box_max_index;

        debug!(
            num_entries = header.num_entries,
            index_size = header.index_size,
            key_size = header.key_size,
            extra_data_size = header.extra_data_size,
            key_map = key_map.as_ref().map_or(0, KeyMap::len),
            "database opened"
        );

        Ok(Self {
            index: IndexSearcher::new(index_offset, header.index_size, header.key_size),
            decoder: BlockDecoder::new(header.max_entries_per_block),
            results_cache: LruMap::new(config.results_cache_entries),
            keys_cache: LruMap::new(config.block_cache_entries),
            coords_cache: LruMap::new(config.block_cache_entries),
            extra_data_cache: LruMap::new(config.block_cache_entries),
            mmap,
            header,
            key_map,
            keys_fse,
            coords_fse,
            extra_data_fse,
            last_key,
            lat_step,
            lon_step,
        })
    }

    /// Parse everything after the signature/version words.
    fn parse_header(buf: &[u8], mut cursor: Cursor<'_>) -> Result<ParsedHeader, FormatError> {
        let mut key_size = cursor.read_u16_le()? as usize;
        let extra_data_size = cursor.read_u16_le()? as usize;
        let num_entries = cursor.read_u32_le()?;
        let index_size = cursor.read_u32_le()?;
        let min_entries_per_block = cursor.read_u16_le()?;
        let max_entries_per_block = cursor.read_u16_le()?;
        let bounding_box_bits = u32::from(cursor.read_u16_le()?);
        let max_dist_error = cursor.read_f32_le()?;
        let key_map_size = cursor.read_u16_le()?;

        let raw_key_size = key_size;
        let key_map = if key_map_size > 0 {
            // Remapping rewrites a 4-byte prefix; shorter keys cannot carry
            // one.
            if key_size < 4 {
                return Err(FormatError::InvalidHeader {
                    field: "key_size",
                    value: key_size as u64,
                });
            }
            let map = KeyMap::parse(&mut cursor, key_map_size)?;
            // The 4-byte code prefix shrinks to 2 bytes in storage.
            key_size -= 2;
            Some(map)
        } else {
            None
        };

        if key_size == 0 || key_size > 8 {
            return Err(FormatError::InvalidHeader {
                field: "key_size",
                value: key_size as u64,
            });
        }
        if bounding_box_bits == 0 || bounding_box_bits > 30 {
            return Err(FormatError::InvalidHeader {
                field: "bounding_box_bits",
                value: u64::from(bounding_box_bits),
            });
        }
        if max_entries_per_block == 0 || min_entries_per_block > max_entries_per_block {
            return Err(FormatError::InvalidHeader {
                field: "max_entries_per_block",
                value: u64::from(max_entries_per_block),
            });
        }
        if num_entries > 0 && index_size == 0 {
            return Err(FormatError::InvalidHeader {
                field: "index_size",
                value: 0,
            });
        }

        let last_key = key_to_u64(cursor.read_bytes(key_size)?);

        let keys_fse = Self::read_fse_section(&mut cursor)?;
        let coords_fse = Self::read_fse_section(&mut cursor)?;
        let extra_data_fse = if extra_data_size > 0 {
            Some(Self::read_fse_section(&mut cursor)?)
        } else {
            None
        };

        let index_offset = cursor.pos();
        let index_extent = index_size as usize * (key_size + 4);
        if index_offset.saturating_add(index_extent) > buf.len() {
            return Err(FormatError::InvalidHeader {
                field: "index_size",
                value: u64::from(index_size),
            });
        }

        Ok(ParsedHeader {
            header: Header {
                key_size,
                raw_key_size,
                extra_data_size,
                num_entries,
                index_size,
                max_entries_per_block,
                bounding_box_bits,
                max_dist_error,
            },
            key_map,
            last_key,
            keys_fse,
            coords_fse,
            extra_data_fse,
            index_offset,
        })
    }

    /// Read one `(u32 size, table bytes)` FSE section. The table reader may
    /// consume fewer bytes than declared; the cursor always advances by the
    /// declared size.
    fn read_fse_section(cursor: &mut Cursor<'_>) -> Result<FseDecoder, FormatError> {
        let size = cursor.read_u32_le()? as usize;
        let table_bytes = cursor.read_bytes(size)?;
        let (decoder, _consumed) = FseDecoder::read(table_bytes)?;
        Ok(decoder)
    }

    /// Worst-case coordinate error of this database, in meters of
    /// great-circle distance.
    pub fn max_dist_error(&self) -> f32 {
        self.header.max_dist_error
    }

    /// Total number of entries in the database.
    pub fn num_entries(&self) -> u32 {
        self.header.num_entries
    }

    /// Look up a raw key.
    ///
    /// Returns `Ok(None)` for keys not in the database — including keys
    /// whose prefix fails the key map, keys beyond the largest stored key,
    /// and keys inside a corrupt block (the corruption is logged and the
    /// rest of the database stays queryable). Only a wrong key length is an
    /// error.
    pub fn lookup(&mut self, raw_key: &[u8]) -> Result<Option<Arc<LookupResult>>, DbError> {
        if raw_key.len() != self.header.raw_key_size {
            return Err(DbError::InvalidKey {
                expected: self.header.raw_key_size,
                actual: raw_key.len(),
            });
        }

        let orig_key = Key::new(raw_key);
        if let Some(cached) = self.results_cache.get(&orig_key) {
            return Ok(cached.clone());
        }

        let mapped = match &self.key_map {
            Some(map) => map.map(raw_key),
            None => Some(orig_key),
        };
        let Some(mapped) = mapped else {
            self.results_cache.insert(orig_key, None);
            return Ok(None);
        };

        let mapped_int = mapped.as_u64();
        if mapped_int > self.last_key {
            self.results_cache.insert(orig_key, None);
            return Ok(None);
        }

        let Some(matched) = self.index.find(&self.mmap, mapped_int) else {
            self.results_cache.insert(orig_key, None);
            return Ok(None);
        };

        match self.lookup_in_block(&matched, mapped_int) {
            Ok(result) => {
                let result = result.map(Arc::new);
                self.results_cache.insert(orig_key, result.clone());
                Ok(result)
            }
            Err(err) => {
                // One corrupt block does not poison the database; the key
                // is reported absent and nothing is cached.
                warn!(
                    block_index = matched.block_index,
                    error = %err,
                    "block decode failed, treating key as absent"
                );
                Ok(None)
            }
        }
    }

    /// Decode the matched block far enough to answer for `mapped_int`.
    fn lookup_in_block(
        &mut self,
        matched: &IndexMatch,
        mapped_int: u64,
    ) -> Result<Option<LookupResult>, FormatError> {
        let buf: &[u8] = &self.mmap;

        let mut cursor = Cursor::at(buf, matched.block_offset_pos);
        let block_pos = cursor.read_u32_le()? as usize;
        let mut cursor = Cursor::at(buf, block_pos);

        // Keys segment. An exact index hit is intra-block record 0 and the
        // keys need no decoding, but the segment is always stepped over.
        let keys_header = SegmentHeader::read(&mut cursor)?;
        let keys_data_pos = cursor.pos();
        let mut block_key_index = 0usize;
        let mut found = true;
        if !matched.exact {
            let segment = segment_bytes(buf, keys_data_pos, keys_header.stored_len)?;
            let keys_buf = Self::cached_segment(
                &mut self.keys_cache,
                &mut self.decoder,
                &self.keys_fse,
                matched.block_index,
                segment,
                &keys_header,
            )?;
            match find_block_key_index(&keys_buf, matched.index_key, mapped_int) {
                Some(index) => block_key_index = index,
                None => found = false,
            }
        }
        cursor.set_pos(keys_data_pos + keys_header.stored_len);
        if !found {
            return Ok(None);
        }

        // Coordinates segment.
        let coords_header = SegmentHeader::read(&mut cursor)?;
        let coords_data_pos = cursor.pos();
        let segment = segment_bytes(buf, coords_data_pos, coords_header.stored_len)?;
        let coords_buf = Self::cached_segment(
            &mut self.coords_cache,
            &mut self.decoder,
            &self.coords_fse,
            matched.block_index,
            segment,
            &coords_header,
        )?;
        let coords = decode_coords(
            &coords_buf,
            block_key_index,
            self.header.bounding_box_bits,
            self.lat_step,
            self.lon_step,
        )?;
        cursor.set_pos(coords_data_pos + coords_header.stored_len);

        // Extra-data segment.
        let data = match (&self.extra_data_fse, self.header.extra_data_size) {
            (Some(fse), extra_data_size) if extra_data_size > 0 => {
                let extra_header = SegmentHeader::read(&mut cursor)?;
                let extra_data_pos = cursor.pos();
                let segment = segment_bytes(buf, extra_data_pos, extra_header.stored_len)?;
                let extra_buf = Self::cached_segment(
                    &mut self.extra_data_cache,
                    &mut self.decoder,
                    fse,
                    matched.block_index,
                    segment,
                    &extra_header,
                )?;
                let payload = extra_data_slice(&extra_buf, block_key_index, extra_data_size)?;
                Some(payload.to_vec())
            }
            _ => None,
        };

        Ok(Some(LookupResult { coords, data }))
    }

    /// Fetch a decoded segment from its block cache, running the inverse
    /// pipeline and filling the cache on a miss.
    fn cached_segment(
        cache: &mut LruMap<u32, Arc<Vec<u8>>>,
        decoder: &mut BlockDecoder,
        fse: &FseDecoder,
        block_index: u32,
        segment: &[u8],
        header: &SegmentHeader,
    ) -> Result<Arc<Vec<u8>>, FormatError> {
        if let Some(decoded) = cache.get(&block_index) {
            return Ok(decoded.clone());
        }
        let decoded = Arc::new(decoder.decode_segment(fse, segment, header)?);
        cache.insert(block_index, decoded.clone());
        Ok(decoded)
    }

    /// Close the database, dropping the caches and unmapping the file.
    ///
    /// Consumes the handle; the type system rules out use after close.
    pub fn close(self) {}
}

/// Intermediate carrier for everything `parse_header` produces.
struct ParsedHeader {
    header: Header,
    key_map: Option<KeyMap>,
    last_key: u64,
    keys_fse: FseDecoder,
    coords_fse: FseDecoder,
    extra_data_fse: Option<FseDecoder>,
    index_offset: usize,
}
