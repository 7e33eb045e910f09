//! Binary search over the sorted block index.
//!
//! The index is a contiguous run of `index_size` fixed-stride entries
//! `(index_key, block_offset)`: `key_size` big-endian key bytes followed by
//! a little-endian `u32` file offset, sorted ascending by key. The search
//! finds the **largest** entry whose key does not exceed the target, which
//! names the only block that can contain it.


use crate::encoding::key_to_u64;

/// Outcome of an index search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexMatch {
    /// Position of the matched entry within the index.
    pub block_index: u32,
    /// Absolute file offset of the entry's `u32` block offset (immediately
    /// after the index key bytes).
    pub block_offset_pos: usize,
    /// The entry's key as an unsigned big-endian integer.
    pub index_key: u64,
    /// Whether the entry's key equals the target exactly.
    pub exact: bool,
}

/// Searcher over the index region of the mapped file.
#[derive(Debug)]
pub struct IndexSearcher {
    index_offset: usize,
    index_size: u32,
    key_size: usize,
}

impl IndexSearcher {
    /// Searcher for `index_size` entries of `key_size`-byte keys starting
    /// at `index_offset`.
    pub fn new(index_offset: usize, index_size: u32, key_size: usize) -> Self {
        Self {
            index_offset,
            index_size,
            key_size,
        }
    }

    /// Entry stride: key bytes plus the 4-byte block offset.
    #[inline]
    fn stride(&self) -> usize {
        self.key_size + 4
    }

    /// Read the key of entry `i`, or `None` when the index region is
    /// truncated.
    fn entry_key(&self, buf: &[u8], i: i64) -> Option<u64> {
        let pos = self.index_offset + i as usize * self.stride();
        let end = pos.checked_add(self.key_size)?;
        if end > buf.len() {
            return None;
        }
        Some(key_to_u64(&buf[pos..end]))
    }

    /// Find the largest entry with `index_key ≤ mapped_key`.
    ///
    /// Unsigned comparison throughout. The `carry` nudges the midpoint
    /// upward once the window narrows to two entries, so the upper of two
    /// candidates still below the target wins.
    pub fn find(&self, buf: &[u8], mapped_key: u64) -> Option<IndexMatch> {
        if self.index_size == 0 {
            return None;
        }
        let max_index = i64::from(self.index_size) - 1;
        let mut low: i64 = 0;
        let mut high: i64 = max_index;
        let mut carry: i64 = 0;

        while low < high {
            let mid = (low + high + carry) / 2;
            let cur = self.entry_key(buf, mid)?;
            if cur > mapped_key {
                high = mid - 1;
            } else if cur < mapped_key {
                low = mid;
                if low + 1 == high {
                    carry = 1;
                }
            } else {
                low = mid;
                high = mid;
            }
        }

        if high < 0 || low > max_index {
            return None;
        }
        let index_key = self.entry_key(buf, low)?;
        Some(IndexMatch {
            block_index: low as u32,
            block_offset_pos: self.index_offset + low as usize * self.stride() + self.key_size,
            index_key,
            exact: index_key == mapped_key,
        })
    }
}
