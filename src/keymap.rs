//! Optional key-prefix remapping.
//!
//! Cellular-style databases carry a small table translating the 4-byte
//! big-endian `(primary, secondary)` code prefix (e.g. MCC/MNC) of each raw
//! key into a dense 2-byte code, shrinking every stored key by two bytes.
//! Entry `i` of the on-disk table is the `u32` prefix whose mapped code is
//! `i`. A raw key whose prefix is absent from the table cannot exist in the
//! database, so mapping failure is an ordinary miss.

use std::collections::HashMap;

use crate::encoding::{Cursor, EncodingError, Key};

/// The prefix translation table.
#[derive(Debug)]
pub struct KeyMap {
    codes: HashMap<u32, u16>,
}

impl KeyMap {
    /// Parse `count` `u32` prefix entries at the cursor; the entry position
    /// defines its mapped code.
    pub fn parse(cursor: &mut Cursor<'_>, count: u16) -> Result<Self, EncodingError> {
        let mut codes = HashMap::with_capacity(count as usize);
        for code in 0..count {
            let key_value = cursor.read_u32_le()?;
            codes.insert(key_value, code);
        }
        Ok(Self { codes })
    }

    /// Number of mapped prefixes.
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Remap a raw key: bytes `[0..2)` and `[2..4)` are the big-endian
    /// primary/secondary codes; the mapped key is the 2-byte code followed
    /// by the raw tail. Returns `None` for unknown prefixes.
    ///
    /// `raw` must be at least 4 bytes; the facade validates key lengths
    /// before mapping.
    pub fn map(&self, raw: &[u8]) -> Option<Key> {
        let primary = u32::from(u16::from_be_bytes([raw[0], raw[1]]));
        let secondary = u32::from(u16::from_be_bytes([raw[2], raw[3]]));
        let key_value = (primary << 16) | secondary;
        let code = *self.codes.get(&key_value)?;
        Some(Key::from_segments(&code.to_be_bytes(), &raw[4..]))
    }
}
