//! Bounded LRU maps for lookup results and decoded block buffers.
//!
//! A thin wrapper over [`lru::LruCache`] fixing the crate's semantics:
//! capacity is the **post-insert** cap (inserting into a full map evicts
//! the least-recently-used entry first), every `get` promotes the entry to
//! most-recently-used, and `Option` values are legitimate — the result
//! cache stores `None` to remember misses (negative caching).
//!
//! Lookups are single-threaded per database instance, so no locking lives
//! here; mutation flows through `&mut self`.

use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;

/// A bounded associative map with access-order eviction.
#[derive(Debug)]
pub struct LruMap<K: Hash + Eq, V> {
    inner: LruCache<K, V>,
}

impl<K: Hash + Eq, V> LruMap<K, V> {
    /// Map holding at most `capacity` entries. A zero capacity is clamped
    /// to one (the backing store requires a non-zero bound).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(capacity),
        }
    }

    /// Fetch an entry, promoting it to most-recently-used.
    #[inline]
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// Insert an entry, evicting the least-recently-used one if the map is
    /// full.
    #[inline]
    pub fn insert(&mut self, key: K, value: V) {
        self.inner.put(key, value);
    }

    /// Number of retained entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the map is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The configured capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.cap().get()
    }
}
