//! Shared cache of encoded icon bitmaps

use crate::config::{CacheConfig, CachePolicy};
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Size used by whole-file extraction, which always returns native size
pub const NATIVE_SIZE: i32 = -1;

/// Identifies one cached bitmap
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IconCacheKey {
    pub source: String,
    pub index: i32,
    pub size: i32,
}

impl IconCacheKey {
    pub fn new(source: impl Into<String>, index: i32, size: i32) -> Self {
        Self {
            source: source.into(),
            index,
            size,
        }
    }

    /// Key for the icon at `position` of a whole-file extraction
    pub fn whole_file(source: impl Into<String>, position: i32) -> Self {
        Self::new(source, position, NATIVE_SIZE)
    }
}

/// Encoded icon plus the index it was extracted from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconRecord {
    pub bytes: Arc<[u8]>,
    pub index: i32,
}

impl IconRecord {
    pub fn new(bytes: Vec<u8>, index: i32) -> Self {
        Self {
            bytes: bytes.into(),
            index,
        }
    }
}

/// Thread-safe icon cache. Concurrent misses for one key may both extract;
/// the last insert wins.
pub enum IconCache {
    Unbounded(DashMap<IconCacheKey, IconRecord>),
    Lru(Mutex<LruCache<IconCacheKey, IconRecord>>),
}

impl IconCache {
    pub fn unbounded() -> Self {
        IconCache::Unbounded(DashMap::new())
    }

    pub fn lru(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        IconCache::Lru(Mutex::new(LruCache::new(capacity)))
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        match config.policy {
            CachePolicy::Unbounded => Self::unbounded(),
            CachePolicy::Lru => Self::lru(config.capacity),
        }
    }

    pub fn lookup(&self, key: &IconCacheKey) -> Option<IconRecord> {
        match self {
            IconCache::Unbounded(map) => map.get(key).map(|entry| entry.value().clone()),
            IconCache::Lru(lru) => lru.lock().get(key).cloned(),
        }
    }

    pub fn insert(&self, key: IconCacheKey, record: IconRecord) {
        match self {
            IconCache::Unbounded(map) => {
                map.insert(key, record);
            }
            IconCache::Lru(lru) => {
                lru.lock().put(key, record);
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IconCache::Unbounded(map) => map.len(),
            IconCache::Lru(lru) => lru.lock().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for IconCache {
    fn default() -> Self {
        Self::unbounded()
    }
}
