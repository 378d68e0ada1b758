//! In-process result cache.

use dashmap::DashMap;

use super::{CacheKey, CacheResult, QueryCache};
use crate::executor::QueryResult;

pub const DEFAULT_MAX_ENTRIES: usize = 1024;

/// Concurrent map of results, bounded by entry count.
///
/// Each key is read and written atomically; keys on different shards never
/// contend. When full, an arbitrary entry is evicted to make room.
#[derive(Debug)]
pub struct MemoryQueryCache {
    entries: DashMap<CacheKey, QueryResult>,
    max_entries: usize,
}

impl MemoryQueryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for MemoryQueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl QueryCache for MemoryQueryCache {
    fn get(&self, key: &CacheKey) -> CacheResult<Option<QueryResult>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn put(&self, key: CacheKey, result: QueryResult) -> CacheResult<()> {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            // The iterator guard must be gone before removing.
            let victim = self.entries.iter().next().map(|entry| entry.key().clone());
            if let Some(victim) = victim {
                self.entries.remove(&victim);
            }
        }
        self.entries.insert(key, result);
        Ok(())
    }
}
