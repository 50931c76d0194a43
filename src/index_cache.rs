//! Bounded LRU cache for query results
//!
//! Entries are keyed by a query signature (`usages:<path>:<line>:<col>`) so
//! every result derived from one file can be dropped with a single prefix
//! invalidation, without knowing the exact cursor positions that were queried.
//!
//! Recency is tracked by insertion order in an [`IndexMap`]: the front is the
//! least-recently-used entry, the back the most recent. Touching or evicting
//! an entry shifts the entries behind it, so those operations are linear in
//! the cache size.

use indexmap::IndexMap;
use std::time::Instant;

/// A cached value and the moment it was stored
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub created_at: Instant,
}

/// Bounded key → value store with strict LRU eviction
#[derive(Debug)]
pub struct IndexCache<T> {
    max_size: usize,
    entries: IndexMap<String, CacheEntry<T>>,
}

impl<T: Clone> IndexCache<T> {
    /// Create a cache holding at most `max_size` entries
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            entries: IndexMap::with_capacity(max_size),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up `key`, marking it most-recently-used on a hit
    pub fn get(&mut self, key: &str) -> Option<T> {
        let (key, entry) = self.entries.shift_remove_entry(key)?;
        let value = entry.value.clone();
        self.entries.insert(key, entry);
        Some(value)
    }

    /// Insert or overwrite `key`, evicting least-recently-used entries first
    pub fn set(&mut self, key: impl Into<String>, value: T) {
        if self.max_size == 0 {
            return;
        }

        let key = key.into();
        self.entries.shift_remove(&key);

        while self.entries.len() >= self.max_size {
            if let Some((evicted, _)) = self.entries.shift_remove_index(0) {
                log::trace!("Cache evicted {}", evicted);
            }
        }

        self.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: Instant::now(),
            },
        );
    }

    /// Membership test without touching recency
    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove `key`; returns whether it was present
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.shift_remove(key).is_some()
    }

    /// Remove every key starting with `prefix`; returns how many were removed
    pub fn invalidate_by_prefix(&mut self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entry metadata for `key` without touching recency
    pub fn entry(&self, key: &str) -> Option<&CacheEntry<T>> {
        self.entries.get(key)
    }

    /// Keys from least- to most-recently-used
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
