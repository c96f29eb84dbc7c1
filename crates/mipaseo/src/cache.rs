//! Keyed cache for read responses.
//!
//! The cache is never a source of truth and nothing invalidates it automatically: after a
//! successful mutation the caller must invalidate every key derived from the data it
//! touched. Keys are segments joined with `:` so prefixes only match whole segments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde_json::Value;

const SEPARATOR: char = ':';

/// Entry bound applied by [`QueryCache::new`].
pub const DEFAULT_MAX_ENTRIES: usize = 4096;

/// Build a cache key from its segments.
pub fn cache_key(segments: &[&str]) -> String {
    segments.join(&SEPARATOR.to_string())
}

#[derive(Debug, Clone)]
struct CachedEntry {
    value: Value,
    stored_at: Instant,
}

#[derive(Debug)]
pub struct QueryCache {
    entries: RwLock<HashMap<String, CachedEntry>>,
    ttl: Option<Duration>,
    max_entries: usize,
    /// Bumped by every invalidation; a fill computed across a bump is discarded.
    generation: AtomicU64,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(None)
    }
}

impl QueryCache {
    /// `None` keeps entries until they are invalidated, evicted or the cache is cleared.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self::with_capacity(ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(ttl: Option<Duration>, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
            generation: AtomicU64::new(0),
        }
    }

    fn is_fresh(&self, entry: &CachedEntry) -> bool {
        self.ttl
            .map_or(true, |ttl| entry.stored_at.elapsed() < ttl)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                None => return None,
                Some(entry) if self.is_fresh(entry) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }
        // Expired: drop it unless a concurrent insert refreshed it meanwhile.
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.get(key).is_some_and(|entry| !self.is_fresh(entry)) {
            entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        self.store_locked(&mut entries, key.into(), value);
    }

    /// Return the cached value or compute, store and return a fresh one. Errors are not
    /// cached, and neither is a value whose computation overlapped an invalidation.
    pub fn get_or_try_insert_with<E, F>(&self, key: &str, fetch: F) -> Result<Value, E>
    where
        F: FnOnce() -> Result<Value, E>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let observed = self.generation.load(Ordering::Acquire);
        let value = fetch()?;

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::Acquire) == observed {
            self.store_locked(&mut entries, key.to_string(), value.clone());
        }
        Ok(value)
    }

    fn store_locked(&self, entries: &mut HashMap<String, CachedEntry>, key: String, value: Value) {
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            entries.retain(|_, entry| self.is_fresh(entry));
            if entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.stored_at)
                    .map(|(key, _)| key.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(
            key,
            CachedEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop the key equal to `prefix` and every key extending it by whole segments.
    /// Returns how many entries were removed.
    pub fn invalidate(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        self.generation.fetch_add(1, Ordering::AcqRel);
        let before = entries.len();
        entries.retain(|key, _| !matches_prefix(key, prefix));
        before - entries.len()
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn matches_prefix(key: &str, prefix: &str) -> bool {
    match key.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with(SEPARATOR),
        None => false,
    }
}
