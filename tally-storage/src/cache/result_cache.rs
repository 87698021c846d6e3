//! Bounded LRU memo of computed aggregates.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tally_core::{QueryResult, StoreName};
use tracing::trace;

use super::key::CacheKey;
use super::stats::CacheStats;

/// Thread-safe LRU cache of query results with per-store invalidation.
///
/// A capacity of zero disables caching: every lookup misses and puts are
/// dropped.
#[derive(Debug)]
pub struct ResultCache {
    inner: Mutex<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

#[derive(Debug)]
struct CacheInner {
    entries: Option<LruCache<CacheKey, Arc<QueryResult>>>,
    /// Secondary index: store -> keys currently cached for it.
    by_store: HashMap<StoreName, HashSet<CacheKey>>,
}

impl CacheInner {
    fn unindex(&mut self, key: &CacheKey) {
        if let Some(keys) = self.by_store.get_mut(key.store()) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_store.remove(key.store());
            }
        }
    }
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: NonZeroUsize::new(capacity).map(LruCache::new),
                by_store: HashMap::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    // Entries are plain values; a panic mid-update cannot leave them torn.
    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.lock()
            .entries
            .as_ref()
            .map_or(0, |entries| entries.cap().get())
    }

    /// Look up a result, promoting it to most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<QueryResult>> {
        let found = self
            .lock()
            .entries
            .as_mut()
            .and_then(|entries| entries.get(key).cloned());
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Store a result, replacing any previous value for the key.
    pub fn put(&self, key: CacheKey, value: Arc<QueryResult>) {
        let mut inner = self.lock();
        let Some(entries) = inner.entries.as_mut() else {
            return;
        };
        let displaced = entries.push(key.clone(), value);
        inner
            .by_store
            .entry(key.store().clone())
            .or_default()
            .insert(key.clone());

        if let Some((old, _)) = displaced {
            if old != key {
                trace!(evicted = %old, "Result cache eviction");
                inner.unindex(&old);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Drop every entry belonging to `store`. Returns how many were removed.
    pub fn invalidate(&self, store: &StoreName) -> u64 {
        let mut inner = self.lock();
        let Some(keys) = inner.by_store.remove(store) else {
            return 0;
        };
        let mut removed = 0u64;
        if let Some(entries) = inner.entries.as_mut() {
            for key in &keys {
                if entries.pop(key).is_some() {
                    removed += 1;
                }
            }
        }
        self.invalidations.fetch_add(removed, Ordering::Relaxed);
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().entries.as_ref().map_or(0, LruCache::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.len() as u64,
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}
