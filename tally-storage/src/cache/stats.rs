//! Cache usage counters.

use serde::Serialize;

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Entries dropped by the LRU policy.
    pub evictions: u64,
    /// Entries dropped by store invalidation.
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate.
    ///
    /// Returns 0.0 if there have been no requests.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
