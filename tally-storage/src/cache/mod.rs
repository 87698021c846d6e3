//! Response cache for computed aggregates.
//!
//! Entries are keyed by store and a canonical request signature, so two
//! requests that validate to the same parameters share one entry regardless of
//! parameter order or textual spelling.
//!
//! A secondary index from store name to cached keys lets a write or delete
//! drop every entry for one store without scanning the whole cache.

pub mod key;
pub mod result_cache;
pub mod stats;

pub use key::CacheKey;
pub use result_cache::ResultCache;
pub use stats::CacheStats;
