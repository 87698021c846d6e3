//! Per-name exclusive access to stores.
//!
//! The broker owns the [`Registry`] and the [`ResultCache`] and hands out at
//! most one [`Checkout`] per store name at a time. Waiters for the same name
//! are served in arrival order; different names never wait on each other.
//!
//! # Lock table
//!
//! Each name maps to an `Arc<tokio::sync::Mutex<()>>` in a [`DashMap`]. The
//! map's entry API is the creation-time guard: two requests racing on an
//! unseen name always end up cloning the same mutex. When the last holder or
//! waiter for a name leaves, its entry is pruned under the shard lock.
//!
//! ```text
//! checkout(N) ── lock(N) ── exists? ── open ──→ Checkout ── drop ──→ unlock(N)
//!                                                  │
//!                                  insert ──→ invalidate cache(N)
//!                                  read   ──→ remember(key, result)
//! ```
//!
//! Cache lookups never take a name lock, so hits stay fast under contention.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tally_core::{
    AggregateList, AnalyticRecord, GroupProperty, Interval, IntervalSeries, QueryResult,
    StorageError, StoreName, TallyResult, TimeRange, Totals,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::cache::{CacheKey, ResultCache};
use crate::engine::StoreHandle;
use crate::registry::Registry;

type LockTable = DashMap<StoreName, Arc<Mutex<()>>>;

/// Broker behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Upper bound on waiting for a contended name. `None` waits forever.
    pub checkout_timeout: Option<Duration>,
    /// Drop a store's cached results whenever a record is inserted into it.
    ///
    /// Disabling this serves possibly stale aggregates after a write until the
    /// entry is evicted.
    pub invalidate_on_write: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            checkout_timeout: None,
            invalidate_on_write: true,
        }
    }
}

impl BrokerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the checkout timeout.
    pub fn with_checkout_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.checkout_timeout = timeout;
        self
    }

    /// Enable or disable invalidation on insert.
    pub fn with_invalidate_on_write(mut self, enabled: bool) -> Self {
        self.invalidate_on_write = enabled;
        self
    }
}

/// How a read was served.
#[derive(Debug, Clone)]
pub struct Served {
    pub result: Arc<QueryResult>,
    pub cache_hit: bool,
    /// Time spent waiting for the name lock. Zero on cache hits.
    pub waited: Duration,
}

/// Coordinator for all store access.
pub struct AccessBroker {
    registry: Registry,
    cache: ResultCache,
    locks: Arc<LockTable>,
    config: BrokerConfig,
}

impl fmt::Debug for AccessBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessBroker")
            .field("root", &self.registry.root())
            .field("held_names", &self.locks.len())
            .field("config", &self.config)
            .finish()
    }
}

impl AccessBroker {
    pub fn new(registry: Registry, cache: ResultCache, config: BrokerConfig) -> Self {
        Self {
            registry,
            cache,
            locks: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Names with a live lock-table entry (held or awaited).
    pub fn held_names(&self) -> usize {
        self.locks.len()
    }

    /// Unlocked existence check, for failing fast before a checkout.
    pub fn exists(&self, name: &StoreName) -> TallyResult<bool> {
        self.registry.exists(name)
    }

    /// Cache lookup. Never takes a name lock.
    pub fn cache_get(&self, key: &CacheKey) -> Option<Arc<QueryResult>> {
        self.cache.get(key)
    }

    /// Cache insert outside any checkout.
    pub fn cache_put(&self, key: CacheKey, value: Arc<QueryResult>) {
        self.cache.put(key, value);
    }

    async fn hold(&self, name: &StoreName) -> TallyResult<NameHold> {
        // Dropping an ungranted hold still prunes, so a waiter cancelled
        // mid-await does not leave its entry behind.
        let mut hold = NameHold {
            name: name.clone(),
            guard: None,
            locks: Arc::clone(&self.locks),
            waited: Duration::ZERO,
        };
        // The shard guard from `entry` must not live across the await below.
        let lock = Arc::clone(
            self.locks
                .entry(name.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );

        let started = Instant::now();
        let guard = match self.config.checkout_timeout {
            None => lock.lock_owned().await,
            Some(limit) => match tokio::time::timeout(limit, lock.lock_owned()).await {
                Ok(guard) => guard,
                Err(_) => {
                    let waited_ms = started.elapsed().as_millis() as u64;
                    warn!(store = %name, waited_ms, "Checkout timed out");
                    return Err(StorageError::Busy {
                        name: name.to_string(),
                        waited_ms,
                    }
                    .into());
                }
            },
        };

        hold.guard = Some(guard);
        hold.waited = started.elapsed();
        Ok(hold)
    }

    /// Exclusive access to an existing store.
    ///
    /// Existence is re-checked under the lock, so a store deleted between a
    /// caller's check and this call yields `StoreNotFound`.
    pub async fn checkout(&self, name: &StoreName) -> TallyResult<Checkout<'_>> {
        let hold = self.hold(name).await?;
        if !self.registry.exists(name)? {
            return Err(StorageError::NotFound {
                name: name.to_string(),
            }
            .into());
        }
        let handle = self.registry.open(name)?;
        debug!(store = %name, waited_ms = hold.waited.as_millis() as u64, "Checked out store");
        Ok(Checkout {
            handle,
            hold,
            broker: self,
        })
    }

    /// Exclusive access to a store, creating it if absent.
    pub async fn checkout_or_create(&self, name: &StoreName) -> TallyResult<Checkout<'_>> {
        let hold = self.hold(name).await?;
        let handle = self.registry.create(name)?;
        debug!(store = %name, waited_ms = hold.waited.as_millis() as u64, "Checked out store");
        Ok(Checkout {
            handle,
            hold,
            broker: self,
        })
    }

    /// Delete a store and every cached result for it.
    pub async fn delete(&self, name: &StoreName) -> TallyResult<()> {
        let _hold = self.hold(name).await?;
        if !self.registry.exists(name)? {
            return Err(StorageError::NotFound {
                name: name.to_string(),
            }
            .into());
        }
        let result = self.registry.delete(name);
        // Drop cached results even if removal failed part way.
        let dropped = self.cache.invalidate(name);
        debug!(store = %name, dropped, "Invalidated cache after delete");
        result
    }

    /// Serve a read from cache, or compute it under an exclusive checkout.
    ///
    /// `compute` runs while the name is held and its result is cached before
    /// the hold is released, so a concurrent insert cannot slip in between.
    pub async fn read<F>(&self, name: &StoreName, key: CacheKey, compute: F) -> TallyResult<Served>
    where
        F: FnOnce(&Checkout<'_>) -> TallyResult<QueryResult>,
    {
        if !self.registry.exists(name)? {
            return Err(StorageError::NotFound {
                name: name.to_string(),
            }
            .into());
        }
        if let Some(result) = self.cache.get(&key) {
            return Ok(Served {
                result,
                cache_hit: true,
                waited: Duration::ZERO,
            });
        }

        let checkout = self.checkout(name).await?;
        let computed = compute(&checkout)?;
        let result = checkout.remember(key, computed);
        let waited = checkout.waited();
        checkout.release();
        Ok(Served {
            result,
            cache_hit: false,
            waited,
        })
    }
}

fn prune(locks: &LockTable, name: &StoreName) {
    // Only the table itself still references the mutex: nobody holds or awaits it.
    locks.remove_if(name, |_, lock| Arc::strong_count(lock) == 1);
}

/// Exclusive hold on one name. Released on drop.
struct NameHold {
    name: StoreName,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockTable>,
    waited: Duration,
}

impl Drop for NameHold {
    fn drop(&mut self) {
        drop(self.guard.take());
        prune(&self.locks, &self.name);
    }
}

/// An exclusive checkout of one store.
///
/// Dropping the checkout releases the name, including on early return and
/// unwinding.
pub struct Checkout<'a> {
    // Declared before `hold` so the handle clone drops before the name unlocks.
    handle: StoreHandle,
    hold: NameHold,
    broker: &'a AccessBroker,
}

impl fmt::Debug for Checkout<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checkout")
            .field("store", &self.hold.name)
            .field("waited", &self.hold.waited)
            .finish()
    }
}

impl Checkout<'_> {
    pub fn name(&self) -> &StoreName {
        &self.hold.name
    }

    pub fn handle(&self) -> &StoreHandle {
        &self.handle
    }

    /// Time spent waiting for the name lock.
    pub fn waited(&self) -> Duration {
        self.hold.waited
    }

    /// Append a record, invalidating cached results for this store if configured.
    pub fn insert(&self, record: &AnalyticRecord) -> TallyResult<()> {
        self.handle.insert(record)?;
        if self.broker.config.invalidate_on_write {
            self.broker.cache.invalidate(self.name());
        }
        Ok(())
    }

    pub fn query(&self, range: &TimeRange) -> TallyResult<Totals> {
        self.handle.query(range)
    }

    pub fn group_by(
        &self,
        property: GroupProperty,
        range: &TimeRange,
        unique: bool,
    ) -> TallyResult<AggregateList> {
        self.handle.group_by(property, range, unique)
    }

    pub fn over_time(
        &self,
        interval: Interval,
        range: &TimeRange,
        unique: bool,
    ) -> TallyResult<IntervalSeries> {
        self.handle.over_time(interval, range, unique)
    }

    /// Cache a result computed under this checkout.
    pub fn remember(&self, key: CacheKey, value: QueryResult) -> Arc<QueryResult> {
        let value = Arc::new(value);
        self.broker.cache.put(key, Arc::clone(&value));
        value
    }

    /// Release the name explicitly.
    pub fn release(self) {}
}
