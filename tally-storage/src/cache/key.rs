//! Canonical cache keys.
//!
//! A key is built only from validated values, never from the raw request
//! string. Parameters appear in a fixed order and timestamps are rendered in
//! UTC RFC 3339, so equivalent requests collide on purpose.

use std::fmt;

use tally_core::{GroupProperty, Interval, StoreName, TimeRange};

/// Store-scoped cache key.
///
/// Cannot be built without a store name, which is what the per-store
/// invalidation index is keyed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    store: StoreName,
    signature: String,
}

impl CacheKey {
    /// Key for a totals query.
    pub fn totals(store: &StoreName, range: &TimeRange) -> Self {
        Self::build(store, "totals", range, None, None)
    }

    /// Key for a group-by query.
    pub fn group_by(
        store: &StoreName,
        property: GroupProperty,
        range: &TimeRange,
        unique: bool,
    ) -> Self {
        Self::build(
            store,
            &format!("group:{}", property.as_str()),
            range,
            None,
            Some(unique),
        )
    }

    /// Key for an over-time query.
    pub fn over_time(
        store: &StoreName,
        interval: Interval,
        range: &TimeRange,
        unique: bool,
    ) -> Self {
        Self::build(store, "time", range, Some(interval), Some(unique))
    }

    fn build(
        store: &StoreName,
        kind: &str,
        range: &TimeRange,
        interval: Option<Interval>,
        unique: Option<bool>,
    ) -> Self {
        let mut signature = String::from(kind);
        if let Some(end) = range.end() {
            signature.push_str("&end=");
            signature.push_str(&end.to_rfc3339());
        }
        if let Some(interval) = interval {
            signature.push_str("&interval=");
            signature.push_str(&interval.as_secs().to_string());
        }
        if let Some(start) = range.start() {
            signature.push_str("&start=");
            signature.push_str(&start.to_rfc3339());
        }
        if let Some(unique) = unique {
            signature.push_str(if unique { "&unique=true" } else { "&unique=false" });
        }
        Self {
            store: store.clone(),
            signature,
        }
    }

    pub fn store(&self) -> &StoreName {
        &self.store
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}?{}", self.store, self.signature)
    }
}
