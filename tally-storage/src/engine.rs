//! LMDB-backed per-store engine.
//!
//! Each store lives in its own LMDB environment under `<data_dir>/<name>/`.
//! Records are keyed by `[time][sequence]` so time windows map onto LMDB
//! range scans:
//!
//! - Bytes 0-7: event time in milliseconds, sign bit flipped, big-endian
//!   (orders pre-1970 instants correctly)
//! - Bytes 8-15: insertion sequence, big-endian
//!
//! Values are JSON-encoded [`AnalyticRecord`]s.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::DateTime;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use tally_core::{
    AggregateList, AnalyticRecord, Bucket, GroupProperty, Interval, IntervalSeries, StorageError,
    StoreName, TallyError, TallyResult, TimeRange, Timestamp, Totals,
};

const KEY_LEN: usize = 16;

/// Error type for LMDB engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored value could not be decoded.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EngineError> for TallyError {
    fn from(e: EngineError) -> Self {
        TallyError::Storage(StorageError::Backend {
            reason: e.to_string(),
        })
    }
}

/// Tuning knobs for newly opened environments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Maximum size of one store's memory map, in megabytes.
    pub map_size_mb: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { map_size_mb: 64 }
    }
}

/// Opaque reference to one open store.
///
/// Cloning is cheap; all clones refer to the same LMDB environment, so a write
/// through one clone is visible through every other.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    name: StoreName,
    path: PathBuf,
    env: Env,
    records: Database<Bytes, Bytes>,
    /// Number of aggregation scans served by this handle.
    scans: AtomicU64,
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("name", &self.inner.name)
            .field("path", &self.inner.path)
            .finish()
    }
}

impl StoreHandle {
    /// Open (creating if needed) the environment at `path`.
    ///
    /// Callers must not open the same path twice in one process; the
    /// [`Registry`](crate::Registry) enforces this.
    pub fn open(name: StoreName, path: &Path, options: EngineOptions) -> Result<Self, EngineError> {
        std::fs::create_dir_all(path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(options.map_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path)
        }
        .map_err(|e| EngineError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| EngineError::Transaction(e.to_string()))?;

        let records: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| EngineError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| EngineError::Transaction(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(StoreInner {
                name,
                path: path.to_path_buf(),
                env,
                records,
                scans: AtomicU64::new(0),
            }),
        })
    }

    pub fn name(&self) -> &StoreName {
        &self.inner.name
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Whether two handles refer to the same open environment.
    pub fn same_store(a: &StoreHandle, b: &StoreHandle) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Close the environment and wait until LMDB has released it.
    ///
    /// Only the last handle can close; otherwise the handle is returned
    /// untouched. A closed path may be reopened afterwards.
    pub fn close(self) -> Result<(), StoreHandle> {
        match Arc::try_unwrap(self.inner) {
            Ok(StoreInner { env, .. }) => {
                env.prepare_for_closing().wait();
                Ok(())
            }
            Err(inner) => Err(StoreHandle { inner }),
        }
    }

    /// Number of aggregation scans served so far.
    pub fn scan_count(&self) -> u64 {
        self.inner.scans.load(Ordering::Relaxed)
    }

    /// Number of stored records.
    pub fn len(&self) -> TallyResult<u64> {
        let rtxn = self
            .inner
            .env
            .read_txn()
            .map_err(|e| EngineError::Transaction(e.to_string()))?;
        let len = self
            .inner
            .records
            .len(&rtxn)
            .map_err(|e| EngineError::Transaction(e.to_string()))?;
        Ok(len)
    }

    pub fn is_empty(&self) -> TallyResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Append one record.
    pub fn insert(&self, record: &AnalyticRecord) -> TallyResult<()> {
        self.try_insert(record).map_err(|reason| {
            TallyError::Storage(StorageError::InsertFailed {
                name: self.inner.name.to_string(),
                reason,
            })
        })
    }

    fn try_insert(&self, record: &AnalyticRecord) -> Result<(), String> {
        let value = serde_json::to_vec(record).map_err(|e| e.to_string())?;

        let mut wtxn = self.inner.env.write_txn().map_err(|e| e.to_string())?;
        // No per-record deletes, so the entry count is a monotonic sequence.
        let seq = self.inner.records.len(&wtxn).map_err(|e| e.to_string())?;
        let key = record_key(record.time, seq);
        self.inner
            .records
            .put(&mut wtxn, &key, &value)
            .map_err(|e| e.to_string())?;
        wtxn.commit().map_err(|e| e.to_string())
    }

    /// Visit every record inside `range`, in time order.
    pub fn scan<F>(&self, range: &TimeRange, mut visit: F) -> TallyResult<()>
    where
        F: FnMut(AnalyticRecord),
    {
        self.inner.scans.fetch_add(1, Ordering::Relaxed);

        let rtxn = self
            .inner
            .env
            .read_txn()
            .map_err(|e| EngineError::Transaction(e.to_string()))?;

        let lower = range.start().map(|t| record_key(t, 0));
        let upper = range.end().map(upper_key);
        let bounds: (Bound<&[u8]>, Bound<&[u8]>) = (
            lower
                .as_ref()
                .map_or(Bound::Unbounded, |k| Bound::Included(k.as_slice())),
            upper
                .as_ref()
                .map_or(Bound::Unbounded, |k| Bound::Excluded(k.as_slice())),
        );

        let iter = self
            .inner
            .records
            .range(&rtxn, &bounds)
            .map_err(|e| EngineError::Transaction(e.to_string()))?;

        for entry in iter {
            let (_, bytes) = entry.map_err(|e| EngineError::Transaction(e.to_string()))?;
            let record: AnalyticRecord = serde_json::from_slice(bytes)
                .map_err(|e| EngineError::Deserialization(e.to_string()))?;
            // Keys carry millisecond precision; the window may be finer.
            if range.contains(record.time) {
                visit(record);
            }
        }
        Ok(())
    }

    /// Totals within the window.
    pub fn query(&self, range: &TimeRange) -> TallyResult<Totals> {
        let mut total = 0u64;
        let mut ips = HashSet::new();
        self.scan(range, |record| {
            total += 1;
            ips.insert(record.ip);
        })?;
        Ok(Totals {
            total,
            unique: ips.len() as u64,
        })
    }

    /// Counts per distinct value of `property`.
    ///
    /// With `unique`, each value counts distinct `(ip, event)` pairs.
    pub fn group_by(
        &self,
        property: GroupProperty,
        range: &TimeRange,
        unique: bool,
    ) -> TallyResult<AggregateList> {
        let column = property.column();
        let mut counts: HashMap<String, Tally> = HashMap::new();
        self.scan(range, |record| {
            let value = column.value(&record).to_string();
            counts.entry(value).or_insert_with(|| Tally::new(unique)).add(record);
        })?;
        Ok(AggregateList::from_counts(
            counts.into_iter().map(|(value, tally)| (value, tally.count())),
        ))
    }

    /// Counts bucketed into epoch-aligned windows of `interval` seconds.
    ///
    /// Buckets between the first and last bucket of the effective window are
    /// zero-filled. The effective window uses the request bounds where given and
    /// the earliest/latest matching record otherwise.
    pub fn over_time(
        &self,
        interval: Interval,
        range: &TimeRange,
        unique: bool,
    ) -> TallyResult<IntervalSeries> {
        interval.check_range(range)?;

        let mut buckets: BTreeMap<i64, Tally> = BTreeMap::new();
        self.scan(range, |record| {
            let start = interval.bucket_start(record.time);
            buckets.entry(start).or_insert_with(|| Tally::new(unique)).add(record);
        })?;

        let first = range
            .start()
            .map(|s| interval.bucket_start(s))
            .or_else(|| buckets.keys().next().copied());
        let last = range
            .end()
            .map(|e| interval.last_bucket_before(e))
            .or_else(|| buckets.keys().next_back().copied());

        let mut list = Vec::new();
        if let (Some(first), Some(last)) = (first, last) {
            let count = interval.span(first, last)?;
            let width = interval.as_secs() as i64;
            list.reserve(count as usize);
            for i in 0..count as i64 {
                let start = first + i * width;
                let count = buckets.get(&start).map_or(0, Tally::count);
                list.push(Bucket {
                    start: to_timestamp(start)?,
                    end: to_timestamp(start + width)?,
                    count,
                });
            }
        }

        Ok(IntervalSeries {
            interval: interval.as_secs(),
            list,
        })
    }
}

/// Per-group counter, plain or de-duplicated by `(ip, event)`.
enum Tally {
    Plain(u64),
    Unique(HashSet<(String, String)>),
}

impl Tally {
    fn new(unique: bool) -> Self {
        if unique {
            Tally::Unique(HashSet::new())
        } else {
            Tally::Plain(0)
        }
    }

    fn add(&mut self, record: AnalyticRecord) {
        match self {
            Tally::Plain(n) => *n += 1,
            Tally::Unique(seen) => {
                seen.insert((record.ip, record.event));
            }
        }
    }

    fn count(&self) -> u64 {
        match self {
            Tally::Plain(n) => *n,
            Tally::Unique(seen) => seen.len() as u64,
        }
    }
}

fn record_key(time: Timestamp, seq: u64) -> [u8; KEY_LEN] {
    let ordered = (time.timestamp_millis() as u64) ^ (1 << 63);
    let mut key = [0u8; KEY_LEN];
    key[0..8].copy_from_slice(&ordered.to_be_bytes());
    key[8..16].copy_from_slice(&seq.to_be_bytes());
    key
}

/// Exclusive scan bound for `end`, rounded up to the next whole millisecond.
fn upper_key(end: Timestamp) -> [u8; KEY_LEN] {
    let mut millis = end.timestamp_millis();
    if end.timestamp_subsec_nanos() % 1_000_000 != 0 {
        millis += 1;
    }
    let ordered = (millis as u64) ^ (1 << 63);
    let mut key = [0u8; KEY_LEN];
    key[0..8].copy_from_slice(&ordered.to_be_bytes());
    key
}

fn to_timestamp(secs: i64) -> TallyResult<Timestamp> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| TallyError::internal(format!("bucket start {secs} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn create_test_store() -> (StoreHandle, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let name = StoreName::new("test").expect("valid name");
        let handle = StoreHandle::open(name, &temp_dir.path().join("test"), EngineOptions::default())
            .expect("store open should succeed");
        (handle, temp_dir)
    }

    fn record(time: Timestamp, event: &str, ip: &str) -> AnalyticRecord {
        AnalyticRecord {
            time,
            event: event.to_string(),
            path: "/a".to_string(),
            ip: ip.to_string(),
            platform: "linux".to_string(),
            referer_domain: "example.com".to_string(),
            country_code: "FR".to_string(),
        }
    }

    fn at(d: u32, h: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_record_key_orders_by_time_then_sequence() {
        let before_epoch = Utc.with_ymd_and_hms(1960, 1, 1, 0, 0, 0).unwrap();
        let after_epoch = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert!(record_key(before_epoch, 9) < record_key(after_epoch, 0));
        assert!(record_key(after_epoch, 1) < record_key(after_epoch, 2));
    }

    #[test]
    fn test_insert_then_query_roundtrip() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.is_empty().unwrap());

        let r = record(at(1, 10), "pageview", "1.2.3.4");
        store.insert(&r).expect("insert should succeed");

        let totals = store.query(&TimeRange::unbounded()).expect("query should succeed");
        assert_eq!(totals, Totals { total: 1, unique: 1 });

        let mut seen = Vec::new();
        store
            .scan(&TimeRange::unbounded(), |rec| seen.push(rec))
            .expect("scan should succeed");
        assert_eq!(seen, vec![r]);
    }

    #[test]
    fn test_query_respects_half_open_window() {
        let (store, _temp_dir) = create_test_store();
        for (d, ip) in [(1, "a"), (2, "b"), (3, "c"), (3, "a")] {
            store.insert(&record(at(d, 0), "pageview", ip)).unwrap();
        }

        let range = TimeRange::new(Some(at(2, 0)), Some(at(3, 0))).unwrap();
        assert_eq!(store.query(&range).unwrap(), Totals { total: 1, unique: 1 });

        let from_day2 = TimeRange::new(Some(at(2, 0)), None).unwrap();
        assert_eq!(store.query(&from_day2).unwrap(), Totals { total: 3, unique: 3 });

        let all = store.query(&TimeRange::unbounded()).unwrap();
        assert_eq!(all, Totals { total: 4, unique: 3 });
    }

    #[test]
    fn test_sub_millisecond_end_keeps_earlier_records() {
        let (store, _temp_dir) = create_test_store();
        let base = at(1, 0);
        let inside = base + chrono::Duration::microseconds(10_000_300);
        store.insert(&record(inside, "pageview", "1.1.1.1")).unwrap();

        let end = base + chrono::Duration::microseconds(10_000_500);
        let range = TimeRange::new(None, Some(end)).unwrap();
        assert!(range.contains(inside));
        assert_eq!(store.query(&range).unwrap().total, 1);

        // Still exclusive at the bound itself.
        let exact = TimeRange::new(None, Some(inside)).unwrap();
        assert_eq!(store.query(&exact).unwrap().total, 0);
    }

    #[test]
    fn test_close_requires_last_handle() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test");
        let name = StoreName::new("test").unwrap();
        let store = StoreHandle::open(name.clone(), &path, EngineOptions::default()).unwrap();
        store.insert(&record(at(1, 0), "pageview", "1.1.1.1")).unwrap();

        let clone = store.clone();
        let store = store.close().expect_err("a clone is still alive");
        drop(clone);
        store.close().expect("last handle closes");

        std::fs::remove_dir_all(&path).unwrap();
        let reopened = StoreHandle::open(name, &path, EngineOptions::default()).unwrap();
        assert!(reopened.is_empty().unwrap());
    }

    #[test]
    fn test_group_by_plain_and_unique() {
        let (store, _temp_dir) = create_test_store();
        store.insert(&record(at(1, 1), "pageview", "1.1.1.1")).unwrap();
        store.insert(&record(at(1, 2), "pageview", "1.1.1.1")).unwrap();
        store.insert(&record(at(1, 3), "pageview", "2.2.2.2")).unwrap();
        store.insert(&record(at(1, 4), "download", "1.1.1.1")).unwrap();

        let plain = store
            .group_by(GroupProperty::Events, &TimeRange::unbounded(), false)
            .unwrap();
        assert_eq!(plain.count_of("pageview"), Some(3));
        assert_eq!(plain.count_of("download"), Some(1));
        assert_eq!(plain.list[0].value, "pageview");

        let unique = store
            .group_by(GroupProperty::Events, &TimeRange::unbounded(), true)
            .unwrap();
        assert_eq!(unique.count_of("pageview"), Some(2));
        assert_eq!(unique.count_of("download"), Some(1));

        let countries = store
            .group_by(GroupProperty::Countries, &TimeRange::unbounded(), false)
            .unwrap();
        assert_eq!(countries.count_of("FR"), Some(4));
    }

    #[test]
    fn test_over_time_single_record_single_bucket() {
        let (store, _temp_dir) = create_test_store();
        store.insert(&record(at(5, 13), "pageview", "1.2.3.4")).unwrap();

        let series = store
            .over_time(Interval::default(), &TimeRange::unbounded(), false)
            .unwrap();
        assert_eq!(series.interval, 86400);
        assert_eq!(series.list.len(), 1);
        assert_eq!(series.list[0].start, at(5, 0));
        assert_eq!(series.list[0].end, at(6, 0));
        assert_eq!(series.list[0].count, 1);
    }

    #[test]
    fn test_over_time_zero_fills_requested_window() {
        let (store, _temp_dir) = create_test_store();
        store.insert(&record(at(2, 8), "pageview", "1.1.1.1")).unwrap();
        store.insert(&record(at(4, 9), "pageview", "1.1.1.1")).unwrap();
        store.insert(&record(at(4, 10), "pageview", "1.1.1.1")).unwrap();

        let range = TimeRange::new(Some(at(1, 0)), Some(at(6, 0))).unwrap();
        let series = store.over_time(Interval::default(), &range, false).unwrap();
        let counts: Vec<u64> = series.list.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![0, 1, 0, 2, 0]);
        assert_eq!(series.total(), 3);

        let unique = store.over_time(Interval::default(), &range, true).unwrap();
        let counts: Vec<u64> = unique.list.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![0, 1, 0, 1, 0]);

        // Open window: spans first to last data bucket only.
        let open = store
            .over_time(Interval::default(), &TimeRange::unbounded(), false)
            .unwrap();
        let counts: Vec<u64> = open.list.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 0, 2]);
    }

    #[test]
    fn test_over_time_empty_store() {
        let (store, _temp_dir) = create_test_store();
        let series = store
            .over_time(Interval::default(), &TimeRange::unbounded(), false)
            .unwrap();
        assert!(series.list.is_empty());
    }

    #[test]
    fn test_scan_counter_tracks_aggregations() {
        let (store, _temp_dir) = create_test_store();
        assert_eq!(store.scan_count(), 0);
        store.query(&TimeRange::unbounded()).unwrap();
        store
            .group_by(GroupProperty::Platforms, &TimeRange::unbounded(), false)
            .unwrap();
        assert_eq!(store.scan_count(), 2);
    }

    #[test]
    fn test_clones_share_environment() {
        let (store, _temp_dir) = create_test_store();
        let clone = store.clone();
        assert!(StoreHandle::same_store(&store, &clone));
        clone.insert(&record(at(1, 0), "pageview", "1.1.1.1")).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }
}
