//! Query windows and bucket widths.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TallyResult, ValidationError};
use crate::Timestamp;

/// Default bucket width: one day.
pub const DEFAULT_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Upper bound on the number of buckets a single series may contain.
pub const MAX_BUCKETS: u64 = 100_000;

/// Optional half-open `[start, end)` window.
///
/// An absent bound is unbounded in that direction. When both bounds are
/// present, `start <= end` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TimeRange {
    start: Option<Timestamp>,
    end: Option<Timestamp>,
}

impl TimeRange {
    /// The window covering all of time.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Build a range from already-parsed bounds.
    pub fn new(start: Option<Timestamp>, end: Option<Timestamp>) -> TallyResult<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if e < s {
                return Err(ValidationError::InvalidTimeRange {
                    start: s.to_rfc3339(),
                    end: e.to_rfc3339(),
                }
                .into());
            }
        }
        Ok(Self { start, end })
    }

    /// Parse a range from the textual `start` and `end` request parameters.
    ///
    /// An empty string means "not provided". Anything else must be RFC 3339.
    pub fn parse(start: &str, end: &str) -> TallyResult<Self> {
        Self::new(parse_bound(start)?, parse_bound(end)?)
    }

    pub fn start(&self) -> Option<Timestamp> {
        self.start
    }

    pub fn end(&self) -> Option<Timestamp> {
        self.end
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Whether `t` falls inside the window.
    pub fn contains(&self, t: Timestamp) -> bool {
        self.start.map_or(true, |s| t >= s) && self.end.map_or(true, |e| t < e)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |b: Option<Timestamp>| b.map(|t| t.to_rfc3339()).unwrap_or_default();
        write!(f, "[{}, {})", bound(self.start), bound(self.end))
    }
}

fn parse_bound(raw: &str) -> TallyResult<Option<Timestamp>> {
    if raw.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|t| Some(t.with_timezone(&Utc)))
        .map_err(|e| {
            ValidationError::InvalidTimeFormat {
                value: raw.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
}

/// Width of a time-series bucket, in seconds. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Interval(u64);

impl Default for Interval {
    fn default() -> Self {
        Interval(DEFAULT_INTERVAL_SECS)
    }
}

impl Interval {
    pub fn from_secs(secs: u64) -> TallyResult<Self> {
        if secs == 0 {
            return Err(ValidationError::InvalidInterval {
                value: secs.to_string(),
                reason: "interval must be greater than zero".to_string(),
            }
            .into());
        }
        Ok(Interval(secs))
    }

    /// Parse the `interval` request parameter. Empty means one day.
    pub fn parse(raw: &str) -> TallyResult<Self> {
        if raw.is_empty() {
            return Ok(Self::default());
        }
        let secs: i64 = raw.parse().map_err(|_| ValidationError::InvalidInterval {
            value: raw.to_string(),
            reason: "interval must be an integer number of seconds".to_string(),
        })?;
        if secs <= 0 {
            return Err(ValidationError::InvalidInterval {
                value: raw.to_string(),
                reason: "interval must be greater than zero".to_string(),
            }
            .into());
        }
        Self::from_secs(secs as u64)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Start of the epoch-aligned bucket containing `t`, in unix seconds.
    pub fn bucket_start(&self, t: Timestamp) -> i64 {
        let width = self.0 as i64;
        t.timestamp().div_euclid(width) * width
    }

    /// Start of the last bucket that still holds instants before the exclusive `end`.
    pub fn last_bucket_before(&self, end: Timestamp) -> i64 {
        self.bucket_start(end - TimeDelta::nanoseconds(1))
    }

    /// Number of buckets from `first` to `last` inclusive (both bucket starts).
    ///
    /// Fails with `InvalidInterval` past [`MAX_BUCKETS`].
    pub fn span(&self, first: i64, last: i64) -> TallyResult<u64> {
        if last < first {
            return Ok(0);
        }
        let count = ((last - first) as u64) / self.0 + 1;
        if count > MAX_BUCKETS {
            return Err(ValidationError::InvalidInterval {
                value: self.0.to_string(),
                reason: format!("window would produce {count} buckets, limit is {MAX_BUCKETS}"),
            }
            .into());
        }
        Ok(count)
    }

    /// Check a fully bounded window against the bucket limit before touching a store.
    pub fn check_range(&self, range: &TimeRange) -> TallyResult<()> {
        if let (Some(start), Some(end)) = (range.start(), range.end()) {
            if end > start {
                self.span(self.bucket_start(start), self.last_bucket_before(end))?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}
