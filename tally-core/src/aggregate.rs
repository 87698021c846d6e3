//! Aggregated query results.

use serde::{Deserialize, Serialize};

use crate::Timestamp;

/// Full unfiltered totals within a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    /// Number of records in the window.
    pub total: u64,
    /// Number of distinct IPs.
    pub unique: u64,
}

/// Count for one distinct value of a grouping property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    pub value: String,
    pub count: u64,
}

/// Per-value counts, sorted by count descending then value ascending.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggregateList {
    pub list: Vec<Aggregate>,
}

impl AggregateList {
    /// Build a list from unordered counts, applying the canonical ordering.
    pub fn from_counts<I>(counts: I) -> Self
    where
        I: IntoIterator<Item = (String, u64)>,
    {
        let mut list: Vec<Aggregate> = counts
            .into_iter()
            .map(|(value, count)| Aggregate { value, count })
            .collect();
        list.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        Self { list }
    }

    pub fn count_of(&self, value: &str) -> Option<u64> {
        self.list.iter().find(|a| a.value == value).map(|a| a.count)
    }
}

/// One fixed-width time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub start: Timestamp,
    pub end: Timestamp,
    pub count: u64,
}

/// Time-bucketed counts, ascending by bucket start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalSeries {
    /// Bucket width in seconds.
    pub interval: u64,
    pub list: Vec<Bucket>,
}

impl IntervalSeries {
    pub fn total(&self) -> u64 {
        self.list.iter().map(|b| b.count).sum()
    }
}

/// Any computed aggregate, as memoized by the result cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryResult {
    Totals(Totals),
    Groups(AggregateList),
    Series(IntervalSeries),
}

impl From<Totals> for QueryResult {
    fn from(v: Totals) -> Self {
        QueryResult::Totals(v)
    }
}

impl From<AggregateList> for QueryResult {
    fn from(v: AggregateList) -> Self {
        QueryResult::Groups(v)
    }
}

impl From<IntervalSeries> for QueryResult {
    fn from(v: IntervalSeries) -> Self {
        QueryResult::Series(v)
    }
}
