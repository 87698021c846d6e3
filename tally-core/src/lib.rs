//! Tally Core - Value Types
//!
//! Pure data structures shared by the storage engine and the HTTP surface.
//! No I/O happens in this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod aggregate;
pub mod error;
pub mod ingest;
pub mod platform;
pub mod property;
pub mod referer;
pub mod store;
pub mod time;

pub use aggregate::{Aggregate, AggregateList, Bucket, IntervalSeries, QueryResult, Totals};
pub use error::{ErrorKind, StorageError, TallyError, TallyResult, ValidationError};
pub use ingest::RawEvent;
pub use platform::Platform;
pub use property::{Column, GroupProperty};
pub use store::{StoreName, MAX_STORE_NAME_LEN};
pub use time::{Interval, TimeRange, DEFAULT_INTERVAL_SECS, MAX_BUCKETS};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// One analytics event as persisted by a store.
///
/// Records are immutable once built and have no identity beyond their
/// insertion order within a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticRecord {
    pub time: Timestamp,
    pub event: String,
    pub path: String,
    pub ip: String,
    pub platform: String,
    pub referer_domain: String,
    pub country_code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_camel_case() {
        let record = AnalyticRecord {
            time: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            event: "pageview".into(),
            path: "/".into(),
            ip: "1.2.3.4".into(),
            platform: "linux".into(),
            referer_domain: "example.com".into(),
            country_code: "DE".into(),
        };
        let json = serde_json::to_value(&record).expect("serializes");
        assert_eq!(json["refererDomain"], "example.com");
        assert_eq!(json["countryCode"], "DE");

        let back: AnalyticRecord = serde_json::from_value(json).expect("deserializes");
        assert_eq!(back, record);
    }
}
