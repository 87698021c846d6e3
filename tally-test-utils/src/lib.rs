//! Tally Test Utilities
//!
//! Shared test infrastructure for the tally workspace:
//! - Proptest generators for store names, records and time windows
//! - Fixtures: temporary brokers and sample record sets
//! - Assertions on error kinds

pub use tally_core::{
    AnalyticRecord, ErrorKind, GroupProperty, Interval, StoreName, TallyError, TallyResult,
    TimeRange, Timestamp,
};
pub use tally_storage::{AccessBroker, BrokerConfig, EngineOptions, Registry, ResultCache};

use chrono::{TimeZone, Utc};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for tally value types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a valid store name.
    pub fn arb_store_name() -> impl Strategy<Value = StoreName> {
        "[A-Za-z0-9][A-Za-z0-9_.-]{0,30}"
            .prop_filter_map("valid store name", |s| StoreName::new(s).ok())
    }

    /// Generate a Timestamp within 2020-2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    /// Generate an ordered time window, each bound optionally absent.
    pub fn arb_time_range() -> impl Strategy<Value = TimeRange> {
        (
            proptest::option::of(arb_timestamp()),
            proptest::option::of(arb_timestamp()),
        )
            .prop_map(|(a, b)| match (a, b) {
                (Some(a), Some(b)) if b < a => TimeRange::new(Some(b), Some(a)),
                (a, b) => TimeRange::new(a, b),
            })
            .prop_filter_map("ordered range", Result::ok)
    }

    /// Generate a grouping property.
    pub fn arb_group_property() -> impl Strategy<Value = GroupProperty> {
        prop_oneof![
            Just(GroupProperty::Countries),
            Just(GroupProperty::Platforms),
            Just(GroupProperty::Domains),
            Just(GroupProperty::Events),
        ]
    }

    /// Generate a record drawn from small value pools so groups collide.
    pub fn arb_record() -> impl Strategy<Value = AnalyticRecord> {
        (
            arb_timestamp(),
            prop::sample::select(vec!["pageview", "download", "signup"]),
            prop::sample::select(vec!["/", "/docs", "/pricing"]),
            prop::sample::select(vec!["10.0.0.1", "10.0.0.2", "10.0.0.3", "2001:db8::1"]),
            prop::sample::select(vec!["linux", "windows", "ios", "android"]),
            prop::sample::select(vec!["", "example.com", "news.ycombinator.com"]),
            prop::sample::select(vec!["", "FR", "US", "DE"]),
        )
            .prop_map(
                |(time, event, path, ip, platform, referer_domain, country_code)| AnalyticRecord {
                    time,
                    event: event.to_string(),
                    path: path.to_string(),
                    ip: ip.to_string(),
                    platform: platform.to_string(),
                    referer_domain: referer_domain.to_string(),
                    country_code: country_code.to_string(),
                },
            )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common testing scenarios.

    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// A broker rooted in a temporary directory.
    ///
    /// The directory is removed when the fixture drops.
    pub struct TempBroker {
        pub broker: Arc<AccessBroker>,
        pub dir: TempDir,
    }

    impl TempBroker {
        pub fn new() -> Self {
            Self::with_config(BrokerConfig::default(), 1024)
        }

        pub fn with_config(config: BrokerConfig, cache_capacity: usize) -> Self {
            let dir = TempDir::new().expect("TempDir creation should succeed");
            let registry =
                Registry::new(dir.path(), EngineOptions::default()).expect("registry should open");
            let broker = AccessBroker::new(registry, ResultCache::new(cache_capacity), config);
            Self {
                broker: Arc::new(broker),
                dir,
            }
        }
    }

    impl Default for TempBroker {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Parse a store name that is known to be valid.
    pub fn store(name: &str) -> StoreName {
        StoreName::new(name).expect("fixture store name should be valid")
    }

    /// UTC timestamp from calendar parts.
    pub fn at(year: i32, month: u32, day: u32, hour: u32) -> Timestamp {
        Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
            .single()
            .expect("fixture timestamp should be valid")
    }

    /// A record with the given time, event and IP, and fixed derived fields.
    pub fn record(time: Timestamp, event: &str, ip: &str) -> AnalyticRecord {
        AnalyticRecord {
            time,
            event: event.to_string(),
            path: "/".to_string(),
            ip: ip.to_string(),
            platform: "linux".to_string(),
            referer_domain: "example.com".to_string(),
            country_code: "FR".to_string(),
        }
    }

    /// Three page views on 2024-01-01 and 2024-01-02 from two visitors, plus
    /// one download on 2024-01-03.
    pub fn sample_records() -> Vec<AnalyticRecord> {
        vec![
            record(at(2024, 1, 1, 9), "pageview", "1.1.1.1"),
            record(at(2024, 1, 1, 10), "pageview", "1.1.1.1"),
            record(at(2024, 1, 2, 11), "pageview", "2.2.2.2"),
            AnalyticRecord {
                platform: "windows".to_string(),
                country_code: "US".to_string(),
                ..record(at(2024, 1, 3, 12), "download", "2.2.2.2")
            },
        ]
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on tally results.

    use super::*;

    /// Assert that a result failed with the given error kind.
    #[track_caller]
    pub fn assert_kind<T: std::fmt::Debug>(result: &TallyResult<T>, kind: ErrorKind) {
        match result {
            Err(e) => assert_eq!(e.kind(), kind, "unexpected error: {e}"),
            Ok(v) => panic!("Expected {kind:?} error, got Ok({v:?})"),
        }
    }

    /// Assert that a result is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &TallyResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }
}
