//! Record construction from raw ingest events.
//!
//! The ingestion surface receives loosely-structured events; this module applies
//! the derivation rules (platform, referer domain, country code, default time)
//! that turn them into immutable [`AnalyticRecord`]s.

use chrono::Utc;

use crate::{platform, referer, AnalyticRecord, Timestamp};

/// An event as submitted by a client, before derivation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEvent {
    /// Event time; `None` means "now".
    pub time: Option<Timestamp>,
    pub event: String,
    pub path: String,
    pub ip: String,
    pub user_agent: String,
    pub referer: String,
}

impl AnalyticRecord {
    /// Derive a record from a raw event.
    ///
    /// `country_code` is the GeoIP lookup outcome; a failed lookup is passed as
    /// `None` and stored as an empty code.
    pub fn from_raw(raw: RawEvent, country_code: Option<String>) -> Self {
        AnalyticRecord {
            time: raw.time.unwrap_or_else(Utc::now),
            platform: platform::classify(&raw.user_agent).to_string(),
            referer_domain: referer::domain(&raw.referer),
            country_code: country_code.unwrap_or_default(),
            event: raw.event,
            path: raw.path,
            ip: raw.ip,
        }
    }
}
