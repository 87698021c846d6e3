//! Request and response bodies.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::{
    AnalyticRecord, Interval, RawEvent, TallyResult, TimeRange, ValidationError,
};

// ============================================================================
// QUERY PARAMETERS
// ============================================================================

/// Query string accepted by the read routes.
///
/// Missing and empty values are equivalent. Parameters a route does not use
/// are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
    #[serde(default)]
    pub interval: String,
    #[serde(default)]
    pub unique: String,
}

impl QueryParams {
    pub fn range(&self) -> TallyResult<TimeRange> {
        TimeRange::parse(&self.start, &self.end)
    }

    pub fn interval(&self) -> TallyResult<Interval> {
        Interval::parse(&self.interval)
    }

    /// Only the exact string `true` selects the unique variants.
    pub fn unique(&self) -> bool {
        self.unique == "true"
    }
}

// ============================================================================
// INGEST BODIES
// ============================================================================

/// Body of `POST /{store}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostData {
    /// RFC 3339 event time. Empty means "now".
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub ip: String,
    /// Client request headers; `user-agent` and `referer` are used.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl PostData {
    fn header(&self, name: &str) -> String {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }

    /// Validate the body into a raw event.
    ///
    /// A present but unparsable `time` is rejected rather than replaced.
    pub fn into_raw_event(self) -> TallyResult<RawEvent> {
        let time = if self.time.is_empty() {
            None
        } else {
            let parsed = DateTime::parse_from_rfc3339(&self.time).map_err(|e| {
                ValidationError::InvalidTimeFormat {
                    value: self.time.clone(),
                    reason: e.to_string(),
                }
            })?;
            Some(parsed.with_timezone(&Utc))
        };
        let user_agent = self.header("user-agent");
        let referer = self.header("referer");
        Ok(RawEvent {
            time,
            event: self.event,
            path: self.path,
            ip: self.ip,
            user_agent,
            referer,
        })
    }
}

/// Body of `POST /{store}/special`: a fully specified record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostAnalytic {
    /// Unix seconds.
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub referer_domain: String,
    #[serde(default)]
    pub country_code: String,
}

impl PostAnalytic {
    pub fn into_record(self) -> TallyResult<AnalyticRecord> {
        let time = DateTime::from_timestamp(self.time, 0).ok_or_else(|| {
            ValidationError::InvalidTimeFormat {
                value: self.time.to_string(),
                reason: "unix timestamp out of range".to_string(),
            }
        })?;
        Ok(AnalyticRecord {
            time,
            event: self.event,
            path: self.path,
            ip: self.ip,
            platform: self.platform,
            referer_domain: self.referer_domain,
            country_code: self.country_code,
        })
    }
}

// ============================================================================
// RESPONSES
// ============================================================================

/// Body of `GET /`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WelcomeResponse {
    pub message: String,
    pub version: String,
}

impl Default for WelcomeResponse {
    fn default() -> Self {
        Self {
            message: "Welcome to analytics !".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Body returned by successful writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}
