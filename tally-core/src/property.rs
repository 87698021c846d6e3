//! Allow-listed grouping properties.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{TallyError, ValidationError};
use crate::AnalyticRecord;

/// External grouping dimension exposed by the query surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupProperty {
    Countries,
    Platforms,
    Domains,
    Events,
}

/// Record column a [`GroupProperty`] reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    CountryCode,
    Platform,
    RefererDomain,
    Event,
}

impl GroupProperty {
    pub const ALL: [GroupProperty; 4] = [
        GroupProperty::Countries,
        GroupProperty::Platforms,
        GroupProperty::Domains,
        GroupProperty::Events,
    ];

    /// Name used in request paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupProperty::Countries => "countries",
            GroupProperty::Platforms => "platforms",
            GroupProperty::Domains => "domains",
            GroupProperty::Events => "events",
        }
    }

    pub fn column(&self) -> Column {
        match self {
            GroupProperty::Countries => Column::CountryCode,
            GroupProperty::Platforms => Column::Platform,
            GroupProperty::Domains => Column::RefererDomain,
            GroupProperty::Events => Column::Event,
        }
    }
}

impl Column {
    /// Column name as stored in serialized records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::CountryCode => "countryCode",
            Column::Platform => "platform",
            Column::RefererDomain => "refererDomain",
            Column::Event => "event",
        }
    }

    pub fn value<'a>(&self, record: &'a AnalyticRecord) -> &'a str {
        match self {
            Column::CountryCode => &record.country_code,
            Column::Platform => &record.platform,
            Column::RefererDomain => &record.referer_domain,
            Column::Event => &record.event,
        }
    }
}

impl fmt::Display for GroupProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupProperty {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GroupProperty::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| {
                ValidationError::InvalidProperty {
                    property: s.to_string(),
                }
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_allow_list_maps_to_columns() {
        let cases = [
            ("countries", Column::CountryCode, "countryCode"),
            ("platforms", Column::Platform, "platform"),
            ("domains", Column::RefererDomain, "refererDomain"),
            ("events", Column::Event, "event"),
        ];
        for (name, column, column_name) in cases {
            let property: GroupProperty = name.parse().expect("allow-listed");
            assert_eq!(property.column(), column);
            assert_eq!(property.column().as_str(), column_name);
            assert_eq!(property.to_string(), name);
        }
    }

    #[test]
    fn test_unknown_property_rejected() {
        for name in ["unsupported_property", "Events", "event", "ip", ""] {
            let err = name.parse::<GroupProperty>().expect_err("not allow-listed");
            assert_eq!(err.kind(), ErrorKind::InvalidProperty);
        }
    }

    #[test]
    fn test_column_reads_record_field() {
        let record = AnalyticRecord {
            time: chrono::Utc::now(),
            event: "download".into(),
            path: "/a".into(),
            ip: "1.2.3.4".into(),
            platform: "linux".into(),
            referer_domain: "example.com".into(),
            country_code: "FR".into(),
        };
        assert_eq!(Column::Event.value(&record), "download");
        assert_eq!(Column::Platform.value(&record), "linux");
        assert_eq!(Column::RefererDomain.value(&record), "example.com");
        assert_eq!(Column::CountryCode.value(&record), "FR");
    }
}
