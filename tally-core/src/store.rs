//! Store names.
//!
//! A store name addresses one tenant's on-disk analytics database. Names end up
//! as directory names under the data root, so the accepted alphabet is narrow:
//! the first character is ASCII alphanumeric, the rest are ASCII alphanumeric
//! or one of `_`, `-`, `.`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{TallyError, TallyResult, ValidationError};

/// Longest accepted store name, in bytes.
pub const MAX_STORE_NAME_LEN: usize = 128;

/// Validated store identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StoreName(String);

impl StoreName {
    /// Validate and wrap a store name.
    pub fn new(name: impl Into<String>) -> TallyResult<Self> {
        let name = name.into();
        validate(&name).map_err(|reason| {
            TallyError::from(ValidationError::InvalidStoreName {
                name: name.clone(),
                reason: reason.to_string(),
            })
        })?;
        Ok(StoreName(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("name is empty");
    }
    if name.len() > MAX_STORE_NAME_LEN {
        return Err("name is too long");
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return Err("name must start with an ASCII letter or digit"),
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')) {
        Ok(())
    } else {
        Err("name may only contain ASCII letters, digits, '_', '-' and '.'")
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StoreName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for StoreName {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StoreName::new(s)
    }
}

impl<'de> Deserialize<'de> for StoreName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        StoreName::new(raw).map_err(serde::de::Error::custom)
    }
}
