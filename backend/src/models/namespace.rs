//! Namespaces and aggregate keys.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::InputError;

/// Maximum namespace length accepted by the host's storage column.
pub const NAMESPACE_MAX_LEN: usize = 90;

/// Groups resources into one logical IATI output file.
///
/// Stored trimmed and lower-cased. The empty namespace is the default file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    /// Normalise and validate a host-supplied namespace.
    ///
    /// Inner whitespace runs become `-`; the result must be at most
    /// [`NAMESPACE_MAX_LEN`] characters of `[a-z0-9_.-]`.
    pub fn parse(raw: &str) -> Result<Self, InputError> {
        let normalized = raw
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
            .to_lowercase();

        if normalized.chars().count() > NAMESPACE_MAX_LEN {
            return Err(InputError::InvalidNamespace {
                value: raw.to_string(),
                reason: format!("longer than {} characters", NAMESPACE_MAX_LEN),
            });
        }

        if let Some(bad) = normalized
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(InputError::InvalidNamespace {
                value: raw.to_string(),
                reason: format!("character '{}' is not allowed", bad),
            });
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            f.write_str("(default)")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl TryFrom<String> for Namespace {
    type Error = InputError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.0
    }
}

/// Uniqueness key of an assembled aggregate.
///
/// Rows merge into the same activity (or organisation) only when all three
/// parts match; namespaces never merge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordKey {
    pub namespace: Namespace,
    pub reporting_org: String,
    pub identifier: String,
}

impl RecordKey {
    pub fn new(namespace: Namespace, reporting_org: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            namespace,
            reporting_org: reporting_org.into(),
            identifier: identifier.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.reporting_org, self.identifier)
    }
}
