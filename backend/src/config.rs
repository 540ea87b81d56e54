//! Conversion settings supplied by the host.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::validation::{FieldKind, FieldValue};

/// Environment variable overriding [`ConversionConfig::rows_limit`].
pub const ROWS_LIMIT_ENV: &str = "IATI_ROWS_LIMIT";
/// Environment variable overriding [`ConversionConfig::max_allowed_failures`].
pub const MAX_ALLOWED_FAILURES_ENV: &str = "IATI_MAX_ALLOWED_FAILURES";
/// Environment variable overriding [`ConversionConfig::default_currency`];
/// an empty value disables the fallback.
pub const DEFAULT_CURRENCY_ENV: &str = "IATI_DEFAULT_CURRENCY";

pub const DEFAULT_ROWS_LIMIT: usize = 50_000;
pub const DEFAULT_MAX_ALLOWED_FAILURES: usize = 10;
pub const DEFAULT_CURRENCY: &str = "USD";

/// Circuit breakers and document defaults of a conversion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConversionConfig {
    /// Maximum rows read per run, across all resources.
    pub rows_limit: usize,
    /// The run aborts once row failures strictly exceed this.
    pub max_allowed_failures: usize,
    /// Currency of values that name none and whose activity or organisation
    /// declares no default. `None` turns such values into schema errors.
    pub default_currency: Option<String>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            rows_limit: DEFAULT_ROWS_LIMIT,
            max_allowed_failures: DEFAULT_MAX_ALLOWED_FAILURES,
            default_currency: Some(DEFAULT_CURRENCY.to_string()),
        }
    }
}

impl ConversionConfig {
    /// Defaults overridden by `IATI_ROWS_LIMIT`, `IATI_MAX_ALLOWED_FAILURES`
    /// and `IATI_DEFAULT_CURRENCY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = lookup(ROWS_LIMIT_ENV) {
            config.rows_limit = parse_count(ROWS_LIMIT_ENV, &value)?;
        }
        if let Some(value) = lookup(MAX_ALLOWED_FAILURES_ENV) {
            config.max_allowed_failures = parse_count(MAX_ALLOWED_FAILURES_ENV, &value)?;
        }
        if let Some(value) = lookup(DEFAULT_CURRENCY_ENV) {
            config.default_currency = parse_currency(DEFAULT_CURRENCY_ENV, &value)?;
        }
        Ok(config)
    }

    pub fn with_rows_limit(mut self, rows_limit: usize) -> Self {
        self.rows_limit = rows_limit;
        self
    }

    pub fn with_max_allowed_failures(mut self, max_allowed_failures: usize) -> Self {
        self.max_allowed_failures = max_allowed_failures;
        self
    }

    pub fn with_default_currency(mut self, default_currency: Option<String>) -> Self {
        self.default_currency = default_currency;
        self
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        message: e.to_string(),
    })
}

fn parse_currency(key: &str, value: &str) -> Result<Option<String>, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    match FieldKind::Currency.coerce(value) {
        Ok(FieldValue::Text(currency)) => Ok(Some(currency)),
        Ok(_) => Ok(None),
        Err(message) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            message,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ConversionConfig::default();
        assert_eq!(config.rows_limit, 50_000);
        assert_eq!(config.max_allowed_failures, 10);
        assert_eq!(config.default_currency.as_deref(), Some("USD"));
    }

    #[test]
    fn test_default_currency_lookup() {
        let config = ConversionConfig::from_lookup(|k| (k == DEFAULT_CURRENCY_ENV).then(|| "eur".to_string())).unwrap();
        assert_eq!(config.default_currency.as_deref(), Some("EUR"));

        let disabled = ConversionConfig::from_lookup(|k| (k == DEFAULT_CURRENCY_ENV).then(String::new)).unwrap();
        assert_eq!(disabled.default_currency, None);

        let err = ConversionConfig::from_lookup(|k| (k == DEFAULT_CURRENCY_ENV).then(|| "dollars".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(DEFAULT_CURRENCY_ENV));
    }

    #[test]
    fn test_lookup_overrides() {
        let env: HashMap<&str, &str> = [(ROWS_LIMIT_ENV, " 200 "), (MAX_ALLOWED_FAILURES_ENV, "0")].into();
        let config = ConversionConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.rows_limit, 200);
        assert_eq!(config.max_allowed_failures, 0);
    }

    #[test]
    fn test_lookup_rejects_garbage() {
        let err = ConversionConfig::from_lookup(|k| (k == ROWS_LIMIT_ENV).then(|| "-5".to_string())).unwrap_err();
        assert!(err.to_string().contains(ROWS_LIMIT_ENV));
    }

    #[test]
    fn test_partial_json() {
        let config: ConversionConfig = serde_json::from_str(r#"{"rowsLimit": 5}"#).unwrap();
        assert_eq!(config, ConversionConfig::default().with_rows_limit(5));
    }
}
