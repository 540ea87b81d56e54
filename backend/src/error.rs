//! Error types for the IATI generation pipeline.
//!
//! One error type per layer, converted upward with `From` so `?` works
//! across boundaries:
//!
//! - [`CsvError`] - payload decoding and header problems (re-exported from [`crate::parser`])
//! - [`InputError`] - fatal problems with a conversion request
//! - [`RowError`] - a single row that failed validation or merge (recoverable)
//! - [`SchemaError`] / [`SerializeError`] - XML rendering failures
//! - [`ConfigError`] - invalid host configuration
//! - [`PipelineError`] - top-level fatal outcome of a run
//! - [`ServerError`] - HTTP surface errors
//!
//! Row errors are not part of the `?` chain: they are counted and
//! logged by the orchestrator, never propagated.

use std::fmt;

use thiserror::Error;

pub use crate::parser::CsvError;

use crate::models::{DocumentKind, FileType};

// =============================================================================
// Input Errors
// =============================================================================

/// Fatal problems with the payload or metadata of a request.
///
/// Reported before any row of the affected resource is processed.
#[derive(Debug, Clone, Error)]
pub enum InputError {
    /// The CSV payload could not be decoded.
    #[error("Resource '{resource}': {source}")]
    Csv {
        resource: String,
        #[source]
        source: CsvError,
    },

    /// Required columns are absent from the header.
    #[error("Resource '{resource}' is missing required column(s): {}", .columns.join(", "))]
    MissingColumns { resource: String, columns: Vec<String> },

    /// Namespace failed normalisation.
    #[error("Invalid namespace '{value}': {reason}")]
    InvalidNamespace { value: String, reason: String },

    /// File type could not be resolved.
    #[error("Unknown IATI file type: {0}")]
    UnknownFileType(String),

    /// A known IATI file type this generator does not convert.
    #[error("IATI file type {code} ({file_name}) is not supported by this generator")]
    UnsupportedFileType { code: u16, file_name: String },

    /// No resource carries the core fields of the target document.
    #[error("No {file_type} resource ({file_name}) in a request for the {document} document")]
    MissingMainResource {
        document: DocumentKind,
        file_type: FileType,
        file_name: &'static str,
    },

    /// Nothing to convert.
    #[error("Conversion request contains no resources")]
    EmptyRequest,
}

// =============================================================================
// Row Errors
// =============================================================================

/// A row that failed validation or could not be merged.
///
/// `row` is the 1-based CSV line number (the header is line 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub resource: String,
    pub row: usize,
    pub column: Option<String>,
    pub reason: String,
}

impl RowError {
    pub fn new(resource: impl Into<String>, row: usize, reason: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            row,
            column: None,
            reason: reason.into(),
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(col) => write!(
                f,
                "[{}] Row {}, column '{}': {}",
                self.resource, self.row, col, self.reason
            ),
            None => write!(f, "[{}] Row {}: {}", self.resource, self.row, self.reason),
        }
    }
}

impl std::error::Error for RowError {}

// =============================================================================
// Serialization Errors
// =============================================================================

/// An aggregate lacks a field the IATI schema marks as mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{element} '{identifier}' is missing mandatory field '{field}'")]
pub struct SchemaError {
    /// `Activity` or `Organisation`.
    pub element: &'static str,
    pub identifier: String,
    pub field: &'static str,
}

/// Errors while rendering an IATI document.
#[derive(Debug, Clone, Error)]
pub enum SerializeError {
    /// One or more aggregates failed the mandatory-field check.
    #[error("{} schema error(s): {}", .errors.len(), join_schema_errors(.errors))]
    Schema { errors: Vec<SchemaError> },

    /// The XML writer failed.
    #[error("XML writer error: {0}")]
    Xml(String),
}

fn join_schema_errors(errors: &[SchemaError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Invalid host-supplied configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A setting could not be parsed.
    #[error("Invalid value '{value}' for {key}: {message}")]
    InvalidValue {
        key: String,
        value: String,
        message: String,
    },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Fatal outcome of a pipeline run.
///
/// A run carrying one of these produced no usable activities or XML.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// Malformed request or payload.
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// Row failures exceeded `max_allowed_failures`.
    #[error("Too many failed rows: {failures} (max allowed {max_allowed})")]
    FailureLimit { failures: usize, max_allowed: usize },

    /// The serializer rejected the assembled records.
    #[error("Serialization error: {0}")]
    Serialize(#[from] SerializeError),

    /// Raised by a caller-supplied stage.
    #[error("Stage error: {0}")]
    Stage(String),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for XML rendering.
pub type SerializeResult<T> = Result<T, SerializeError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let input_err = InputError::EmptyRequest;
        let pipeline_err: PipelineError = input_err.into();
        assert!(pipeline_err.to_string().contains("no resources"));

        let ser_err = SerializeError::Xml("broken".into());
        let pipeline_err: PipelineError = ser_err.into();
        assert!(pipeline_err.to_string().contains("broken"));
    }

    #[test]
    fn test_row_error_format() {
        let err = RowError::new("transactions.csv", 4, "not a valid amount").with_column("value");
        let msg = err.to_string();
        assert!(msg.contains("[transactions.csv]"));
        assert!(msg.contains("Row 4"));
        assert!(msg.contains("column 'value'"));
        assert!(msg.contains("not a valid amount"));

        let bare = RowError::new("activities.csv", 2, "conflict");
        assert_eq!(bare.to_string(), "[activities.csv] Row 2: conflict");
    }

    #[test]
    fn test_missing_columns_format() {
        let err = InputError::MissingColumns {
            resource: "activities.csv".into(),
            columns: vec!["title".into(), "iati_identifier".into()],
        };
        assert_eq!(
            err.to_string(),
            "Resource 'activities.csv' is missing required column(s): title, iati_identifier"
        );
    }

    #[test]
    fn test_missing_main_resource_format() {
        let err = InputError::MissingMainResource {
            document: DocumentKind::Organisations,
            file_type: FileType::OrganisationMain,
            file_name: FileType::OrganisationMain.csv_file_name(),
        };
        assert_eq!(
            err.to_string(),
            "No organisation-main resource (organisations.csv) in a request for the organisations document"
        );
    }

    #[test]
    fn test_schema_error_lists_every_offender() {
        let err = SerializeError::Schema {
            errors: vec![
                SchemaError { element: "Activity", identifier: "AC-1".into(), field: "title" },
                SchemaError { element: "Activity", identifier: "AC-2".into(), field: "title" },
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("2 schema error(s)"));
        assert!(msg.contains("AC-1"));
        assert!(msg.contains("AC-2"));
    }
}
