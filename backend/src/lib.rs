//! # IATI Generator - CSV to IATI XML conversion
//!
//! Turns a set of tabular CSV resources (one file per IATI record type) into
//! an `iati-activities` or `iati-organisations` XML document.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ CSV files   │────▶│   Parser    │────▶│ Validation  │────▶│  Assembler  │
//! │ (ISO/UTF8)  │     │  (auto-enc) │     │ (per row)   │     │ (by key)    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────┬──────┘
//!                                                                    │
//!                     ┌─────────────┐     ┌─────────────┐            │
//!                     │  IATI XML   │◀────│ Serializer  │◀───────────┘
//!                     │  document   │     │ (schema)    │  Activities
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! Both stages return an outcome carrying an ordered run log, so every
//! warning and row error reaches the caller even when the run fails.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use iati_generator::{ConversionConfig, ConversionRequest, CsvResource, FileType, Pipeline};
//!
//! let bytes = std::fs::read("activities.csv")?;
//! let request = ConversionRequest::new("my-dataset")
//!     .with_resource(CsvResource::from_bytes("activities.csv", FileType::ActivityMain, &bytes)?);
//! let outcome = Pipeline::new(ConversionConfig::from_env()?).convert(&request);
//! println!("{}", outcome.xml.unwrap_or_default());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per layer
//! - [`config`] - Run limits and the default currency from the environment
//! - [`models`] - File types, namespaces, activities and organisations
//! - [`parser`] - CSV parsing with encoding and delimiter detection
//! - [`validation`] - Per-row validation rules
//! - [`transform`] - Assembly, failure tracking and the two-stage pipeline
//! - [`xml`] - IATI XML serialization
//! - [`api`] - HTTP API server and run logs

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Validation
pub mod validation;

// Transformation
pub mod transform;

// Serialization
pub mod xml;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    InputError,
    PipelineError,
    RowError,
    SchemaError,
    SerializeError,
    ServerError,
};

// =============================================================================
// Re-exports - Config
// =============================================================================

pub use config::ConversionConfig;

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    Activity,
    DocumentKind,
    FileType,
    Namespace,
    Organisation,
    RecordKey,
    UNSUPPORTED_FILE_TYPES,
};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    parse_bytes_auto,
    parse_bytes_auto_limited,
    parse_file_auto,
    parse_str,
    detect_encoding,
    detect_delimiter,
    decode_content,
    CsvError,
    CsvRow,
    CsvTable,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{
    ruleset,
    validate_row,
    RecordPayload,
    RowValidator,
    ValidatedRecord,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::{
    assemble,
    ActivitiesOutcome,
    ActivitiesStage,
    ConversionRequest,
    CsvResource,
    DefaultActivitiesStage,
    DefaultXmlStage,
    FailureTracker,
    OutputTarget,
    Pipeline,
    XmlOutcome,
    XmlRequest,
    XmlStage,
};

// =============================================================================
// Re-exports - XML
// =============================================================================

pub use xml::{serialize, SerializeOptions, IATI_VERSION};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::logs::{LogEntry, LogLevel, RunLog};
pub use api::types::{ActivitiesResponse, ConvertResponse, RunStatus, error_response};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
