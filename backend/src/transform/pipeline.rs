//! Pipeline Orchestrator: CSV resources to activities to IATI XML.
//!
//! Two stages, each behind a trait so a caller can substitute or wrap it:
//!
//! - [`ActivitiesStage`]: rows → validated records → assembled aggregates
//! - [`XmlStage`]: aggregates → XML document
//!
//! [`Pipeline::convert`] chains them, concatenating logs and stopping after
//! stage 1 when it failed.
//!
//! ```text
//! START → READING_ROWS ─┬→ ASSEMBLING → SERIALIZING ─┬→ DONE
//!                       └→ ABORTED (failure limit)    └→ FAILED (schema)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use iati_generator::{ConversionConfig, ConversionRequest, CsvResource, FileType, Pipeline};
//!
//! let main = CsvResource::from_bytes("activities.csv", FileType::ActivityMain, main_bytes)?;
//! let transactions = CsvResource::from_bytes("transactions.csv", FileType::ActivityTransactions, bytes)?;
//! let request = ConversionRequest::new("dataset")
//!     .with_resource(main)
//!     .with_resource(transactions);
//!
//! let outcome = Pipeline::new(ConversionConfig::default()).convert(&request);
//! match outcome.into_result() {
//!     Ok((file_name, xml)) => std::fs::write(file_name, xml)?,
//!     Err(e) => eprintln!("{e}"),
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::assembler::{Assembler, MergeOutcome};
use super::failures::FailureTracker;
use crate::api::logs::{LogEntry, RunLog};
use crate::config::{ConversionConfig, DEFAULT_CURRENCY};
use crate::error::{InputError, PipelineError, PipelineResult, SerializeError};
use crate::models::{Activity, DocumentKind, FileType, Namespace, Organisation};
use crate::parser::{self, CsvTable};
use crate::validation::RowValidator;
use crate::xml::{self, SerializeOptions};

// =============================================================================
// Requests
// =============================================================================

/// One decoded CSV resource and its host-side metadata.
#[derive(Debug, Clone)]
pub struct CsvResource {
    /// Name used in logs and row errors.
    pub name: String,
    pub file_type: FileType,
    pub namespace: Namespace,
    pub table: CsvTable,
}

impl CsvResource {
    pub fn new(name: impl Into<String>, file_type: FileType, table: CsvTable) -> Self {
        Self {
            name: name.into(),
            file_type,
            namespace: Namespace::default(),
            table,
        }
    }

    /// Decode raw bytes (encoding and delimiter are detected).
    pub fn from_bytes(name: impl Into<String>, file_type: FileType, bytes: &[u8]) -> Result<Self, InputError> {
        Self::from_bytes_limited(name, file_type, bytes, usize::MAX)
    }

    /// Decode raw bytes, keeping at most `max_rows` data rows.
    ///
    /// Hosts pass `rows_limit + 1` so the run can still report truncation.
    pub fn from_bytes_limited(
        name: impl Into<String>,
        file_type: FileType,
        bytes: &[u8],
        max_rows: usize,
    ) -> Result<Self, InputError> {
        let name = name.into();
        let table = parser::parse_bytes_auto_limited(bytes, max_rows).map_err(|source| InputError::Csv {
            resource: name.clone(),
            source,
        })?;
        Ok(Self::new(name, file_type, table))
    }

    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = namespace;
        self
    }
}

/// Which document and namespace a conversion produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputTarget {
    pub document: DocumentKind,
    pub namespace: Namespace,
}

impl OutputTarget {
    pub fn file_name(&self) -> String {
        self.document.file_name(&self.namespace)
    }
}

/// Input of stage 1.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// Name reported back in the outcome.
    pub resource_name: String,
    pub resources: Vec<CsvResource>,
    /// Defaults to the first resource's document and namespace.
    pub target: Option<OutputTarget>,
}

impl ConversionRequest {
    pub fn new(resource_name: impl Into<String>) -> Self {
        Self {
            resource_name: resource_name.into(),
            resources: Vec::new(),
            target: None,
        }
    }

    pub fn with_resource(mut self, resource: CsvResource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn with_target(mut self, target: OutputTarget) -> Self {
        self.target = Some(target);
        self
    }

    /// Resolved output target.
    pub fn target(&self) -> Result<OutputTarget, InputError> {
        if let Some(target) = &self.target {
            return Ok(target.clone());
        }
        self.resources
            .first()
            .map(|r| OutputTarget {
                document: r.file_type.document(),
                namespace: r.namespace.clone(),
            })
            .ok_or(InputError::EmptyRequest)
    }
}

/// Input of stage 2.
#[derive(Debug, Clone)]
pub struct XmlRequest {
    pub document: DocumentKind,
    pub namespace: Namespace,
    pub activities: Vec<Activity>,
    pub organisations: Vec<Organisation>,
    /// Fixed `generated-datetime`; the current time when `None`.
    pub generated_at: Option<DateTime<Utc>>,
    /// Currency of values with neither their own nor an aggregate default.
    pub default_currency: Option<String>,
}

impl XmlRequest {
    pub fn new(target: OutputTarget) -> Self {
        Self {
            document: target.document,
            namespace: target.namespace,
            activities: Vec::new(),
            organisations: Vec::new(),
            generated_at: None,
            default_currency: Some(DEFAULT_CURRENCY.to_string()),
        }
    }

    /// Build a request from a successful stage 1 outcome.
    pub fn from_outcome(outcome: ActivitiesOutcome, target: OutputTarget) -> Self {
        Self {
            activities: outcome.activities,
            organisations: outcome.organisations,
            ..Self::new(target)
        }
    }

    pub fn with_generated_at(mut self, generated_at: Option<DateTime<Utc>>) -> Self {
        self.generated_at = generated_at;
        self
    }

    pub fn with_default_currency(mut self, default_currency: Option<String>) -> Self {
        self.default_currency = default_currency;
        self
    }

    pub fn file_name(&self) -> String {
        self.document.file_name(&self.namespace)
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result envelope of stage 1.
#[derive(Debug, Clone)]
pub struct ActivitiesOutcome {
    pub activities: Vec<Activity>,
    pub organisations: Vec<Organisation>,
    pub logs: RunLog,
    pub resource_name: String,
    /// When set, `activities` / `organisations` are not to be trusted.
    pub error: Option<PipelineError>,
}

impl ActivitiesOutcome {
    pub fn new(resource_name: impl Into<String>) -> Self {
        Self {
            activities: Vec::new(),
            organisations: Vec::new(),
            logs: RunLog::new(),
            resource_name: resource_name.into(),
            error: None,
        }
    }

    fn failed(resource_name: &str, mut logs: RunLog, error: PipelineError) -> Self {
        logs.error(error.to_string());
        Self {
            logs,
            error: Some(error),
            ..Self::new(resource_name)
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Aggregates, or the fatal error.
    pub fn into_result(self) -> PipelineResult<(Vec<Activity>, Vec<Organisation>)> {
        match self.error {
            Some(err) => Err(err),
            None => Ok((self.activities, self.organisations)),
        }
    }

    /// Apply a pure transform to every activity.
    pub fn map_activities<F>(mut self, f: F) -> Self
    where
        F: FnMut(Activity) -> Activity,
    {
        self.activities = self.activities.into_iter().map(f).collect();
        self
    }

    pub fn map_organisations<F>(mut self, f: F) -> Self
    where
        F: FnMut(Organisation) -> Organisation,
    {
        self.organisations = self.organisations.into_iter().map(f).collect();
        self
    }
}

/// Result envelope of stage 2 and of the combined run.
#[derive(Debug, Clone)]
pub struct XmlOutcome {
    pub xml: Option<String>,
    pub file_name: String,
    pub logs: RunLog,
    pub error: Option<PipelineError>,
}

impl XmlOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.xml.is_some()
    }

    /// `(file_name, xml)`, or the fatal error.
    pub fn into_result(self) -> PipelineResult<(String, String)> {
        match (self.error, self.xml) {
            (Some(err), _) => Err(err),
            (None, Some(xml)) => Ok((self.file_name, xml)),
            (None, None) => Err(PipelineError::Stage("XML stage produced no document".to_string())),
        }
    }
}

// =============================================================================
// Stages
// =============================================================================

/// Stage 1: rows to aggregates.
pub trait ActivitiesStage {
    fn run(&self, request: &ConversionRequest, config: &ConversionConfig) -> ActivitiesOutcome;
}

/// Stage 2: aggregates to XML.
pub trait XmlStage {
    fn run(&self, request: &XmlRequest) -> XmlOutcome;
}

impl<F> ActivitiesStage for F
where
    F: Fn(&ConversionRequest, &ConversionConfig) -> ActivitiesOutcome,
{
    fn run(&self, request: &ConversionRequest, config: &ConversionConfig) -> ActivitiesOutcome {
        self(request, config)
    }
}

impl<F> XmlStage for F
where
    F: Fn(&XmlRequest) -> XmlOutcome,
{
    fn run(&self, request: &XmlRequest) -> XmlOutcome {
        self(request)
    }
}

/// Built-in stage 1: validate, track failures, assemble.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultActivitiesStage;

impl ActivitiesStage for DefaultActivitiesStage {
    fn run(&self, request: &ConversionRequest, config: &ConversionConfig) -> ActivitiesOutcome {
        let name = request.resource_name.as_str();
        let mut logs = RunLog::new();

        let target = match request.target() {
            Ok(target) => target,
            Err(e) => return ActivitiesOutcome::failed(name, logs, e.into()),
        };

        logs.info(format!(
            "Generating {} for '{}' from {} resource(s)",
            target.file_name(),
            name,
            request.resources.len()
        ));

        // Headers are checked for every resource before any row is read.
        let mut validators = Vec::new();
        for resource in &request.resources {
            if resource.file_type.document() != target.document {
                logs.warning(format!(
                    "Skipping '{}': {} rows belong to the {} document, not {}",
                    resource.name,
                    resource.file_type,
                    resource.file_type.document(),
                    target.document
                ));
                continue;
            }
            match RowValidator::new(
                resource.name.clone(),
                resource.file_type,
                resource.namespace.clone(),
                &resource.table.headers,
            ) {
                Ok(validator) => validators.push((resource, validator)),
                Err(e) => return ActivitiesOutcome::failed(name, logs, e.into()),
            }
        }

        let main = target.document.main_file_type();
        if !validators.iter().any(|(resource, _)| resource.file_type == main) {
            let error = InputError::MissingMainResource {
                document: target.document,
                file_type: main,
                file_name: main.csv_file_name(),
            };
            return ActivitiesOutcome::failed(name, logs, error.into());
        }

        // Rows referring to other rows (transaction sectors) come after them.
        validators.sort_by_key(|(resource, _)| resource.file_type.code());

        let mut tracker = FailureTracker::new(config.max_allowed_failures);
        let mut assembler = Assembler::new();
        let mut rows_read = 0usize;
        let mut skipped = 0usize;

        'resources: for (resource, validator) in &validators {
            logs.push(
                LogEntry::info(format!(
                    "Reading {} row(s) from '{}' ({})",
                    resource.table.len(),
                    resource.name,
                    resource.file_type
                ))
                .with_indent(1),
            );

            for row in &resource.table.rows {
                if rows_read >= config.rows_limit {
                    logs.warning(format!(
                        "Row limit of {} reached at '{}' line {}; remaining rows were not processed",
                        config.rows_limit, resource.name, row.line
                    ));
                    break 'resources;
                }
                rows_read += 1;

                let record = match validator.validate(row) {
                    Ok(Some(record)) => record,
                    Ok(None) => {
                        skipped += 1;
                        continue;
                    }
                    Err(e) => {
                        tracker.record(&e, &mut logs);
                        if tracker.exceeded() {
                            break 'resources;
                        }
                        continue;
                    }
                };

                for issue in &record.issues {
                    logs.warning(format!(
                        "[{}] Row {}, column '{}': ignored value '{}': {}",
                        record.resource, record.row, issue.column, issue.value, issue.reason
                    ));
                }

                let key = record.key.clone();
                let (resource_name, line) = (record.resource.clone(), record.row);
                match assembler.add(record) {
                    Ok(MergeOutcome::DuplicateMain) => logs.warning(format!(
                        "[{}] Row {}: {} already has core fields; duplicate main row ignored",
                        resource_name, line, key
                    )),
                    Ok(_) => {}
                    Err(e) => {
                        tracker.record(&e, &mut logs);
                        if tracker.exceeded() {
                            break 'resources;
                        }
                    }
                }
            }
        }

        let assembly = assembler.finish();
        let mut outcome = ActivitiesOutcome::new(name);
        outcome.activities = assembly.activities.into_values().collect();
        outcome.organisations = assembly.organisations.into_values().collect();

        if tracker.exceeded() {
            let error = tracker.limit_error();
            logs.error(format!("Aborted: {}", error));
            outcome.logs = logs;
            outcome.error = Some(error);
            return outcome;
        }

        if skipped > 0 {
            logs.info(format!("Skipped {} blank row(s)", skipped));
        }
        logs.success(format!(
            "Assembled {} activit{} and {} organisation(s) from {} row(s), {} failed",
            outcome.activities.len(),
            if outcome.activities.len() == 1 { "y" } else { "ies" },
            outcome.organisations.len(),
            rows_read,
            tracker.count()
        ));
        outcome.logs = logs;
        outcome
    }
}

/// Built-in stage 2: render the target namespace's aggregates.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultXmlStage;

impl XmlStage for DefaultXmlStage {
    fn run(&self, request: &XmlRequest) -> XmlOutcome {
        let file_name = request.file_name();
        let mut logs = RunLog::new();

        let activities: Vec<Activity> = select(&request.activities, &request.namespace, |a| &a.namespace);
        let organisations: Vec<Organisation> =
            select(&request.organisations, &request.namespace, |o| &o.namespace);

        let other_namespaces = match request.document {
            DocumentKind::Activities => request.activities.len() - activities.len(),
            DocumentKind::Organisations => request.organisations.len() - organisations.len(),
        };
        if other_namespaces > 0 {
            logs.warning(format!(
                "{} record(s) from other namespaces left out of {}",
                other_namespaces, file_name
            ));
        }

        let count = match request.document {
            DocumentKind::Activities => activities.len(),
            DocumentKind::Organisations => organisations.len(),
        };
        logs.info(format!("Serializing {} {} to {}", count, request.document, file_name));

        let options = request
            .generated_at
            .map(SerializeOptions::at)
            .unwrap_or_default()
            .with_default_currency(request.default_currency.clone());

        match xml::serialize(request.document, &activities, &organisations, &options) {
            Ok(xml) => {
                logs.success(format!("Generated {} ({} bytes)", file_name, xml.len()));
                XmlOutcome {
                    xml: Some(xml),
                    file_name,
                    logs,
                    error: None,
                }
            }
            Err(e) => {
                if let SerializeError::Schema { errors } = &e {
                    for schema_error in errors {
                        logs.error(schema_error.to_string());
                    }
                } else {
                    logs.error(e.to_string());
                }
                XmlOutcome {
                    xml: None,
                    file_name,
                    logs,
                    error: Some(e.into()),
                }
            }
        }
    }
}

fn select<T: Clone>(items: &[T], namespace: &Namespace, ns: impl Fn(&T) -> &Namespace) -> Vec<T> {
    items.iter().filter(|item| ns(item) == namespace).cloned().collect()
}

// =============================================================================
// Pipeline
// =============================================================================

/// The two stages plus the run configuration.
#[derive(Debug, Clone)]
pub struct Pipeline<A = DefaultActivitiesStage, X = DefaultXmlStage> {
    activities: A,
    xml: X,
    config: ConversionConfig,
    generated_at: Option<DateTime<Utc>>,
}

impl Pipeline {
    pub fn new(config: ConversionConfig) -> Self {
        Self {
            activities: DefaultActivitiesStage,
            xml: DefaultXmlStage,
            config,
            generated_at: None,
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(ConversionConfig::default())
    }
}

impl<A: ActivitiesStage, X: XmlStage> Pipeline<A, X> {
    /// Replace stage 1.
    pub fn with_activities_stage<B: ActivitiesStage>(self, stage: B) -> Pipeline<B, X> {
        Pipeline {
            activities: stage,
            xml: self.xml,
            config: self.config,
            generated_at: self.generated_at,
        }
    }

    /// Replace stage 2.
    pub fn with_xml_stage<Y: XmlStage>(self, stage: Y) -> Pipeline<A, Y> {
        Pipeline {
            activities: self.activities,
            xml: stage,
            config: self.config,
            generated_at: self.generated_at,
        }
    }

    /// Fix the `generated-datetime` of produced documents.
    pub fn with_generated_at(mut self, generated_at: DateTime<Utc>) -> Self {
        self.generated_at = Some(generated_at);
        self
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Run stage 1 only.
    pub fn activities(&self, request: &ConversionRequest) -> ActivitiesOutcome {
        self.activities.run(request, &self.config)
    }

    /// Run stage 2 only.
    pub fn xml(&self, request: &XmlRequest) -> XmlOutcome {
        self.xml.run(request)
    }

    /// Run both stages.
    pub fn convert(&self, request: &ConversionRequest) -> XmlOutcome {
        let target = match request.target() {
            Ok(target) => target,
            Err(e) => {
                let mut logs = RunLog::new();
                let error = PipelineError::from(e);
                logs.error(error.to_string());
                return XmlOutcome {
                    xml: None,
                    file_name: String::new(),
                    logs,
                    error: Some(error),
                };
            }
        };

        let mut stage1 = self.activities(request);
        let mut logs = std::mem::take(&mut stage1.logs);

        if let Some(error) = stage1.error.take() {
            return XmlOutcome {
                xml: None,
                file_name: target.file_name(),
                logs,
                error: Some(error),
            };
        }

        let xml_request = XmlRequest::from_outcome(stage1, target)
            .with_generated_at(self.generated_at)
            .with_default_currency(self.config.default_currency.clone());
        let stage2 = self.xml(&xml_request);

        logs.extend(stage2.logs);
        XmlOutcome { logs, ..stage2 }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::logs::LogLevel;
    use crate::parser::parse_str;
    use chrono::TimeZone;

    const NAMES: &str = "iati_identifier,reporting_org_ref,language,title\n";
    const TRANSACTIONS: &str = "iati_identifier,reporting_org_ref,transaction_type,transaction_date,value\n";
    const MAIN: &str = "iati_identifier,reporting_org_ref,reporting_org_type,reporting_org_name,title,default_currency\n";

    fn resource(name: &str, file_type: FileType, content: &str) -> CsvResource {
        CsvResource::new(name, file_type, parse_str(content, ',').unwrap())
    }

    /// Header-only main file, so a request names its core resource.
    fn main_header() -> CsvResource {
        resource("activities.csv", FileType::ActivityMain, MAIN)
    }

    fn request(resources: Vec<CsvResource>) -> ConversionRequest {
        resources
            .into_iter()
            .fold(ConversionRequest::new("dataset"), ConversionRequest::with_resource)
    }

    fn pipeline() -> Pipeline {
        Pipeline::default().with_generated_at(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
    }

    fn transactions(rows: usize) -> String {
        let mut content = TRANSACTIONS.to_string();
        for i in 0..rows {
            content.push_str(&format!("AC-{},XM-DAC-1,3,2024-01-01,{}\n", i, i + 1));
        }
        content
    }

    #[test]
    fn test_narrative_and_transaction_merge_with_one_bad_row() {
        let req = request(vec![
            resource("names.csv", FileType::ActivityNames, &format!("{NAMES}AC-1,XM-DAC-1,fr,Eau\n")),
            resource(
                "transactions.csv",
                FileType::ActivityTransactions,
                &format!("{TRANSACTIONS}AC-1,XM-DAC-1,3,2024-01-01,100\nAC-1,XM-DAC-1,3,,50\n"),
            ),
            main_header(),
        ]);

        let outcome = pipeline().activities(&req);

        assert!(outcome.is_success());
        assert_eq!(outcome.resource_name, "dataset");
        assert_eq!(outcome.activities.len(), 1);
        let activity = &outcome.activities[0];
        assert_eq!(activity.identifier, "AC-1");
        assert_eq!(activity.reporting_org.reference, "XM-DAC-1");
        assert_eq!(activity.names.len(), 1);
        assert_eq!(activity.transactions.len(), 1);
        assert_eq!(outcome.logs.count(LogLevel::Error), 1);
        assert!(outcome.logs.lines().iter().any(|l| l.starts_with("ERROR: [transactions.csv] Row 3")));
    }

    #[test]
    fn test_failure_limit_aborts_run() {
        let req = request(vec![
            resource(
                "transactions.csv",
                FileType::ActivityTransactions,
                &format!("{TRANSACTIONS}AC-1,XM-DAC-1,3,bad-date,1\nAC-2,XM-DAC-1,99,2024-01-01,1\nAC-3,XM-DAC-1,3,2024-01-01,1\n"),
            ),
            main_header(),
        ]);
        let pipeline = Pipeline::new(ConversionConfig::default().with_max_allowed_failures(1));

        let outcome = pipeline.activities(&req);

        assert!(!outcome.is_success());
        assert!(matches!(
            outcome.error,
            Some(PipelineError::FailureLimit { failures: 2, max_allowed: 1 })
        ));
        // two row errors plus the abort line
        assert_eq!(outcome.logs.count(LogLevel::Error), 3);
        // the third row was never read
        assert!(outcome.activities.is_empty());
        assert!(outcome.clone().into_result().is_err());
    }

    #[test]
    fn test_one_activity_per_key() {
        let content = format!(
            "{TRANSACTIONS}AC-1,XM-DAC-1,3,2024-01-01,1\nAC-2,XM-DAC-1,3,2024-01-01,2\nAC-1,XM-DAC-1,4,2024-02-01,3\n"
        );
        let req = request(vec![
            resource("transactions.csv", FileType::ActivityTransactions, &content),
            main_header(),
        ]);

        let outcome = pipeline().activities(&req);

        assert!(outcome.is_success());
        assert_eq!(outcome.logs.count(LogLevel::Error), 0);
        let ids: Vec<_> = outcome.activities.iter().map(|a| a.identifier.as_str()).collect();
        assert_eq!(ids, vec!["AC-1", "AC-2"]);
        assert_eq!(outcome.activities[0].transactions.len(), 2);
    }

    #[test]
    fn test_stage_one_is_deterministic() {
        let req = request(vec![
            resource("transactions.csv", FileType::ActivityTransactions, &transactions(20)),
            main_header(),
        ]);
        let first = pipeline().activities(&req);
        let second = pipeline().activities(&req);

        assert_eq!(first.activities, second.activities);
        assert_eq!(first.logs.lines(), second.logs.lines());
    }

    #[test]
    fn test_rows_limit_truncates_without_error() {
        let req = request(vec![
            resource("a.csv", FileType::ActivityTransactions, &transactions(3)),
            resource("b.csv", FileType::ActivityTransactions, &transactions(3)),
            main_header(),
        ]);
        let pipeline = Pipeline::new(ConversionConfig::default().with_rows_limit(4));

        let outcome = pipeline.activities(&req);

        assert!(outcome.is_success());
        assert_eq!(outcome.logs.count(LogLevel::Warning), 1);
        assert!(outcome.logs.lines().iter().any(|l| l.contains("Row limit of 4")));
        let total: usize = outcome.activities.iter().map(|a| a.transactions.len()).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_exact_rows_limit_logs_no_truncation() {
        let req = request(vec![resource("a.csv", FileType::ActivityTransactions, &transactions(3)), main_header()]);
        let outcome = Pipeline::new(ConversionConfig::default().with_rows_limit(3)).activities(&req);
        assert!(outcome.is_success());
        assert_eq!(outcome.logs.count(LogLevel::Warning), 0);
    }

    #[test]
    fn test_missing_header_fails_before_reading_rows() {
        let req = request(vec![
            resource("a.csv", FileType::ActivityTransactions, &transactions(2)),
            resource("names.csv", FileType::ActivityNames, "iati_identifier,title\nAC-1,Eau\n"),
        ]);

        let outcome = pipeline().activities(&req);

        assert!(matches!(outcome.error, Some(PipelineError::Input(InputError::MissingColumns { .. }))));
        assert!(outcome.activities.is_empty());
        assert!(!outcome.logs.lines().iter().any(|l| l.contains("Reading")));
    }

    #[test]
    fn test_empty_request_is_input_error() {
        let outcome = pipeline().activities(&ConversionRequest::new("empty"));
        assert!(matches!(outcome.error, Some(PipelineError::Input(InputError::EmptyRequest))));
    }

    #[test]
    fn test_convert_produces_xml() {
        let req = request(vec![
            resource(
                "activities.csv",
                FileType::ActivityMain,
                &format!("{MAIN}AC-1,XM-DAC-1,10,Ministry,Water,EUR\n"),
            ),
            resource("transactions.csv", FileType::ActivityTransactions, &format!("{TRANSACTIONS}AC-1,XM-DAC-1,3,2024-01-01,100\n")),
        ]);

        let outcome = pipeline().convert(&req);

        assert!(outcome.is_success(), "{:?}", outcome.logs.lines());
        assert_eq!(outcome.file_name, "iati-activities.xml");
        let first = outcome.logs.lines()[0].clone();
        assert!(first.starts_with("INFO: Generating iati-activities.xml"));
        assert!(outcome.logs.lines().last().unwrap().starts_with("SUCCESS: Generated iati-activities.xml"));

        let (_, xml) = outcome.into_result().unwrap();
        assert!(xml.contains(r#"generated-datetime="2024-05-01T00:00:00Z""#));
        assert!(xml.contains("<iati-identifier>AC-1</iati-identifier>"));
        assert!(xml.contains(r#"<value currency="EUR" value-date="2024-01-01">100</value>"#));
    }

    #[test]
    fn test_convert_reports_schema_errors() {
        let req = request(vec![
            resource("transactions.csv", FileType::ActivityTransactions, &transactions(2)),
            main_header(),
        ]);

        let outcome = pipeline().convert(&req);

        assert!(outcome.xml.is_none());
        assert!(matches!(outcome.error, Some(PipelineError::Serialize(_))));
        // title, reporting_org_type, reporting_org_name for each of two activities
        assert_eq!(outcome.logs.count(LogLevel::Error), 6);
    }

    #[test]
    fn test_convert_stops_after_failed_stage_one() {
        let failing = |_: &ConversionRequest, _: &ConversionConfig| {
            let mut outcome = ActivitiesOutcome::new("dataset");
            outcome.logs.info("custom stage");
            outcome.error = Some(PipelineError::Stage("upstream failed".into()));
            outcome
        };
        let xml_never_runs = |_: &XmlRequest| -> XmlOutcome { panic!("stage 2 must not run") };
        let req = request(vec![resource("a.csv", FileType::ActivityTransactions, &transactions(1))]);

        let outcome = pipeline()
            .with_activities_stage(failing)
            .with_xml_stage(xml_never_runs)
            .convert(&req);

        assert_eq!(outcome.logs.lines(), vec!["INFO: custom stage"]);
        assert!(matches!(outcome.error, Some(PipelineError::Stage(_))));
    }

    #[test]
    fn test_wrapped_stage_enriches_activities() {
        let enrich = |req: &ConversionRequest, config: &ConversionConfig| {
            DefaultActivitiesStage.run(req, config).map_activities(|mut activity| {
                activity.reporting_org.org_type.get_or_insert_with(|| "10".to_string());
                activity.reporting_org.name.get_or_insert_with(|| "Ministry".to_string());
                activity.title.get_or_insert_with(|| crate::models::Narrative::new("Untitled"));
                activity
            })
        };
        let req = request(vec![resource("a.csv", FileType::ActivityTransactions, &transactions(2)), main_header()]);

        let outcome = pipeline().with_activities_stage(enrich).convert(&req);

        assert!(outcome.is_success());
        assert_eq!(outcome.xml.unwrap().matches("<title>").count(), 2);
    }

    #[test]
    fn test_namespaces_are_kept_apart() {
        let ns = Namespace::parse("country-a").unwrap();
        let req = request(vec![
            resource("a.csv", FileType::ActivityTransactions, &transactions(1)).with_namespace(ns.clone()),
            resource("b.csv", FileType::ActivityTransactions, &transactions(1)),
            main_header(),
        ]);

        let outcome = pipeline().activities(&req);
        assert_eq!(outcome.activities.len(), 2);

        let target = req.target().unwrap();
        assert_eq!(target.namespace, ns);
        assert_eq!(target.file_name(), "iati-activities-country-a.xml");

        let xml_outcome = pipeline().xml(&XmlRequest::from_outcome(outcome, target));
        assert!(xml_outcome.logs.lines()[0].starts_with("WARNING: 1 record(s) from other namespaces"));
    }

    #[test]
    fn test_organisation_resources_feed_organisation_document() {
        let req = request(vec![
            resource(
                "organisations.csv",
                FileType::OrganisationMain,
                "organisation_identifier,reporting_org_ref,name,reporting_org_type\nXM-DAC-1,XM-DAC-1,Ministry,10\n",
            ),
            resource("transactions.csv", FileType::ActivityTransactions, &transactions(1)),
        ]);

        let outcome = pipeline().convert(&req);

        assert!(outcome.is_success(), "{:?}", outcome.logs.lines());
        assert_eq!(outcome.file_name, "iati-organisations.xml");
        assert!(outcome.logs.lines().iter().any(|l| l.starts_with("WARNING: Skipping 'transactions.csv'")));
        assert!(outcome.xml.unwrap().contains("<organisation-identifier>XM-DAC-1</organisation-identifier>"));
    }

    #[test]
    fn test_invalid_optional_value_is_warning_only() {
        let content = "iati_identifier,reporting_org_ref,transaction_type,transaction_date,value,currency\n\
                       AC-1,XM-DAC-1,3,2024-01-01,10,EURO\n";
        let req = request(vec![resource("t.csv", FileType::ActivityTransactions, content), main_header()]);

        let outcome = pipeline().activities(&req);

        assert!(outcome.is_success());
        assert_eq!(outcome.logs.count(LogLevel::Error), 0);
        assert_eq!(outcome.logs.count(LogLevel::Warning), 1);
        assert_eq!(outcome.activities[0].transactions[0].value.currency, None);
    }

    #[test]
    fn test_missing_main_resource_is_input_error() {
        let req = request(vec![resource(
            "organisation_names.csv",
            FileType::OrganisationNames,
            "organisation_identifier,reporting_org_ref,language,name\nXM-DAC-1,XM-DAC-1,fr,Ministere\n",
        )]);

        let outcome = pipeline().convert(&req);

        assert!(outcome.xml.is_none());
        assert_eq!(outcome.file_name, "iati-organisations.xml");
        match &outcome.error {
            Some(PipelineError::Input(InputError::MissingMainResource { document, file_type, file_name })) => {
                assert_eq!(*document, DocumentKind::Organisations);
                assert_eq!(*file_type, FileType::OrganisationMain);
                assert_eq!(*file_name, "organisations.csv");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!outcome.logs.lines().iter().any(|l| l.contains("Reading")));
    }

    #[test]
    fn test_transactions_only_request_needs_main_resource() {
        let req = request(vec![resource("transactions.csv", FileType::ActivityTransactions, &transactions(2))]);

        let outcome = pipeline().activities(&req);

        assert!(matches!(
            outcome.error,
            Some(PipelineError::Input(InputError::MissingMainResource { file_type: FileType::ActivityMain, .. }))
        ));
        assert!(outcome.activities.is_empty());
    }

    #[test]
    fn test_transaction_sectors_read_after_transactions() {
        let req = request(vec![
            resource(
                "transaction_sectors.csv",
                FileType::ActivityTransactionSectors,
                "iati_identifier,reporting_org_ref,transaction_ref,sector_code\nAC-1,XM-DAC-1,TX-1,14030\n",
            ),
            resource(
                "transactions.csv",
                FileType::ActivityTransactions,
                "iati_identifier,reporting_org_ref,transaction_ref,transaction_type,transaction_date,value\n\
                 AC-1,XM-DAC-1,TX-1,3,2024-01-01,100\n",
            ),
            main_header(),
        ]);

        let outcome = pipeline().activities(&req);

        assert!(outcome.is_success(), "{:?}", outcome.logs.lines());
        let transaction = &outcome.activities[0].transactions[0];
        assert_eq!(transaction.sectors.len(), 1);
        assert_eq!(transaction.sectors[0].code, "14030");
        assert_eq!(transaction.sectors[0].vocabulary, "1");
    }

    #[test]
    fn test_default_currency_fills_values_without_currency() {
        let req = request(vec![
            resource("activities.csv", FileType::ActivityMain, &format!("{MAIN}AC-1,XM-DAC-1,10,Ministry,Water,\n")),
            resource("transactions.csv", FileType::ActivityTransactions, &format!("{TRANSACTIONS}AC-1,XM-DAC-1,3,2024-01-01,100\n")),
        ]);

        let outcome = pipeline().convert(&req);

        assert!(outcome.is_success(), "{:?}", outcome.logs.lines());
        assert!(outcome
            .xml
            .unwrap()
            .contains(r#"<value currency="USD" value-date="2024-01-01">100</value>"#));
    }

    #[test]
    fn test_missing_currency_without_fallback_is_schema_error() {
        let req = request(vec![
            resource("activities.csv", FileType::ActivityMain, &format!("{MAIN}AC-1,XM-DAC-1,10,Ministry,Water,\n")),
            resource("transactions.csv", FileType::ActivityTransactions, &format!("{TRANSACTIONS}AC-1,XM-DAC-1,3,2024-01-01,100\n")),
        ]);
        let pipeline = Pipeline::new(ConversionConfig::default().with_default_currency(None));

        let outcome = pipeline.convert(&req);

        assert!(outcome.xml.is_none());
        match &outcome.error {
            Some(PipelineError::Serialize(SerializeError::Schema { errors })) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "currency");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(outcome
            .logs
            .lines()
            .iter()
            .any(|l| l == "ERROR: Activity 'AC-1' is missing mandatory field 'currency'"));
    }

    #[test]
    fn test_row_cap_keeps_one_row_past_the_limit() {
        let limit = 5;
        let bytes = transactions(1000).into_bytes();
        let limited =
            CsvResource::from_bytes_limited("transactions.csv", FileType::ActivityTransactions, &bytes, limit + 1)
                .unwrap();
        assert!(limited.table.len() <= limit + 1);
        assert_eq!(limited.table.len(), 6);

        let req = request(vec![limited, main_header()]);
        let outcome = Pipeline::new(ConversionConfig::default().with_rows_limit(limit)).activities(&req);

        assert!(outcome.is_success());
        assert_eq!(outcome.activities.len(), 5);
        assert!(outcome.logs.lines().iter().any(|l| l.contains("Row limit of 5")));
    }
}
