//! Row Validator: raw CSV rows to typed records.
//!
//! Validation is driven by the [`Ruleset`] of the resource's [`FileType`]:
//!
//! 1. headers are matched after [`normalize_header`], extra columns ignored
//! 2. a required header missing from the table is an [`InputError`]
//! 3. a blank or invalid required value is a [`RowError`]
//! 4. an invalid optional value is dropped and kept as a [`FieldIssue`]
//!
//! Rows whose every cell is blank are skipped (`Ok(None)`).
//!
//! # Example
//!
//! ```rust,ignore
//! use iati_generator::{parser, validation::RowValidator, FileType, Namespace};
//!
//! let table = parser::parse_str("iati_identifier,reporting_org_ref,language,title\n\
//!                                AC-1,XM-DAC-1,fr,Eau\n", ',')?;
//! let validator = RowValidator::new("names.csv", FileType::ActivityNames, Namespace::default(), &table.headers)?;
//! let record = validator.validate(&table.rows[0])?.unwrap();
//! assert_eq!(record.key.identifier, "AC-1");
//! ```

mod rules;

pub use rules::{
    normalize_header, parse_date, ruleset, ColumnRule, FieldKind, FieldValue, Ruleset, IDENTIFIER_MAX_LEN,
};

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;

use crate::error::{InputError, RowError};
use crate::models::{
    ActivityDate, Administrative, Amount, Budget, BudgetLine, BudgetTarget, ContactInfo, Description, DocumentLink,
    Expenditure, FileType, Location, MonetaryValue, Namespace, Narrative, OrganisationBudget, ParticipatingOrg, Point,
    RecordKey, Sector, Transaction, VocabularyCode,
};
use crate::parser::CsvRow;

// =============================================================================
// Validated Records
// =============================================================================

/// An optional value that failed coercion and was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub column: String,
    pub value: String,
    pub reason: String,
}

/// Core fields of an activity, from the activity-main file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityCore {
    pub reporting_org_type: String,
    pub reporting_org_name: String,
    pub title: Narrative,
    pub description: Option<Narrative>,
    pub activity_status: Option<String>,
    pub default_currency: Option<String>,
    pub default_language: Option<String>,
}

/// Core fields of an organisation, from the organisation-main file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganisationCore {
    pub name: Narrative,
    pub reporting_org_type: String,
    pub reporting_org_name: Option<String>,
    pub default_currency: Option<String>,
    pub default_language: Option<String>,
}

/// A sector row addressed to one transaction of an activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSector {
    pub transaction_ref: String,
    pub sector: Sector,
}

/// What a record contributes to its aggregate. One variant per file type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordPayload {
    ActivityMain(ActivityCore),
    ActivityName(Narrative),
    ActivityDescription(Description),
    ParticipatingOrg(ParticipatingOrg),
    Sector(Sector),
    Budget(Budget),
    Transaction(Transaction),
    TransactionSector(TransactionSector),
    Location(Location),
    ActivityDocument(DocumentLink),
    ActivityDate(ActivityDate),
    ContactInfo(ContactInfo),
    OrganisationMain(OrganisationCore),
    OrganisationName(Narrative),
    OrganisationBudget(OrganisationBudget),
    Expenditure(Expenditure),
    OrganisationDocument(DocumentLink),
}

/// A row after coercion, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRecord {
    pub resource: String,
    pub file_type: FileType,
    /// CSV line the row started on.
    pub row: usize,
    pub key: RecordKey,
    pub payload: RecordPayload,
    /// Non-fatal problems found in optional columns.
    pub issues: Vec<FieldIssue>,
}

// =============================================================================
// Row Validator
// =============================================================================

/// Validates the rows of one resource.
///
/// Built once per table so header matching happens once, not per row.
#[derive(Debug, Clone)]
pub struct RowValidator {
    resource: String,
    ruleset: &'static Ruleset,
    namespace: Namespace,
    /// Rule name → header as it appears in the table.
    columns: HashMap<&'static str, String>,
}

impl RowValidator {
    /// Match the table headers against the file type's ruleset.
    pub fn new(
        resource: impl Into<String>,
        file_type: FileType,
        namespace: Namespace,
        headers: &[String],
    ) -> Result<Self, InputError> {
        let resource = resource.into();
        let ruleset = ruleset(file_type);
        let columns = match_columns(ruleset, headers.iter().map(String::as_str));

        let missing: Vec<String> = ruleset
            .required_columns()
            .filter(|c| !columns.contains_key(c.name))
            .map(|c| c.name.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(InputError::MissingColumns { resource, columns: missing });
        }

        Ok(Self {
            resource,
            ruleset,
            namespace,
            columns,
        })
    }

    pub fn file_type(&self) -> FileType {
        self.ruleset.file_type
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Validate one row. `Ok(None)` means the row was blank and skipped.
    pub fn validate(&self, row: &CsvRow) -> Result<Option<ValidatedRecord>, RowError> {
        if row.fields.values().all(|v| v.trim().is_empty()) {
            return Ok(None);
        }

        let mut cells = Cells {
            validator: self,
            row,
            values: IndexMap::new(),
            issues: Vec::new(),
        };
        for rule in self.ruleset.all_columns() {
            cells.coerce(rule)?;
        }

        let key = RecordKey::new(
            self.namespace.clone(),
            cells.required_text("reporting_org_ref")?,
            cells.required_text(self.ruleset.identifier_column())?,
        );
        let payload = build_payload(self.ruleset.file_type, &cells)?;

        Ok(Some(ValidatedRecord {
            resource: self.resource.clone(),
            file_type: self.ruleset.file_type,
            row: row.line,
            key,
            payload,
            issues: cells.issues,
        }))
    }

    fn row_error(&self, row: usize, column: Option<&str>, reason: impl Into<String>) -> RowError {
        let err = RowError::new(self.resource.clone(), row, reason);
        match column {
            Some(col) => err.with_column(col),
            None => err,
        }
    }
}

/// Validate a single row without a prepared [`RowValidator`].
///
/// Headers are taken from the row itself, so a required column missing from
/// the row is reported as a [`RowError`] rather than an [`InputError`].
pub fn validate_row(
    resource: &str,
    row: &CsvRow,
    file_type: FileType,
    namespace: &Namespace,
) -> Result<Option<ValidatedRecord>, RowError> {
    let headers: Vec<String> = row.fields.keys().cloned().collect();
    match RowValidator::new(resource, file_type, namespace.clone(), &headers) {
        Ok(validator) => validator.validate(row),
        Err(InputError::MissingColumns { columns, .. }) => {
            if row.fields.values().all(|v| v.trim().is_empty()) {
                return Ok(None);
            }
            Err(RowError::new(resource, row.line, "missing required value")
                .with_column(columns.join(", ")))
        }
        Err(other) => Err(RowError::new(resource, row.line, other.to_string())),
    }
}

/// Required headers of `file_type` that `headers` does not provide.
pub fn missing_headers(file_type: FileType, headers: &[String]) -> Vec<&'static str> {
    let rules = ruleset(file_type);
    let columns = match_columns(rules, headers.iter().map(String::as_str));
    rules
        .required_columns()
        .filter(|c| !columns.contains_key(c.name))
        .map(|c| c.name)
        .collect()
}

fn match_columns<'a>(
    ruleset: &'static Ruleset,
    headers: impl Iterator<Item = &'a str>,
) -> HashMap<&'static str, String> {
    let mut columns = HashMap::new();
    for header in headers {
        let normalized = normalize_header(header);
        if let Some(rule) = ruleset.column(&normalized) {
            columns.entry(rule.name).or_insert_with(|| header.to_string());
        }
    }
    columns
}

// =============================================================================
// Cell Access
// =============================================================================

/// Coerced values of one row, keyed by rule name.
struct Cells<'a> {
    validator: &'a RowValidator,
    row: &'a CsvRow,
    values: IndexMap<&'static str, FieldValue>,
    issues: Vec<FieldIssue>,
}

impl Cells<'_> {
    fn coerce(&mut self, rule: &'static ColumnRule) -> Result<(), RowError> {
        let (validator, row) = (self.validator, self.row);
        let raw = validator
            .columns
            .get(rule.name)
            .and_then(|header| row.fields.get(header))
            .map(|v| v.trim())
            .unwrap_or("");

        if raw.is_empty() {
            if rule.required {
                return Err(self.error(Some(rule.name), "missing required value"));
            }
            if let Some(default) = rule.default {
                if let Ok(value) = rule.kind.coerce(default) {
                    self.values.insert(rule.name, value);
                }
            }
            return Ok(());
        }

        match rule.kind.coerce(raw) {
            Ok(value) => {
                self.values.insert(rule.name, value);
            }
            Err(reason) if rule.required => return Err(self.error(Some(rule.name), reason)),
            Err(reason) => {
                self.issues.push(FieldIssue {
                    column: rule.name.to_string(),
                    value: raw.to_string(),
                    reason,
                });
                if let Some(default) = rule.default {
                    if let Ok(value) = rule.kind.coerce(default) {
                        self.values.insert(rule.name, value);
                    }
                }
            }
        }
        Ok(())
    }

    fn error(&self, column: Option<&str>, reason: impl Into<String>) -> RowError {
        self.validator.row_error(self.row.line, column, reason)
    }

    fn text(&self, name: &str) -> Option<String> {
        match self.values.get(name) {
            Some(FieldValue::Text(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn date(&self, name: &str) -> Option<NaiveDate> {
        match self.values.get(name) {
            Some(FieldValue::Date(d)) => Some(*d),
            _ => None,
        }
    }

    fn amount(&self, name: &str) -> Option<Amount> {
        match self.values.get(name) {
            Some(FieldValue::Amount(a)) => Some(a.clone()),
            _ => None,
        }
    }

    fn required_text(&self, name: &str) -> Result<String, RowError> {
        self.text(name)
            .ok_or_else(|| self.error(Some(name), "missing required value"))
    }

    fn required_date(&self, name: &str) -> Result<NaiveDate, RowError> {
        self.date(name)
            .ok_or_else(|| self.error(Some(name), "missing required value"))
    }

    fn required_amount(&self, name: &str) -> Result<Amount, RowError> {
        self.amount(name)
            .ok_or_else(|| self.error(Some(name), "missing required value"))
    }

    fn narrative(&self, text_column: &str, lang_column: &str) -> Result<Narrative, RowError> {
        Ok(Narrative::new(self.required_text(text_column)?).with_lang(self.text(lang_column)))
    }

    /// Start/end period with `end >= start`.
    fn period(&self) -> Result<(NaiveDate, NaiveDate), RowError> {
        let start = self.required_date("period_start")?;
        let end = self.required_date("period_end")?;
        if end < start {
            return Err(self.error(
                Some("period_end"),
                format!("period end {} is before period start {}", end, start),
            ));
        }
        Ok((start, end))
    }

    fn value(&self, fallback_date: NaiveDate) -> Result<MonetaryValue, RowError> {
        Ok(MonetaryValue {
            amount: self.required_amount("value")?,
            currency: self.text("currency"),
            value_date: self.date("value_date").unwrap_or(fallback_date),
        })
    }

    /// Narrative from `column` in the row's `language`.
    fn localized(&self, column: &str) -> Option<Narrative> {
        self.text(column).map(|text| Narrative::new(text).with_lang(self.text("language")))
    }

    /// Optional `budget-line` / `expense-line` carried by the row.
    fn line(&self, fallback_date: NaiveDate) -> Result<Option<BudgetLine>, RowError> {
        let reference = self.text("line_ref");
        let narrative = self
            .text("line_narrative")
            .map(|text| Narrative::new(text).with_lang(self.text("line_narrative_lang")));

        let Some(amount) = self.amount("line_value") else {
            if reference.is_some() || narrative.is_some() {
                return Err(self.error(Some("line_value"), "a budget or expense line needs line_value"));
            }
            return Ok(None);
        };

        Ok(Some(BudgetLine {
            reference,
            value: MonetaryValue {
                amount,
                currency: self.text("line_currency").or_else(|| self.text("currency")),
                value_date: self.date("line_value_date").unwrap_or(fallback_date),
            },
            narrative,
        }))
    }

    fn location(&self) -> Result<Location, RowError> {
        let point = match (self.text("latitude"), self.text("longitude")) {
            (Some(latitude), Some(longitude)) => Some(Point { latitude, longitude }),
            (None, None) => None,
            (Some(_), None) => return Err(self.error(Some("longitude"), "latitude given without longitude")),
            (None, Some(_)) => return Err(self.error(Some("latitude"), "longitude given without latitude")),
        };
        let location_id = self.vocabulary_code("location_id_code", "location_id_vocabulary")?;
        let administrative = self
            .vocabulary_code("administrative_code", "administrative_vocabulary")?
            .map(|id| Administrative {
                code: id.code,
                vocabulary: id.vocabulary,
                level: self.text("administrative_level"),
            });
        let name = self.localized("name");

        if name.is_none() && point.is_none() && location_id.is_none() {
            return Err(self.error(Some("name"), "a location needs a name, coordinates or a location id"));
        }

        Ok(Location {
            reference: self.text("location_ref"),
            reach: self.text("location_reach"),
            location_id,
            name,
            description: self.localized("description"),
            activity_description: self.localized("activity_description"),
            administrative,
            point,
            exactness: self.text("exactness"),
            location_class: self.text("location_class"),
            feature_designation: self.text("feature_designation"),
        })
    }

    /// A code and its vocabulary, which must be given together.
    fn vocabulary_code(&self, code_column: &str, vocabulary_column: &str) -> Result<Option<VocabularyCode>, RowError> {
        match (self.text(code_column), self.text(vocabulary_column)) {
            (Some(code), Some(vocabulary)) => Ok(Some(VocabularyCode { code, vocabulary })),
            (None, None) => Ok(None),
            (Some(_), None) => Err(self.error(Some(vocabulary_column), format!("{} needs a vocabulary", code_column))),
            (None, Some(_)) => Err(self.error(Some(code_column), format!("{} given without a code", vocabulary_column))),
        }
    }

    fn contact(&self) -> Result<ContactInfo, RowError> {
        let contact = ContactInfo {
            contact_type: self.text("contact_type"),
            organisation: self.localized("organisation"),
            department: self.localized("department"),
            person_name: self.localized("person_name"),
            job_title: self.localized("job_title"),
            telephone: self.text("telephone"),
            email: self.text("email"),
            website: self.text("website"),
            mailing_address: self.localized("mailing_address"),
        };
        let reachable = contact.organisation.is_some()
            || contact.person_name.is_some()
            || contact.telephone.is_some()
            || contact.email.is_some()
            || contact.website.is_some()
            || contact.mailing_address.is_some();
        if !reachable {
            return Err(self.error(None, "contact row has no organisation, person, phone, email, website or address"));
        }
        Ok(contact)
    }

    fn document(&self) -> Result<DocumentLink, RowError> {
        Ok(DocumentLink {
            url: self.required_text("url")?,
            format: self.text("format").unwrap_or_else(|| "text/html".to_string()),
            title: self.narrative("title", "language")?,
            category_code: self.required_text("category_code")?,
            language: self.text("language"),
            document_date: self.date("document_date"),
        })
    }
}

fn build_payload(file_type: FileType, cells: &Cells<'_>) -> Result<RecordPayload, RowError> {
    let payload = match file_type {
        FileType::ActivityMain => RecordPayload::ActivityMain(ActivityCore {
            reporting_org_type: cells.required_text("reporting_org_type")?,
            reporting_org_name: cells.required_text("reporting_org_name")?,
            title: Narrative::new(cells.required_text("title")?),
            description: cells.text("description").map(Narrative::new),
            activity_status: cells.text("activity_status"),
            default_currency: cells.text("default_currency"),
            default_language: cells.text("default_language"),
        }),
        FileType::ActivityNames => RecordPayload::ActivityName(cells.narrative("title", "language")?),
        FileType::ActivityDescriptions => RecordPayload::ActivityDescription(Description {
            description_type: cells.text("description_type").unwrap_or_else(|| "1".to_string()),
            narrative: cells.narrative("description", "language")?,
        }),
        FileType::ActivityParticipatingOrgs => {
            let org_ref = cells.text("org_ref");
            let name = cells.text("org_name");
            if org_ref.is_none() && name.is_none() {
                return Err(cells.error(Some("org_ref"), "either org_ref or org_name is required"));
            }
            RecordPayload::ParticipatingOrg(ParticipatingOrg {
                role: cells.required_text("org_role")?,
                org_ref,
                org_type: cells.text("org_type"),
                name,
            })
        }
        FileType::ActivitySectors => RecordPayload::Sector(Sector {
            code: cells.required_text("sector_code")?,
            vocabulary: cells.text("vocabulary").unwrap_or_else(|| "1".to_string()),
            percentage: cells.amount("percentage"),
        }),
        FileType::ActivityBudgets => {
            let (period_start, period_end) = cells.period()?;
            RecordPayload::Budget(Budget {
                budget_type: cells.text("budget_type").unwrap_or_else(|| "1".to_string()),
                status: cells.text("budget_status").unwrap_or_else(|| "1".to_string()),
                period_start,
                period_end,
                value: cells.value(period_start)?,
            })
        }
        FileType::ActivityTransactions => {
            let date = cells.required_date("transaction_date")?;
            RecordPayload::Transaction(Transaction {
                reference: cells.text("transaction_ref"),
                transaction_type: cells.required_text("transaction_type")?,
                date,
                value: cells.value(date)?,
                description: cells.text("description").map(Narrative::new),
                sectors: Vec::new(),
            })
        }
        FileType::ActivityTransactionSectors => RecordPayload::TransactionSector(TransactionSector {
            transaction_ref: cells.required_text("transaction_ref")?,
            sector: Sector {
                code: cells.required_text("sector_code")?,
                vocabulary: cells.text("vocabulary").unwrap_or_else(|| "1".to_string()),
                percentage: None,
            },
        }),
        FileType::ActivityLocations => RecordPayload::Location(cells.location()?),
        FileType::ActivityContactInfo => RecordPayload::ContactInfo(cells.contact()?),
        FileType::ActivityDocuments => RecordPayload::ActivityDocument(cells.document()?),
        FileType::ActivityDates => RecordPayload::ActivityDate(ActivityDate {
            date_type: cells.required_text("date_type")?,
            iso_date: cells.required_date("iso_date")?,
        }),
        FileType::OrganisationMain => RecordPayload::OrganisationMain(OrganisationCore {
            name: Narrative::new(cells.required_text("name")?),
            reporting_org_type: cells.required_text("reporting_org_type")?,
            reporting_org_name: cells.text("reporting_org_name"),
            default_currency: cells.text("default_currency"),
            default_language: cells.text("default_language"),
        }),
        FileType::OrganisationNames => RecordPayload::OrganisationName(cells.narrative("name", "language")?),
        FileType::OrganisationBudgets => {
            let (period_start, period_end) = cells.period()?;
            RecordPayload::OrganisationBudget(OrganisationBudget {
                target: budget_target(cells)?,
                status: cells.text("budget_status").unwrap_or_else(|| "2".to_string()),
                period_start,
                period_end,
                value: cells.value(period_start)?,
                lines: cells.line(period_start)?.into_iter().collect(),
            })
        }
        FileType::OrganisationExpenditures => {
            let (period_start, period_end) = cells.period()?;
            RecordPayload::Expenditure(Expenditure {
                period_start,
                period_end,
                value: cells.value(period_start)?,
                lines: cells.line(period_start)?.into_iter().collect(),
            })
        }
        FileType::OrganisationDocuments => RecordPayload::OrganisationDocument(cells.document()?),
    };
    Ok(payload)
}

fn budget_target(cells: &Cells<'_>) -> Result<BudgetTarget, RowError> {
    let kind = cells.required_text("budget_kind")?;
    let target = match kind.as_str() {
        "total-budget" => BudgetTarget::TotalBudget,
        "recipient-org-budget" => {
            let org_ref = cells.text("recipient_org_ref");
            let name = cells.text("recipient_org_name");
            if org_ref.is_none() && name.is_none() {
                return Err(cells.error(
                    Some("recipient_org_ref"),
                    "recipient-org-budget needs recipient_org_ref or recipient_org_name",
                ));
            }
            BudgetTarget::RecipientOrgBudget { org_ref, name }
        }
        "recipient-country-budget" => BudgetTarget::RecipientCountryBudget {
            country_code: cells.required_text("recipient_country_code")?,
        },
        "recipient-region-budget" => BudgetTarget::RecipientRegionBudget {
            region_code: cells.required_text("recipient_region_code")?,
            vocabulary: cells
                .text("recipient_region_vocabulary")
                .unwrap_or_else(|| "1".to_string()),
        },
        other => {
            return Err(cells.error(Some("budget_kind"), format!("unknown budget kind '{}'", other)));
        }
    };
    Ok(target)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_str, CsvTable};

    fn table(content: &str) -> CsvTable {
        parse_str(content, ',').unwrap()
    }

    fn validator(file_type: FileType, t: &CsvTable) -> RowValidator {
        RowValidator::new("test.csv", file_type, Namespace::default(), &t.headers).unwrap()
    }

    #[test]
    fn test_missing_required_header_is_input_error() {
        let t = table("iati_identifier,title\nAC-1,Water\n");
        let err = RowValidator::new("names.csv", FileType::ActivityNames, Namespace::default(), &t.headers)
            .unwrap_err();

        match err {
            InputError::MissingColumns { resource, columns } => {
                assert_eq!(resource, "names.csv");
                assert_eq!(columns, vec!["reporting_org_ref", "language"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_headers_match_after_normalisation() {
        let t = table("IATI Identifier,Reporting-Org-Ref,Language,Title,Notes\nAC-1,XM-DAC-1,FR,Eau,ignored\n");
        let record = validator(FileType::ActivityNames, &t)
            .validate(&t.rows[0])
            .unwrap()
            .unwrap();

        assert_eq!(record.key.identifier, "AC-1");
        assert_eq!(record.key.reporting_org, "XM-DAC-1");
        assert_eq!(record.row, 2);
        assert_eq!(
            record.payload,
            RecordPayload::ActivityName(Narrative::new("Eau").with_lang(Some("fr".into())))
        );
    }

    #[test]
    fn test_blank_row_is_skipped() {
        let t = table("iati_identifier,reporting_org_ref,language,title\n , ,,\n");
        assert_eq!(validator(FileType::ActivityNames, &t).validate(&t.rows[0]).unwrap(), None);
    }

    #[test]
    fn test_blank_required_value_is_row_error() {
        let t = table("iati_identifier,reporting_org_ref,transaction_type,transaction_date,value\nAC-1,XM-DAC-1,3,,100\n");
        let err = validator(FileType::ActivityTransactions, &t)
            .validate(&t.rows[0])
            .unwrap_err();

        assert_eq!(err.row, 2);
        assert_eq!(err.column.as_deref(), Some("transaction_date"));
        assert_eq!(err.to_string(), "[test.csv] Row 2, column 'transaction_date': missing required value");
    }

    #[test]
    fn test_transaction_defaults_value_date() {
        let t = table(
            "iati_identifier,reporting_org_ref,transaction_type,transaction_date,value,currency\n\
             AC-1,XM-DAC-1,3,2024-02-15T00:00:00,+1500.50,usd\n",
        );
        let record = validator(FileType::ActivityTransactions, &t)
            .validate(&t.rows[0])
            .unwrap()
            .unwrap();

        let RecordPayload::Transaction(tx) = record.payload else {
            panic!("expected a transaction");
        };
        let date = NaiveDate::from_ymd_opt(2024, 2, 15).unwrap();
        assert_eq!(tx.date, date);
        assert_eq!(tx.value.value_date, date);
        assert_eq!(tx.value.amount.as_str(), "1500.50");
        assert_eq!(tx.value.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn test_invalid_optional_value_becomes_issue() {
        let t = table(
            "iati_identifier,reporting_org_ref,sector_code,vocabulary,percentage\n\
             AC-1,XM-DAC-1,14030,77,250\n",
        );
        let record = validator(FileType::ActivitySectors, &t)
            .validate(&t.rows[0])
            .unwrap()
            .unwrap();

        assert_eq!(record.issues.len(), 2);
        assert_eq!(record.issues[0].column, "vocabulary");
        assert_eq!(record.issues[1].column, "percentage");
        let RecordPayload::Sector(sector) = record.payload else {
            panic!("expected a sector");
        };
        assert_eq!(sector.vocabulary, "1");
        assert_eq!(sector.percentage, None);
    }

    #[test]
    fn test_budget_period_order() {
        let t = table(
            "iati_identifier,reporting_org_ref,period_start,period_end,value\n\
             AC-1,XM-DAC-1,2024-12-31,2024-01-01,10\n",
        );
        let err = validator(FileType::ActivityBudgets, &t)
            .validate(&t.rows[0])
            .unwrap_err();
        assert_eq!(err.column.as_deref(), Some("period_end"));
    }

    #[test]
    fn test_participating_org_needs_ref_or_name() {
        let t = table("iati_identifier,reporting_org_ref,org_role,org_ref,org_name\nAC-1,XM-DAC-1,1,,\n");
        assert!(validator(FileType::ActivityParticipatingOrgs, &t)
            .validate(&t.rows[0])
            .is_err());
    }

    #[test]
    fn test_organisation_budget_targets() {
        let t = table(
            "organisation_identifier,reporting_org_ref,budget_kind,period_start,period_end,value,recipient_country_code\n\
             XM-DAC-1,XM-DAC-1,recipient-country-budget,2024-01-01,2024-12-31,500,ke\n\
             XM-DAC-1,XM-DAC-1,recipient-region-budget,2024-01-01,2024-12-31,500,\n",
        );
        let v = validator(FileType::OrganisationBudgets, &t);

        let record = v.validate(&t.rows[0]).unwrap().unwrap();
        let RecordPayload::OrganisationBudget(budget) = record.payload else {
            panic!("expected an organisation budget");
        };
        assert_eq!(
            budget.target,
            BudgetTarget::RecipientCountryBudget { country_code: "KE".into() }
        );

        let err = v.validate(&t.rows[1]).unwrap_err();
        assert_eq!(err.column.as_deref(), Some("recipient_region_code"));
    }

    #[test]
    fn test_organisation_budget_row_with_line() {
        let t = table(
            "organisation_identifier,reporting_org_ref,budget_kind,period_start,period_end,value,currency,line_ref,line_value,line_narrative,line_narrative_lang\n\
             XM-DAC-1,XM-DAC-1,total-budget,2024-01-01,2024-12-31,1000,EUR,L-1,400,Salaries,EN\n\
             XM-DAC-1,XM-DAC-1,total-budget,2024-01-01,2024-12-31,1000,EUR,,,,\n\
             XM-DAC-1,XM-DAC-1,total-budget,2024-01-01,2024-12-31,1000,EUR,L-2,,Rent,\n",
        );
        let v = validator(FileType::OrganisationBudgets, &t);

        let record = v.validate(&t.rows[0]).unwrap().unwrap();
        let RecordPayload::OrganisationBudget(budget) = record.payload else {
            panic!("expected an organisation budget");
        };
        assert_eq!(budget.status, "2");
        assert_eq!(budget.lines.len(), 1);
        let line = &budget.lines[0];
        assert_eq!(line.reference.as_deref(), Some("L-1"));
        assert_eq!(line.value.amount.as_str(), "400");
        assert_eq!(line.value.currency.as_deref(), Some("EUR"));
        assert_eq!(line.value.value_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(line.narrative, Some(Narrative::new("Salaries").with_lang(Some("en".into()))));

        let RecordPayload::OrganisationBudget(plain) = v.validate(&t.rows[1]).unwrap().unwrap().payload else {
            panic!("expected an organisation budget");
        };
        assert!(plain.lines.is_empty());

        let err = v.validate(&t.rows[2]).unwrap_err();
        assert_eq!(err.column.as_deref(), Some("line_value"));
    }

    #[test]
    fn test_expenditure_row_with_line() {
        let t = table(
            "organisation_identifier,reporting_org_ref,period_start,period_end,value,line_ref,line_value,line_currency\n\
             XM-DAC-1,XM-DAC-1,2023-01-01,2023-12-31,900,E-1,300,GBP\n",
        );
        let record = validator(FileType::OrganisationExpenditures, &t)
            .validate(&t.rows[0])
            .unwrap()
            .unwrap();
        let RecordPayload::Expenditure(expenditure) = record.payload else {
            panic!("expected an expenditure");
        };
        assert_eq!(expenditure.lines[0].value.currency.as_deref(), Some("GBP"));
        assert_eq!(expenditure.value.currency, None);
    }

    #[test]
    fn test_transaction_sector_row() {
        let t = table("iati_identifier,reporting_org_ref,transaction_ref,sector_code\nAC-1,XM-DAC-1,TX-1,14030\n");
        let record = validator(FileType::ActivityTransactionSectors, &t)
            .validate(&t.rows[0])
            .unwrap()
            .unwrap();
        assert_eq!(
            record.payload,
            RecordPayload::TransactionSector(TransactionSector {
                transaction_ref: "TX-1".into(),
                sector: Sector {
                    code: "14030".into(),
                    vocabulary: "1".into(),
                    percentage: None,
                },
            })
        );
    }

    #[test]
    fn test_location_row() {
        let t = table(
            "iati_identifier,reporting_org_ref,location_ref,location_reach,name,latitude,longitude,administrative_code,administrative_vocabulary,administrative_level,exactness,language\n\
             AC-1,XM-DAC-1,LOC-1,1,Nairobi,-1.2921,36.8219,KE-30,G1,1,1,en\n\
             AC-1,XM-DAC-1,LOC-2,,,-1.2921,,,,,,\n\
             AC-1,XM-DAC-1,LOC-3,,,,,,,,,\n",
        );
        let v = validator(FileType::ActivityLocations, &t);

        let RecordPayload::Location(location) = v.validate(&t.rows[0]).unwrap().unwrap().payload else {
            panic!("expected a location");
        };
        assert_eq!(location.reference.as_deref(), Some("LOC-1"));
        assert_eq!(location.name, Some(Narrative::new("Nairobi").with_lang(Some("en".into()))));
        assert_eq!(location.point.unwrap().pos(), "-1.2921 36.8219");
        let admin = location.administrative.unwrap();
        assert_eq!(admin.code, "KE-30");
        assert_eq!(admin.level.as_deref(), Some("1"));

        assert_eq!(v.validate(&t.rows[1]).unwrap_err().column.as_deref(), Some("longitude"));
        assert_eq!(v.validate(&t.rows[2]).unwrap_err().column.as_deref(), Some("name"));
    }

    #[test]
    fn test_contact_info_row() {
        let t = table(
            "iati_identifier,reporting_org_ref,contact_type,organisation,person_name,email,website\n\
             AC-1,XM-DAC-1,1,Ministry,A. Person,info@example.org,https://example.org\n\
             AC-1,XM-DAC-1,1,,,not-an-email,\n",
        );
        let v = validator(FileType::ActivityContactInfo, &t);

        let RecordPayload::ContactInfo(contact) = v.validate(&t.rows[0]).unwrap().unwrap().payload else {
            panic!("expected contact info");
        };
        assert_eq!(contact.contact_type.as_deref(), Some("1"));
        assert_eq!(contact.organisation, Some(Narrative::new("Ministry")));
        assert_eq!(contact.email.as_deref(), Some("info@example.org"));

        // the invalid email is dropped, leaving nothing to contact
        let err = v.validate(&t.rows[1]).unwrap_err();
        assert!(err.reason.contains("contact row has no"));
    }

    #[test]
    fn test_validate_row_without_table() {
        let mut fields = IndexMap::new();
        fields.insert("iati_identifier".to_string(), "AC-1".to_string());
        fields.insert("reporting_org_ref".to_string(), "XM-DAC-1".to_string());
        fields.insert("title".to_string(), "Water".to_string());
        let row = CsvRow { line: 4, fields };

        let err = validate_row("names.csv", &row, FileType::ActivityNames, &Namespace::default()).unwrap_err();
        assert_eq!(err.row, 4);
        assert_eq!(err.column.as_deref(), Some("language"));
    }

    #[test]
    fn test_missing_headers() {
        let headers = vec!["iati_identifier".to_string(), "Reporting Org Ref".to_string()];
        assert_eq!(
            missing_headers(FileType::ActivityDates, &headers),
            vec!["date_type", "iso_date"]
        );
    }
}
