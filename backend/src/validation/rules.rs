//! Column rulesets and field coercion.
//!
//! Every [`FileType`] maps to one static [`Ruleset`]: the key columns of its
//! document followed by the columns specific to the file type.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::codelists::{self, CodeList};
use crate::models::{Amount, DocumentKind, FileType};

/// Longest identifier accepted in key columns.
pub const IDENTIFIER_MAX_LEN: usize = 255;

static LANGUAGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z]{2}$").unwrap());
static CURRENCY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{3}$").unwrap());
static COUNTRY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{2}$").unwrap());
static MIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9!#$&^_.+-]*/[a-z0-9][a-z0-9!#$&^_.+-]*$").unwrap());
static DOCUMENT_CATEGORY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[AB][0-9]{2}$").unwrap());
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

// =============================================================================
// Field Kinds
// =============================================================================

/// How a cell value is checked and normalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Identifier,
    Text { max_len: Option<usize> },
    Date,
    Amount,
    Percentage,
    Code(CodeList),
    Language,
    Currency,
    Country,
    Url,
    MimeType,
    DocumentCategory,
    Email,
    Latitude,
    Longitude,
}

/// A coerced cell value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
    Amount(Amount),
}

impl FieldKind {
    /// Coerce a trimmed, non-blank cell value.
    pub fn coerce(&self, value: &str) -> Result<FieldValue, String> {
        match self {
            Self::Identifier => {
                if value.chars().any(char::is_whitespace) {
                    Err(format!("identifier '{}' must not contain whitespace", value))
                } else if value.chars().count() > IDENTIFIER_MAX_LEN {
                    Err(format!("identifier is longer than {} characters", IDENTIFIER_MAX_LEN))
                } else {
                    Ok(FieldValue::Text(value.to_string()))
                }
            }
            Self::Text { max_len } => match max_len {
                Some(max) if value.chars().count() > *max => {
                    Err(format!("value is longer than {} characters", max))
                }
                _ => Ok(FieldValue::Text(value.to_string())),
            },
            Self::Date => parse_date(value).map(FieldValue::Date),
            Self::Amount => Amount::parse(value).map(FieldValue::Amount),
            Self::Percentage => {
                let amount = Amount::parse(value)?;
                match amount.as_str().parse::<f64>() {
                    Ok(p) if (0.0..=100.0).contains(&p) => Ok(FieldValue::Amount(amount)),
                    _ => Err(format!("percentage '{}' must be between 0 and 100", value)),
                }
            }
            Self::Code(list) => {
                if list.contains(value) {
                    Ok(FieldValue::Text(value.to_string()))
                } else {
                    Err(format!("'{}' is not a valid {} code", value, list.name))
                }
            }
            Self::Language => {
                let lang = value.to_lowercase();
                if LANGUAGE_RE.is_match(&lang) {
                    Ok(FieldValue::Text(lang))
                } else {
                    Err(format!("'{}' is not an ISO 639-1 language code", value))
                }
            }
            Self::Currency => {
                let currency = value.to_uppercase();
                if CURRENCY_RE.is_match(&currency) {
                    Ok(FieldValue::Text(currency))
                } else {
                    Err(format!("'{}' is not an ISO 4217 currency code", value))
                }
            }
            Self::Country => {
                let country = value.to_uppercase();
                if COUNTRY_RE.is_match(&country) {
                    Ok(FieldValue::Text(country))
                } else {
                    Err(format!("'{}' is not an ISO 3166-1 country code", value))
                }
            }
            Self::Url => {
                let has_scheme = value.starts_with("http://") || value.starts_with("https://");
                let has_host = value.splitn(2, "://").nth(1).map_or(false, |rest| !rest.is_empty());
                if has_scheme && has_host && !value.chars().any(char::is_whitespace) {
                    Ok(FieldValue::Text(value.to_string()))
                } else {
                    Err(format!("'{}' is not an http(s) URL", value))
                }
            }
            Self::MimeType => {
                let mime = value.to_lowercase();
                if MIME_RE.is_match(&mime) {
                    Ok(FieldValue::Text(mime))
                } else {
                    Err(format!("'{}' is not a MIME type", value))
                }
            }
            Self::DocumentCategory => {
                let category = value.to_uppercase();
                if DOCUMENT_CATEGORY_RE.is_match(&category) {
                    Ok(FieldValue::Text(category))
                } else {
                    Err(format!("'{}' is not a document category code", value))
                }
            }
            Self::Email => {
                if EMAIL_RE.is_match(value) {
                    Ok(FieldValue::Text(value.to_string()))
                } else {
                    Err(format!("'{}' is not an email address", value))
                }
            }
            Self::Latitude => coordinate(value, 90.0).map(FieldValue::Text),
            Self::Longitude => coordinate(value, 180.0).map(FieldValue::Text),
        }
    }
}

/// Decimal degrees within `-bound..=bound`, in canonical decimal text.
fn coordinate(value: &str, bound: f64) -> Result<String, String> {
    let amount = Amount::parse(value)?;
    match amount.as_str().parse::<f64>() {
        Ok(degrees) if (-bound..=bound).contains(&degrees) => Ok(amount.as_str().to_string()),
        _ => Err(format!("'{}' must be between -{} and {} degrees", value, bound, bound)),
    }
}

/// Parse `YYYY-MM-DD`, ignoring a trailing `T...` time part.
pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    let date_part = match value.find('T') {
        Some(idx) => &value[..idx],
        None => value,
    };

    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|_| format!("'{}' is not an ISO date (YYYY-MM-DD)", value))
}

// =============================================================================
// Rulesets
// =============================================================================

/// One expected column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRule {
    /// Normalised header name.
    pub name: &'static str,
    pub required: bool,
    pub kind: FieldKind,
    /// Value used when an optional cell is blank.
    pub default: Option<&'static str>,
}

impl ColumnRule {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            required: true,
            kind,
            default: None,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            required: false,
            kind,
            default: None,
        }
    }

    pub const fn or(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }
}

/// Column schema of one file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ruleset {
    pub file_type: FileType,
    /// Columns beyond the document's key columns.
    pub columns: &'static [ColumnRule],
}

impl Ruleset {
    /// Key columns shared by every file type of the document.
    pub fn key_columns(&self) -> &'static [ColumnRule] {
        match self.file_type.document() {
            DocumentKind::Activities => ACTIVITY_KEY,
            DocumentKind::Organisations => ORGANISATION_KEY,
        }
    }

    /// Column holding the aggregate identifier.
    pub fn identifier_column(&self) -> &'static str {
        self.key_columns()[0].name
    }

    pub fn all_columns(&self) -> impl Iterator<Item = &'static ColumnRule> {
        self.key_columns().iter().chain(self.columns.iter())
    }

    pub fn required_columns(&self) -> impl Iterator<Item = &'static ColumnRule> {
        self.all_columns().filter(|c| c.required)
    }

    pub fn column(&self, name: &str) -> Option<&'static ColumnRule> {
        self.all_columns().find(|c| c.name == name)
    }
}

/// Normalise a CSV header for matching against rule names.
pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Ruleset for a file type.
pub fn ruleset(file_type: FileType) -> &'static Ruleset {
    match file_type {
        FileType::OrganisationMain => &ORGANISATION_MAIN,
        FileType::OrganisationNames => &ORGANISATION_NAMES,
        FileType::OrganisationBudgets => &ORGANISATION_BUDGETS,
        FileType::OrganisationExpenditures => &ORGANISATION_EXPENDITURES,
        FileType::OrganisationDocuments => &ORGANISATION_DOCUMENTS,
        FileType::ActivityMain => &ACTIVITY_MAIN,
        FileType::ActivityNames => &ACTIVITY_NAMES,
        FileType::ActivityParticipatingOrgs => &ACTIVITY_PARTICIPATING_ORGS,
        FileType::ActivitySectors => &ACTIVITY_SECTORS,
        FileType::ActivityBudgets => &ACTIVITY_BUDGETS,
        FileType::ActivityTransactions => &ACTIVITY_TRANSACTIONS,
        FileType::ActivityTransactionSectors => &ACTIVITY_TRANSACTION_SECTORS,
        FileType::ActivityLocations => &ACTIVITY_LOCATIONS,
        FileType::ActivityContactInfo => &ACTIVITY_CONTACT_INFO,
        FileType::ActivityDocuments => &ACTIVITY_DOCUMENTS,
        FileType::ActivityDates => &ACTIVITY_DATES,
        FileType::ActivityDescriptions => &ACTIVITY_DESCRIPTIONS,
    }
}

const TEXT: FieldKind = FieldKind::Text { max_len: None };

const ACTIVITY_KEY: &[ColumnRule] = &[
    ColumnRule::required("iati_identifier", FieldKind::Identifier),
    ColumnRule::required("reporting_org_ref", FieldKind::Identifier),
];

const ORGANISATION_KEY: &[ColumnRule] = &[
    ColumnRule::required("organisation_identifier", FieldKind::Identifier),
    ColumnRule::required("reporting_org_ref", FieldKind::Identifier),
];

const DOCUMENT_COLUMNS: &[ColumnRule] = &[
    ColumnRule::required("url", FieldKind::Url),
    ColumnRule::required("title", TEXT),
    ColumnRule::required("category_code", FieldKind::DocumentCategory),
    ColumnRule::optional("format", FieldKind::MimeType).or("text/html"),
    ColumnRule::optional("language", FieldKind::Language),
    ColumnRule::optional("document_date", FieldKind::Date),
];

static ACTIVITY_MAIN: Ruleset = Ruleset {
    file_type: FileType::ActivityMain,
    columns: &[
        ColumnRule::required("reporting_org_type", FieldKind::Code(codelists::ORGANISATION_TYPE)),
        ColumnRule::required("reporting_org_name", TEXT),
        ColumnRule::required("title", TEXT),
        ColumnRule::optional("description", TEXT),
        ColumnRule::optional("activity_status", FieldKind::Code(codelists::ACTIVITY_STATUS)),
        ColumnRule::optional("default_currency", FieldKind::Currency),
        ColumnRule::optional("default_language", FieldKind::Language),
    ],
};

static ACTIVITY_NAMES: Ruleset = Ruleset {
    file_type: FileType::ActivityNames,
    columns: &[
        ColumnRule::required("language", FieldKind::Language),
        ColumnRule::required("title", TEXT),
    ],
};

static ACTIVITY_DESCRIPTIONS: Ruleset = Ruleset {
    file_type: FileType::ActivityDescriptions,
    columns: &[
        ColumnRule::required("description", TEXT),
        ColumnRule::optional("description_type", FieldKind::Code(codelists::DESCRIPTION_TYPE)).or("1"),
        ColumnRule::optional("language", FieldKind::Language),
    ],
};

static ACTIVITY_PARTICIPATING_ORGS: Ruleset = Ruleset {
    file_type: FileType::ActivityParticipatingOrgs,
    columns: &[
        ColumnRule::required("org_role", FieldKind::Code(codelists::ORGANISATION_ROLE)),
        ColumnRule::optional("org_ref", FieldKind::Identifier),
        ColumnRule::optional("org_type", FieldKind::Code(codelists::ORGANISATION_TYPE)),
        ColumnRule::optional("org_name", TEXT),
    ],
};

static ACTIVITY_SECTORS: Ruleset = Ruleset {
    file_type: FileType::ActivitySectors,
    columns: &[
        ColumnRule::required("sector_code", FieldKind::Text { max_len: Some(20) }),
        ColumnRule::optional("vocabulary", FieldKind::Code(codelists::SECTOR_VOCABULARY)).or("1"),
        ColumnRule::optional("percentage", FieldKind::Percentage),
    ],
};

static ACTIVITY_BUDGETS: Ruleset = Ruleset {
    file_type: FileType::ActivityBudgets,
    columns: &[
        ColumnRule::required("period_start", FieldKind::Date),
        ColumnRule::required("period_end", FieldKind::Date),
        ColumnRule::required("value", FieldKind::Amount),
        ColumnRule::optional("budget_type", FieldKind::Code(codelists::BUDGET_TYPE)).or("1"),
        ColumnRule::optional("budget_status", FieldKind::Code(codelists::BUDGET_STATUS)).or("1"),
        ColumnRule::optional("currency", FieldKind::Currency),
        ColumnRule::optional("value_date", FieldKind::Date),
    ],
};

static ACTIVITY_TRANSACTIONS: Ruleset = Ruleset {
    file_type: FileType::ActivityTransactions,
    columns: &[
        ColumnRule::required("transaction_type", FieldKind::Code(codelists::TRANSACTION_TYPE)),
        ColumnRule::required("transaction_date", FieldKind::Date),
        ColumnRule::required("value", FieldKind::Amount),
        ColumnRule::optional("transaction_ref", TEXT),
        ColumnRule::optional("currency", FieldKind::Currency),
        ColumnRule::optional("value_date", FieldKind::Date),
        ColumnRule::optional("description", TEXT),
    ],
};

static ACTIVITY_TRANSACTION_SECTORS: Ruleset = Ruleset {
    file_type: FileType::ActivityTransactionSectors,
    columns: &[
        ColumnRule::required("transaction_ref", TEXT),
        ColumnRule::required("sector_code", FieldKind::Text { max_len: Some(20) }),
        ColumnRule::optional("vocabulary", FieldKind::Code(codelists::SECTOR_VOCABULARY)).or("1"),
    ],
};

static ACTIVITY_LOCATIONS: Ruleset = Ruleset {
    file_type: FileType::ActivityLocations,
    columns: &[
        ColumnRule::optional("location_ref", TEXT),
        ColumnRule::optional("location_reach", FieldKind::Code(codelists::GEOGRAPHIC_LOCATION_REACH)),
        ColumnRule::optional("location_id_code", FieldKind::Text { max_len: Some(50) }),
        ColumnRule::optional("location_id_vocabulary", FieldKind::Code(codelists::GEOGRAPHIC_VOCABULARY)),
        ColumnRule::optional("name", TEXT),
        ColumnRule::optional("description", TEXT),
        ColumnRule::optional("activity_description", TEXT),
        ColumnRule::optional("administrative_code", FieldKind::Text { max_len: Some(50) }),
        ColumnRule::optional("administrative_vocabulary", FieldKind::Code(codelists::GEOGRAPHIC_VOCABULARY)),
        ColumnRule::optional("administrative_level", FieldKind::Text { max_len: Some(2) }),
        ColumnRule::optional("latitude", FieldKind::Latitude),
        ColumnRule::optional("longitude", FieldKind::Longitude),
        ColumnRule::optional("exactness", FieldKind::Code(codelists::GEOGRAPHIC_EXACTNESS)),
        ColumnRule::optional("location_class", FieldKind::Code(codelists::GEOGRAPHIC_LOCATION_CLASS)),
        ColumnRule::optional("feature_designation", FieldKind::Text { max_len: Some(5) }),
        ColumnRule::optional("language", FieldKind::Language),
    ],
};

static ACTIVITY_CONTACT_INFO: Ruleset = Ruleset {
    file_type: FileType::ActivityContactInfo,
    columns: &[
        ColumnRule::optional("contact_type", FieldKind::Code(codelists::CONTACT_TYPE)),
        ColumnRule::optional("organisation", TEXT),
        ColumnRule::optional("department", TEXT),
        ColumnRule::optional("person_name", TEXT),
        ColumnRule::optional("job_title", TEXT),
        ColumnRule::optional("telephone", FieldKind::Text { max_len: Some(50) }),
        ColumnRule::optional("email", FieldKind::Email),
        ColumnRule::optional("website", FieldKind::Url),
        ColumnRule::optional("mailing_address", TEXT),
        ColumnRule::optional("language", FieldKind::Language),
    ],
};

static ACTIVITY_DOCUMENTS: Ruleset = Ruleset {
    file_type: FileType::ActivityDocuments,
    columns: DOCUMENT_COLUMNS,
};

static ACTIVITY_DATES: Ruleset = Ruleset {
    file_type: FileType::ActivityDates,
    columns: &[
        ColumnRule::required("date_type", FieldKind::Code(codelists::ACTIVITY_DATE_TYPE)),
        ColumnRule::required("iso_date", FieldKind::Date),
    ],
};

/// Optional `budget-line` / `expense-line` columns of organisation budgets
/// and expenditures.
const LINE_COLUMNS: [ColumnRule; 6] = [
    ColumnRule::optional("line_ref", TEXT),
    ColumnRule::optional("line_value", FieldKind::Amount),
    ColumnRule::optional("line_currency", FieldKind::Currency),
    ColumnRule::optional("line_value_date", FieldKind::Date),
    ColumnRule::optional("line_narrative", TEXT),
    ColumnRule::optional("line_narrative_lang", FieldKind::Language),
];

static ORGANISATION_MAIN: Ruleset = Ruleset {
    file_type: FileType::OrganisationMain,
    columns: &[
        ColumnRule::required("name", TEXT),
        ColumnRule::required("reporting_org_type", FieldKind::Code(codelists::ORGANISATION_TYPE)),
        ColumnRule::optional("reporting_org_name", TEXT),
        ColumnRule::optional("default_currency", FieldKind::Currency),
        ColumnRule::optional("default_language", FieldKind::Language),
    ],
};

static ORGANISATION_NAMES: Ruleset = Ruleset {
    file_type: FileType::OrganisationNames,
    columns: &[
        ColumnRule::required("language", FieldKind::Language),
        ColumnRule::required("name", TEXT),
    ],
};

static ORGANISATION_BUDGETS: Ruleset = Ruleset {
    file_type: FileType::OrganisationBudgets,
    columns: &[
        ColumnRule::required("budget_kind", FieldKind::Code(codelists::ORGANISATION_BUDGET_KIND)),
        ColumnRule::required("period_start", FieldKind::Date),
        ColumnRule::required("period_end", FieldKind::Date),
        ColumnRule::required("value", FieldKind::Amount),
        ColumnRule::optional("budget_status", FieldKind::Code(codelists::BUDGET_STATUS)).or("2"),
        ColumnRule::optional("currency", FieldKind::Currency),
        ColumnRule::optional("value_date", FieldKind::Date),
        ColumnRule::optional("recipient_org_ref", FieldKind::Identifier),
        ColumnRule::optional("recipient_org_name", TEXT),
        ColumnRule::optional("recipient_country_code", FieldKind::Country),
        ColumnRule::optional("recipient_region_code", FieldKind::Text { max_len: Some(20) }),
        ColumnRule::optional("recipient_region_vocabulary", FieldKind::Code(codelists::REGION_VOCABULARY)).or("1"),
        LINE_COLUMNS[0],
        LINE_COLUMNS[1],
        LINE_COLUMNS[2],
        LINE_COLUMNS[3],
        LINE_COLUMNS[4],
        LINE_COLUMNS[5],
    ],
};

static ORGANISATION_EXPENDITURES: Ruleset = Ruleset {
    file_type: FileType::OrganisationExpenditures,
    columns: &[
        ColumnRule::required("period_start", FieldKind::Date),
        ColumnRule::required("period_end", FieldKind::Date),
        ColumnRule::required("value", FieldKind::Amount),
        ColumnRule::optional("currency", FieldKind::Currency),
        ColumnRule::optional("value_date", FieldKind::Date),
        LINE_COLUMNS[0],
        LINE_COLUMNS[1],
        LINE_COLUMNS[2],
        LINE_COLUMNS[3],
        LINE_COLUMNS[4],
        LINE_COLUMNS[5],
    ],
};

static ORGANISATION_DOCUMENTS: Ruleset = Ruleset {
    file_type: FileType::OrganisationDocuments,
    columns: DOCUMENT_COLUMNS,
};
