//! Domain models for the IATI generation pipeline.
//!
//! - [`FileType`] / [`DocumentKind`] - resource roles and output documents
//! - [`Namespace`] / [`RecordKey`] - grouping and uniqueness keys
//! - [`Activity`] - assembled unit of the `iati-activities` document
//! - [`Organisation`] - assembled unit of the `iati-organisations` document
//! - child elements: [`Narrative`], [`Transaction`], [`Budget`], [`DocumentLink`], ...

pub mod codelists;
mod file_type;
mod namespace;

pub use file_type::{DocumentKind, FileType, UNSUPPORTED_FILE_TYPES};
pub use namespace::{Namespace, RecordKey, NAMESPACE_MAX_LEN};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// =============================================================================
// Scalars
// =============================================================================

/// A monetary amount in canonical decimal text (`-?digits[.digits]`).
///
/// Kept as text so the XML carries exactly what was validated, with no
/// float rounding or locale formatting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(String);

impl Amount {
    /// Parse a raw cell value. A leading `+` is dropped; `,` is rejected
    /// because it is ambiguous between thousands and decimal separators.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let value = raw.trim();
        let value = value.strip_prefix('+').unwrap_or(value);

        if value.contains(',') {
            return Err(format!("'{}' is not a valid amount (use '.' as decimal separator, no thousands separator)", raw.trim()));
        }

        let digits = value.strip_prefix('-').unwrap_or(value);
        let mut parts = digits.splitn(2, '.');
        let int_part = parts.next().unwrap_or("");
        let frac_part = parts.next();

        let int_ok = !int_part.is_empty() && int_part.chars().all(|c| c.is_ascii_digit());
        let frac_ok = frac_part.map_or(true, |f| !f.is_empty() && f.chars().all(|c| c.is_ascii_digit()));

        if int_ok && frac_ok {
            Ok(Self(value.to_string()))
        } else {
            Err(format!("'{}' is not a valid amount", raw.trim()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Shared Elements
// =============================================================================

/// Free text with an optional ISO 639-1 language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Narrative {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl Narrative {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), lang: None }
    }

    pub fn with_lang(mut self, lang: Option<String>) -> Self {
        self.lang = lang;
        self
    }
}

/// The organisation publishing an activity or organisation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportingOrg {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ReportingOrg {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            org_type: None,
            name: None,
        }
    }
}

/// A `value` element: amount, currency and value date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonetaryValue {
    pub amount: Amount,
    /// Falls back to the aggregate's default currency when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub value_date: NaiveDate,
}

/// Link to an external document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLink {
    pub url: String,
    pub format: String,
    pub title: Narrative,
    pub category_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_date: Option<NaiveDate>,
}

// =============================================================================
// Activity Elements
// =============================================================================

/// A typed `description` element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Description {
    /// DescriptionType code.
    pub description_type: String,
    pub narrative: Narrative,
}

/// An organisation taking part in an activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipatingOrg {
    /// OrganisationRole code.
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sector {
    pub code: String,
    pub vocabulary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDate {
    /// ActivityDateType code.
    pub date_type: String,
    pub iso_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub budget_type: String,
    pub status: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub value: MonetaryValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// TransactionType code.
    pub transaction_type: String,
    pub date: NaiveDate,
    pub value: MonetaryValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Narrative>,
    /// Sectors attributed to this transaction alone.
    #[serde(default)]
    pub sectors: Vec<Sector>,
}

/// A code qualified by the vocabulary it comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyCode {
    pub code: String,
    pub vocabulary: String,
}

/// An administrative area a location belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Administrative {
    pub code: String,
    pub vocabulary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

/// WGS84 coordinates, in decimal degrees as validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub latitude: String,
    pub longitude: String,
}

impl Point {
    /// `pos` text: latitude then longitude.
    pub fn pos(&self) -> String {
        format!("{} {}", self.latitude, self.longitude)
    }
}

/// A sub-national location of an activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// GeographicLocationReach code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reach: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<VocabularyCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Narrative>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Narrative>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_description: Option<Narrative>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub administrative: Option<Administrative>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exactness: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_designation: Option<String>,
}

/// A `contact-info` element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    /// ContactType code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organisation: Option<Narrative>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<Narrative>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_name: Option<Narrative>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<Narrative>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telephone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mailing_address: Option<Narrative>,
}

// =============================================================================
// Activity
// =============================================================================

/// One reportable activity, assembled from every row sharing its key.
///
/// Scalar fields are set by the first record that carries them; list fields
/// only ever grow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub namespace: Namespace,
    pub identifier: String,
    pub reporting_org: ReportingOrg,
    /// Title in the default language, from the main file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<Narrative>,
    /// Additional title narratives, from the activity-names file.
    #[serde(default)]
    pub names: Vec<Narrative>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_language: Option<String>,
    #[serde(default)]
    pub descriptions: Vec<Description>,
    #[serde(default)]
    pub participating_orgs: Vec<ParticipatingOrg>,
    #[serde(default)]
    pub dates: Vec<ActivityDate>,
    #[serde(default)]
    pub contacts: Vec<ContactInfo>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub sectors: Vec<Sector>,
    #[serde(default)]
    pub budgets: Vec<Budget>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub documents: Vec<DocumentLink>,
}

impl Activity {
    /// Create an activity with only its key populated.
    pub fn new(key: &RecordKey) -> Self {
        Self {
            namespace: key.namespace.clone(),
            identifier: key.identifier.clone(),
            reporting_org: ReportingOrg::new(key.reporting_org.clone()),
            title: None,
            names: Vec::new(),
            activity_status: None,
            default_currency: None,
            default_language: None,
            descriptions: Vec::new(),
            participating_orgs: Vec::new(),
            dates: Vec::new(),
            contacts: Vec::new(),
            locations: Vec::new(),
            sectors: Vec::new(),
            budgets: Vec::new(),
            transactions: Vec::new(),
            documents: Vec::new(),
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(
            self.namespace.clone(),
            self.reporting_org.reference.clone(),
            self.identifier.clone(),
        )
    }

    /// All title narratives: the main title first, then translations.
    pub fn title_narratives(&self) -> impl Iterator<Item = &Narrative> {
        self.title.iter().chain(self.names.iter())
    }

    /// Mandatory IATI fields this activity does not populate yet.
    pub fn missing_mandatory_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.title_narratives().next().is_none() {
            missing.push("title");
        }
        if self.reporting_org.org_type.is_none() {
            missing.push("reporting_org_type");
        }
        if self.reporting_org.name.is_none() {
            missing.push("reporting_org_name");
        }
        missing
    }
}

// =============================================================================
// Organisation Elements
// =============================================================================

/// What an organisation budget is allocated to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BudgetTarget {
    TotalBudget,
    RecipientOrgBudget {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        org_ref: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    RecipientCountryBudget {
        country_code: String,
    },
    RecipientRegionBudget {
        region_code: String,
        vocabulary: String,
    },
}

impl BudgetTarget {
    /// XML element name for a budget of this kind.
    pub fn element_name(&self) -> &'static str {
        match self {
            Self::TotalBudget => "total-budget",
            Self::RecipientOrgBudget { .. } => "recipient-org-budget",
            Self::RecipientCountryBudget { .. } => "recipient-country-budget",
            Self::RecipientRegionBudget { .. } => "recipient-region-budget",
        }
    }

    /// Position in the organisation schema's element order.
    pub fn schema_order(&self) -> u8 {
        match self {
            Self::TotalBudget => 0,
            Self::RecipientOrgBudget { .. } => 1,
            Self::RecipientRegionBudget { .. } => 2,
            Self::RecipientCountryBudget { .. } => 3,
        }
    }
}

/// A breakdown line of an organisation budget (`budget-line`) or
/// expenditure (`expense-line`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLine {
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub value: MonetaryValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<Narrative>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganisationBudget {
    pub target: BudgetTarget,
    pub status: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub value: MonetaryValue,
    #[serde(default)]
    pub lines: Vec<BudgetLine>,
}

impl OrganisationBudget {
    /// Rows describing the same budget share target and period.
    pub fn same_budget(&self, other: &OrganisationBudget) -> bool {
        self.target == other.target && self.period_start == other.period_start && self.period_end == other.period_end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expenditure {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub value: MonetaryValue,
    #[serde(default)]
    pub lines: Vec<BudgetLine>,
}

impl Expenditure {
    pub fn same_period(&self, other: &Expenditure) -> bool {
        self.period_start == other.period_start && self.period_end == other.period_end
    }
}

// =============================================================================
// Organisation
// =============================================================================

/// One organisation record, assembled with the same merge policy as
/// [`Activity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organisation {
    pub namespace: Namespace,
    pub identifier: String,
    pub reporting_org: ReportingOrg,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Narrative>,
    /// Translated names, from the organisation-names file.
    #[serde(default)]
    pub names: Vec<Narrative>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_language: Option<String>,
    #[serde(default)]
    pub budgets: Vec<OrganisationBudget>,
    #[serde(default)]
    pub expenditures: Vec<Expenditure>,
    #[serde(default)]
    pub documents: Vec<DocumentLink>,
}

impl Organisation {
    pub fn new(key: &RecordKey) -> Self {
        Self {
            namespace: key.namespace.clone(),
            identifier: key.identifier.clone(),
            reporting_org: ReportingOrg::new(key.reporting_org.clone()),
            name: None,
            names: Vec::new(),
            default_currency: None,
            default_language: None,
            budgets: Vec::new(),
            expenditures: Vec::new(),
            documents: Vec::new(),
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(
            self.namespace.clone(),
            self.reporting_org.reference.clone(),
            self.identifier.clone(),
        )
    }

    pub fn name_narratives(&self) -> impl Iterator<Item = &Narrative> {
        self.name.iter().chain(self.names.iter())
    }

    pub fn missing_mandatory_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name_narratives().next().is_none() {
            missing.push("name");
        }
        if self.reporting_org.org_type.is_none() {
            missing.push("reporting_org_type");
        }
        missing
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_parse() {
        assert_eq!(Amount::parse("1000").unwrap().as_str(), "1000");
        assert_eq!(Amount::parse(" +12.50 ").unwrap().as_str(), "12.50");
        assert_eq!(Amount::parse("-3.1").unwrap().as_str(), "-3.1");
        assert!(Amount::parse("1,000.00").unwrap_err().contains("decimal separator"));
        assert!(Amount::parse("12.").is_err());
        assert!(Amount::parse(".5").is_err());
        assert!(Amount::parse("1e5").is_err());
        assert!(Amount::parse("abc").is_err());
    }

    #[test]
    fn test_new_activity_reports_missing_fields() {
        let key = RecordKey::new(Namespace::default(), "XM-DAC-1", "AC-1");
        let activity = Activity::new(&key);

        assert_eq!(activity.key(), key);
        assert_eq!(
            activity.missing_mandatory_fields(),
            vec!["title", "reporting_org_type", "reporting_org_name"]
        );
    }

    #[test]
    fn test_names_satisfy_title_requirement() {
        let key = RecordKey::new(Namespace::default(), "XM-DAC-1", "AC-1");
        let mut activity = Activity::new(&key);
        activity.names.push(Narrative::new("Eau").with_lang(Some("fr".into())));

        assert!(!activity.missing_mandatory_fields().contains(&"title"));
        assert_eq!(activity.title_narratives().count(), 1);
    }

    #[test]
    fn test_budget_target_element_names() {
        assert_eq!(BudgetTarget::TotalBudget.element_name(), "total-budget");
        let region = BudgetTarget::RecipientRegionBudget {
            region_code: "298".into(),
            vocabulary: "1".into(),
        };
        assert_eq!(region.element_name(), "recipient-region-budget");
        assert!(region.schema_order() > BudgetTarget::TotalBudget.schema_order());
    }

    #[test]
    fn test_budget_identity_ignores_value_and_lines() {
        let date = |m| NaiveDate::from_ymd_opt(2024, m, 1).unwrap();
        let value = |amount: &str| MonetaryValue {
            amount: Amount::parse(amount).unwrap(),
            currency: None,
            value_date: date(1),
        };
        let budget = OrganisationBudget {
            target: BudgetTarget::TotalBudget,
            status: "2".into(),
            period_start: date(1),
            period_end: date(12),
            value: value("100"),
            lines: Vec::new(),
        };
        let mut other = budget.clone();
        other.value = value("5");
        other.lines.push(BudgetLine {
            reference: Some("L-1".into()),
            value: value("5"),
            narrative: None,
        });
        assert!(budget.same_budget(&other));

        other.period_end = date(6);
        assert!(!budget.same_budget(&other));
    }

    #[test]
    fn test_point_pos_is_latitude_first() {
        let point = Point {
            latitude: "-1.2921".into(),
            longitude: "36.8219".into(),
        };
        assert_eq!(point.pos(), "-1.2921 36.8219");
    }

    #[test]
    fn test_activity_serialization() {
        let key = RecordKey::new(Namespace::default(), "XM-DAC-1", "AC-1");
        let activity = Activity::new(&key);
        let json = serde_json::to_value(&activity).unwrap();

        assert_eq!(json["identifier"], "AC-1");
        assert_eq!(json["reportingOrg"]["ref"], "XM-DAC-1");
        assert!(json.get("title").is_none());
    }
}
