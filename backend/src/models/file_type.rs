//! IATI file types: which column schema a resource follows and which
//! document its rows populate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::InputError;
use crate::models::Namespace;

// =============================================================================
// Document Kind
// =============================================================================

/// The two IATI XML documents this generator produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Activities,
    Organisations,
}

impl DocumentKind {
    /// Root element of the document.
    pub fn root_element(&self) -> &'static str {
        match self {
            Self::Activities => "iati-activities",
            Self::Organisations => "iati-organisations",
        }
    }

    /// Element wrapping one aggregate.
    pub fn record_element(&self) -> &'static str {
        match self {
            Self::Activities => "iati-activity",
            Self::Organisations => "iati-organisation",
        }
    }

    /// File type carrying the core fields of this document's records.
    pub fn main_file_type(&self) -> FileType {
        match self {
            Self::Activities => FileType::ActivityMain,
            Self::Organisations => FileType::OrganisationMain,
        }
    }

    /// Output file name; the default namespace gets the bare name.
    pub fn file_name(&self, namespace: &Namespace) -> String {
        if namespace.is_default() {
            format!("{}.xml", self.root_element())
        } else {
            format!("{}-{}.xml", self.root_element(), namespace.as_str())
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Activities => "activities",
            Self::Organisations => "organisations",
        })
    }
}

// =============================================================================
// File Type
// =============================================================================

/// Structural role of a CSV resource.
///
/// Fixed per resource by the host. Each variant selects a column ruleset
/// (see [`crate::validation::ruleset`]) and the document its rows feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileType {
    #[serde(alias = "organization-main")]
    OrganisationMain,
    #[serde(alias = "organization-names")]
    OrganisationNames,
    #[serde(alias = "organization-budgets")]
    OrganisationBudgets,
    #[serde(alias = "organization-expenditures")]
    OrganisationExpenditures,
    #[serde(alias = "organization-documents")]
    OrganisationDocuments,
    ActivityMain,
    ActivityNames,
    ActivityParticipatingOrgs,
    ActivitySectors,
    ActivityBudgets,
    ActivityTransactions,
    ActivityTransactionSectors,
    ActivityLocations,
    ActivityDocuments,
    ActivityDates,
    ActivityContactInfo,
    ActivityDescriptions,
}

impl FileType {
    pub const ALL: [FileType; 17] = [
        Self::OrganisationMain,
        Self::OrganisationNames,
        Self::OrganisationBudgets,
        Self::OrganisationExpenditures,
        Self::OrganisationDocuments,
        Self::ActivityMain,
        Self::ActivityNames,
        Self::ActivityParticipatingOrgs,
        Self::ActivitySectors,
        Self::ActivityBudgets,
        Self::ActivityTransactions,
        Self::ActivityTransactionSectors,
        Self::ActivityLocations,
        Self::ActivityDocuments,
        Self::ActivityDates,
        Self::ActivityContactInfo,
        Self::ActivityDescriptions,
    ];

    /// Kebab-case name, as used on the CLI and in JSON.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OrganisationMain => "organisation-main",
            Self::OrganisationNames => "organisation-names",
            Self::OrganisationBudgets => "organisation-budgets",
            Self::OrganisationExpenditures => "organisation-expenditures",
            Self::OrganisationDocuments => "organisation-documents",
            Self::ActivityMain => "activity-main",
            Self::ActivityNames => "activity-names",
            Self::ActivityParticipatingOrgs => "activity-participating-orgs",
            Self::ActivitySectors => "activity-sectors",
            Self::ActivityBudgets => "activity-budgets",
            Self::ActivityTransactions => "activity-transactions",
            Self::ActivityTransactionSectors => "activity-transaction-sectors",
            Self::ActivityLocations => "activity-locations",
            Self::ActivityContactInfo => "activity-contact-info",
            Self::ActivityDocuments => "activity-documents",
            Self::ActivityDates => "activity-dates",
            Self::ActivityDescriptions => "activity-descriptions",
        }
    }

    /// Numeric code stored by the host alongside each resource.
    pub fn code(&self) -> u16 {
        match self {
            Self::OrganisationMain => 100,
            Self::OrganisationNames => 110,
            Self::OrganisationBudgets => 120,
            Self::OrganisationExpenditures => 130,
            Self::OrganisationDocuments => 140,
            Self::ActivityMain => 200,
            Self::ActivityNames => 205,
            Self::ActivityParticipatingOrgs => 210,
            Self::ActivitySectors => 220,
            Self::ActivityBudgets => 230,
            Self::ActivityTransactions => 240,
            Self::ActivityTransactionSectors => 250,
            Self::ActivityLocations => 260,
            Self::ActivityContactInfo => 320,
            Self::ActivityDocuments => 270,
            Self::ActivityDates => 310,
            Self::ActivityDescriptions => 340,
        }
    }

    /// Conventional CSV file name for this role.
    pub fn csv_file_name(&self) -> &'static str {
        match self {
            Self::OrganisationMain => "organisations.csv",
            Self::OrganisationNames => "names.csv",
            Self::OrganisationBudgets => "budgets.csv",
            Self::OrganisationExpenditures => "expenditures.csv",
            Self::OrganisationDocuments => "documents.csv",
            Self::ActivityMain => "activities.csv",
            Self::ActivityNames => "activity_names.csv",
            Self::ActivityParticipatingOrgs => "participating_orgs.csv",
            Self::ActivitySectors => "sectors.csv",
            Self::ActivityBudgets => "budgets.csv",
            Self::ActivityTransactions => "transactions.csv",
            Self::ActivityTransactionSectors => "transaction_sectors.csv",
            Self::ActivityLocations => "locations.csv",
            Self::ActivityContactInfo => "contact_info.csv",
            Self::ActivityDocuments => "documents.csv",
            Self::ActivityDates => "activity_date.csv",
            Self::ActivityDescriptions => "descriptions.csv",
        }
    }

    /// Document populated by rows of this type.
    pub fn document(&self) -> DocumentKind {
        match self {
            Self::OrganisationMain
            | Self::OrganisationNames
            | Self::OrganisationBudgets
            | Self::OrganisationExpenditures
            | Self::OrganisationDocuments => DocumentKind::Organisations,
            _ => DocumentKind::Activities,
        }
    }

    /// Whether rows of this type carry the aggregate's core fields.
    pub fn is_main(&self) -> bool {
        matches!(self, Self::OrganisationMain | Self::ActivityMain)
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Resolve a file type from a conventional CSV file name.
    ///
    /// Names shared by both documents (`budgets.csv`, `documents.csv`)
    /// resolve to the activity variant.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let lower = file_name.trim().to_lowercase();
        let base = lower.rsplit(&['/', '\\'][..]).next().unwrap_or(&lower);

        Self::ALL
            .into_iter()
            .rev()
            .find(|t| t.csv_file_name() == base)
    }
}

/// Activity file types of the IATI CSV layout that are recognised but not
/// converted: `(code, conventional file name)`.
pub const UNSUPPORTED_FILE_TYPES: [(u16, &str); 5] = [
    (280, "results.csv"),
    (290, "indicators.csv"),
    (300, "indicator_periods.csv"),
    (330, "conditions.csv"),
    (350, "country_budget_items.csv"),
];

fn unsupported(normalized: &str) -> Option<InputError> {
    let base = normalized.rsplit(&['/', '\\'][..]).next().unwrap_or(normalized);
    let code = base.parse::<u16>().ok();
    UNSUPPORTED_FILE_TYPES
        .iter()
        .find(|(c, file_name)| code == Some(*c) || base == file_name.replace('_', "-"))
        .map(|(code, file_name)| InputError::UnsupportedFileType {
            code: *code,
            file_name: file_name.to_string(),
        })
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FileType {
    type Err = InputError;

    /// Accepts the kebab name (either spelling of "organisation", `_` or `-`),
    /// the numeric code, or the conventional CSV file name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .trim()
            .to_lowercase()
            .replace('_', "-")
            .replace("organization", "organisation");

        if let Some(err) = unsupported(&normalized) {
            return Err(err);
        }

        if let Ok(code) = normalized.parse::<u16>() {
            return Self::from_code(code).ok_or_else(|| InputError::UnknownFileType(s.to_string()));
        }

        Self::ALL
            .into_iter()
            .find(|t| t.name() == normalized)
            .or_else(|| Self::from_file_name(s))
            .ok_or_else(|| InputError::UnknownFileType(s.to_string()))
    }
}
