//! IATI 2.03 code lists used by the column rulesets.
//!
//! Only the codes are kept; names and descriptions live in the published
//! code lists at <https://iatistandard.org/en/iati-standard/203/codelists/>.

/// A closed set of accepted codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeList {
    pub name: &'static str,
    pub codes: &'static [&'static str],
}

impl CodeList {
    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains(&code)
    }
}

pub const ORGANISATION_TYPE: CodeList = CodeList {
    name: "OrganisationType",
    codes: &[
        "10", "11", "15", "21", "22", "23", "24", "30", "40", "60", "70", "71", "72", "73", "80", "90",
    ],
};

pub const ORGANISATION_ROLE: CodeList = CodeList {
    name: "OrganisationRole",
    codes: &["1", "2", "3", "4"],
};

pub const ACTIVITY_STATUS: CodeList = CodeList {
    name: "ActivityStatus",
    codes: &["1", "2", "3", "4", "5", "6"],
};

pub const ACTIVITY_DATE_TYPE: CodeList = CodeList {
    name: "ActivityDateType",
    codes: &["1", "2", "3", "4"],
};

pub const DESCRIPTION_TYPE: CodeList = CodeList {
    name: "DescriptionType",
    codes: &["1", "2", "3", "4"],
};

pub const BUDGET_TYPE: CodeList = CodeList {
    name: "BudgetType",
    codes: &["1", "2"],
};

pub const BUDGET_STATUS: CodeList = CodeList {
    name: "BudgetStatus",
    codes: &["1", "2"],
};

pub const TRANSACTION_TYPE: CodeList = CodeList {
    name: "TransactionType",
    codes: &["1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13"],
};

pub const SECTOR_VOCABULARY: CodeList = CodeList {
    name: "SectorVocabulary",
    codes: &["1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "98", "99"],
};

pub const REGION_VOCABULARY: CodeList = CodeList {
    name: "RegionVocabulary",
    codes: &["1", "2", "99"],
};

pub const GEOGRAPHIC_LOCATION_REACH: CodeList = CodeList {
    name: "GeographicLocationReach",
    codes: &["1", "2"],
};

pub const GEOGRAPHIC_VOCABULARY: CodeList = CodeList {
    name: "GeographicVocabulary",
    codes: &["A1", "A2", "A3", "A4", "A9", "G1", "G2"],
};

pub const GEOGRAPHIC_EXACTNESS: CodeList = CodeList {
    name: "GeographicExactness",
    codes: &["1", "2"],
};

pub const GEOGRAPHIC_LOCATION_CLASS: CodeList = CodeList {
    name: "GeographicLocationClass",
    codes: &["1", "2", "3", "4"],
};

pub const CONTACT_TYPE: CodeList = CodeList {
    name: "ContactType",
    codes: &["1", "2", "3", "4"],
};

/// Budget element kinds of the organisation standard.
pub const ORGANISATION_BUDGET_KIND: CodeList = CodeList {
    name: "OrganisationBudgetKind",
    codes: &[
        "total-budget",
        "recipient-org-budget",
        "recipient-country-budget",
        "recipient-region-budget",
    ],
};
