//! Activity Assembler: validated rows into complete aggregates.
//!
//! Rows for one activity are spread over several resources (main file,
//! names, transactions, ...). The assembler folds them together by
//! [`RecordKey`]:
//!
//! ```text
//! activities.csv    AC-1 title=Water        ┐
//! activity_names    AC-1 fr "Eau"           ├→  Activity AC-1 { title, names: [fr], transactions: [1] }
//! transactions.csv  AC-1 3 2024-01-01 100   ┘
//! transactions.csv  AC-2 ...                →   Activity AC-2 { transactions: [1] }
//! ```
//!
//! Scalar core fields are set once (first writer wins); list fields only
//! grow. Aggregates keep first-seen order. Transaction sectors attach to the
//! transaction whose `ref` they name, so transactions must be added first.

use indexmap::IndexMap;
use std::collections::HashMap;

use crate::error::RowError;
use crate::models::{Activity, Description, DocumentKind, Namespace, Organisation, RecordKey};
use crate::validation::{ActivityCore, OrganisationCore, RecordPayload, ValidatedRecord};

/// What adding a record did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The record created a new aggregate.
    Created,
    /// The record was merged into an existing aggregate.
    Merged,
    /// A second main-file record; nothing already set was changed.
    DuplicateMain,
}

/// Result of assembly: aggregates in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assembly {
    pub activities: IndexMap<RecordKey, Activity>,
    pub organisations: IndexMap<RecordKey, Organisation>,
}

/// Incremental assembler fed one record at a time.
#[derive(Debug, Default)]
pub struct Assembler {
    assembly: Assembly,
    /// (namespace, document, identifier) → reporting-org ref it was first seen with.
    owners: HashMap<(Namespace, DocumentKind, String), String>,
    /// Keys that already received a main-file record.
    mains: HashMap<RecordKey, usize>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one record into its aggregate.
    ///
    /// Fails with a [`RowError`] when the identifier is already assembled
    /// under a different reporting organisation in the same namespace, or
    /// when a transaction sector names no known transaction.
    pub fn add(&mut self, record: ValidatedRecord) -> Result<MergeOutcome, RowError> {
        let document = record.file_type.document();
        let owner_key = (record.key.namespace.clone(), document, record.key.identifier.clone());

        let new_owner = match self.owners.get(&owner_key) {
            Some(owner) if *owner != record.key.reporting_org => {
                return Err(RowError::new(
                    record.resource.clone(),
                    record.row,
                    format!(
                        "identifier '{}' is already reported by '{}', not '{}'",
                        record.key.identifier, owner, record.key.reporting_org
                    ),
                )
                .with_column("reporting_org_ref"));
            }
            Some(_) => false,
            None => true,
        };

        let key = record.key.clone();
        let is_main = record.file_type.is_main();
        let created = match document {
            DocumentKind::Activities => self.merge_activity(record)?,
            DocumentKind::Organisations => self.merge_organisation(record),
        };

        if new_owner {
            self.owners.insert(owner_key, key.reporting_org.clone());
        }
        let duplicate_main = is_main && {
            let seen = self.mains.entry(key).or_insert(0);
            *seen += 1;
            *seen > 1
        };

        Ok(if duplicate_main {
            MergeOutcome::DuplicateMain
        } else if created {
            MergeOutcome::Created
        } else {
            MergeOutcome::Merged
        })
    }

    /// Number of aggregates assembled so far.
    pub fn len(&self) -> usize {
        self.assembly.activities.len() + self.assembly.organisations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn finish(self) -> Assembly {
        self.assembly
    }

    fn merge_activity(&mut self, record: ValidatedRecord) -> Result<bool, RowError> {
        if let RecordPayload::TransactionSector(entry) = &record.payload {
            let transaction = self
                .assembly
                .activities
                .get_mut(&record.key)
                .and_then(|a| {
                    a.transactions
                        .iter_mut()
                        .find(|t| t.reference.as_deref() == Some(entry.transaction_ref.as_str()))
                });
            return match transaction {
                Some(transaction) => {
                    transaction.sectors.push(entry.sector.clone());
                    Ok(false)
                }
                None => Err(RowError::new(
                    record.resource.clone(),
                    record.row,
                    format!(
                        "activity '{}' has no transaction with ref '{}'",
                        record.key.identifier, entry.transaction_ref
                    ),
                )
                .with_column("transaction_ref")),
            };
        }

        let created = !self.assembly.activities.contains_key(&record.key);
        let activity = self
            .assembly
            .activities
            .entry(record.key.clone())
            .or_insert_with(|| Activity::new(&record.key));

        match record.payload {
            RecordPayload::ActivityMain(core) => fill_activity_core(activity, core),
            RecordPayload::ActivityName(narrative) => activity.names.push(narrative),
            RecordPayload::ActivityDescription(description) => activity.descriptions.push(description),
            RecordPayload::ParticipatingOrg(org) => activity.participating_orgs.push(org),
            RecordPayload::Sector(sector) => activity.sectors.push(sector),
            RecordPayload::Budget(budget) => activity.budgets.push(budget),
            RecordPayload::Transaction(transaction) => activity.transactions.push(transaction),
            RecordPayload::Location(location) => activity.locations.push(location),
            RecordPayload::ActivityDocument(document) => activity.documents.push(document),
            RecordPayload::ActivityDate(date) => activity.dates.push(date),
            RecordPayload::ContactInfo(contact) => activity.contacts.push(contact),
            _ => {}
        }
        Ok(created)
    }

    fn merge_organisation(&mut self, record: ValidatedRecord) -> bool {
        let created = !self.assembly.organisations.contains_key(&record.key);
        let organisation = self
            .assembly
            .organisations
            .entry(record.key.clone())
            .or_insert_with(|| Organisation::new(&record.key));

        match record.payload {
            RecordPayload::OrganisationMain(core) => fill_organisation_core(organisation, core),
            RecordPayload::OrganisationName(narrative) => organisation.names.push(narrative),
            RecordPayload::OrganisationBudget(budget) => {
                // A row carrying a line extends the budget it repeats.
                let existing = organisation
                    .budgets
                    .iter_mut()
                    .find(|b| !budget.lines.is_empty() && b.same_budget(&budget));
                match existing {
                    Some(existing) => existing.lines.extend(budget.lines),
                    None => organisation.budgets.push(budget),
                }
            }
            RecordPayload::Expenditure(expenditure) => {
                let existing = organisation
                    .expenditures
                    .iter_mut()
                    .find(|e| !expenditure.lines.is_empty() && e.same_period(&expenditure));
                match existing {
                    Some(existing) => existing.lines.extend(expenditure.lines),
                    None => organisation.expenditures.push(expenditure),
                }
            }
            RecordPayload::OrganisationDocument(document) => organisation.documents.push(document),
            _ => {}
        }
        created
    }
}

/// Fill core fields that are still unset.
fn fill_activity_core(activity: &mut Activity, core: ActivityCore) {
    let org = &mut activity.reporting_org;
    org.org_type.get_or_insert(core.reporting_org_type);
    org.name.get_or_insert(core.reporting_org_name);

    if activity.title.is_none() {
        activity.title = Some(core.title);
    }
    if let Some(description) = core.description {
        if activity.descriptions.iter().all(|d| d.description_type != "1") {
            activity.descriptions.insert(
                0,
                Description {
                    description_type: "1".to_string(),
                    narrative: description,
                },
            );
        }
    }
    fill(&mut activity.activity_status, core.activity_status);
    fill(&mut activity.default_currency, core.default_currency);
    fill(&mut activity.default_language, core.default_language);
}

fn fill_organisation_core(organisation: &mut Organisation, core: OrganisationCore) {
    let org = &mut organisation.reporting_org;
    org.org_type.get_or_insert(core.reporting_org_type);
    fill(&mut org.name, core.reporting_org_name);

    if organisation.name.is_none() {
        organisation.name = Some(core.name);
    }
    fill(&mut organisation.default_currency, core.default_currency);
    fill(&mut organisation.default_language, core.default_language);
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

/// Assemble a finite sequence of records in one pass.
///
/// Records that cannot be merged are returned alongside the assembly.
pub fn assemble<I>(records: I) -> (Assembly, Vec<RowError>)
where
    I: IntoIterator<Item = ValidatedRecord>,
{
    let mut assembler = Assembler::new();
    let errors = records
        .into_iter()
        .filter_map(|record| assembler.add(record).err())
        .collect();
    (assembler.finish(), errors)
}
