//! XML Serializer for IATI 2.03 documents.
//!
//! Renders assembled [`Activity`] / [`Organisation`] values into an
//! `iati-activities` or `iati-organisations` document. Element order and
//! attribute names follow the IATI 2.03 schema; dates are `YYYY-MM-DD`,
//! amounts are written exactly as validated.
//!
//! Mandatory fields are checked for every aggregate before anything is
//! written, so a failure never yields a partial document. Every `value`
//! carries a currency: its own, else the aggregate's default, else
//! [`SerializeOptions::default_currency`]; a value with none of these is a
//! schema error.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::{SchemaError, SerializeError, SerializeResult};
use crate::models::{
    Activity, Budget, BudgetLine, BudgetTarget, ContactInfo, DocumentKind, DocumentLink, Location, MonetaryValue,
    Narrative, Organisation, OrganisationBudget, ReportingOrg, Transaction,
};

/// IATI standard version written on the root element.
pub const IATI_VERSION: &str = "2.03";

/// Reference system of `location/point`.
pub const WGS84_SRS_NAME: &str = "http://www.opengis.net/def/crs/EPSG/0/4326";

/// Rendering options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Value of the root `generated-datetime` attribute.
    pub generated_at: DateTime<Utc>,
    /// Currency of values that name none and whose aggregate has no default.
    pub default_currency: Option<String>,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self::at(Utc::now())
    }
}

impl SerializeOptions {
    pub fn at(generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            default_currency: None,
        }
    }

    pub fn with_default_currency(mut self, currency: Option<String>) -> Self {
        self.default_currency = currency;
        self
    }
}

// =============================================================================
// Entry Points
// =============================================================================

/// Render the document of the given kind from the matching aggregates.
pub fn serialize(
    document: DocumentKind,
    activities: &[Activity],
    organisations: &[Organisation],
    options: &SerializeOptions,
) -> SerializeResult<String> {
    match document {
        DocumentKind::Activities => serialize_activities(activities, options),
        DocumentKind::Organisations => serialize_organisations(organisations, options),
    }
}

/// Render an `iati-activities` document.
pub fn serialize_activities(activities: &[Activity], options: &SerializeOptions) -> SerializeResult<String> {
    let fallback = options.default_currency.as_deref();
    check_activities(activities, fallback)?;

    let mut doc = XmlDoc::new();
    doc.open_root(DocumentKind::Activities, options)?;
    for activity in activities {
        write_activity(&mut doc, activity, fallback)?;
    }
    doc.end(DocumentKind::Activities.root_element())?;
    doc.finish()
}

/// Render an `iati-organisations` document.
pub fn serialize_organisations(
    organisations: &[Organisation],
    options: &SerializeOptions,
) -> SerializeResult<String> {
    let fallback = options.default_currency.as_deref();
    check_organisations(organisations, fallback)?;

    let mut doc = XmlDoc::new();
    doc.open_root(DocumentKind::Organisations, options)?;
    for organisation in organisations {
        write_organisation(&mut doc, organisation, fallback)?;
    }
    doc.end(DocumentKind::Organisations.root_element())?;
    doc.finish()
}

/// Mandatory-field check over every activity; all offenders are reported.
///
/// `fallback_currency` is the document-wide currency for values that name
/// none; without it such values are reported as a missing `currency`.
pub fn check_activities(activities: &[Activity], fallback_currency: Option<&str>) -> SerializeResult<()> {
    let errors: Vec<SchemaError> = activities
        .iter()
        .flat_map(|a| {
            let mut fields = a.missing_mandatory_fields();
            let values = a
                .budgets
                .iter()
                .map(|b| &b.value)
                .chain(a.transactions.iter().map(|t| &t.value));
            if lacks_currency(values, a.default_currency.as_deref().or(fallback_currency)) {
                fields.push("currency");
            }
            fields.into_iter().map(move |field| SchemaError {
                element: "Activity",
                identifier: a.identifier.clone(),
                field,
            })
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(SerializeError::Schema { errors })
    }
}

pub fn check_organisations(organisations: &[Organisation], fallback_currency: Option<&str>) -> SerializeResult<()> {
    let errors: Vec<SchemaError> = organisations
        .iter()
        .flat_map(|o| {
            let mut fields = o.missing_mandatory_fields();
            let budgets = o
                .budgets
                .iter()
                .flat_map(|b| std::iter::once(&b.value).chain(b.lines.iter().map(|l| &l.value)));
            let expenditures = o
                .expenditures
                .iter()
                .flat_map(|e| std::iter::once(&e.value).chain(e.lines.iter().map(|l| &l.value)));
            if lacks_currency(budgets.chain(expenditures), o.default_currency.as_deref().or(fallback_currency)) {
                fields.push("currency");
            }
            fields.into_iter().map(move |field| SchemaError {
                element: "Organisation",
                identifier: o.identifier.clone(),
                field,
            })
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(SerializeError::Schema { errors })
    }
}

fn lacks_currency<'v>(mut values: impl Iterator<Item = &'v MonetaryValue>, default: Option<&str>) -> bool {
    default.is_none() && values.any(|v| v.currency.is_none())
}

// =============================================================================
// Writer
// =============================================================================

/// Thin wrapper over the quick-xml writer with IATI conveniences.
struct XmlDoc {
    writer: Writer<Vec<u8>>,
}

type Attrs<'a> = &'a [(&'a str, &'a str)];

impl XmlDoc {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn write(&mut self, event: Event<'_>) -> SerializeResult<()> {
        self.writer
            .write_event(event)
            .map_err(|e| SerializeError::Xml(e.to_string()))
    }

    fn open_root(&mut self, document: DocumentKind, options: &SerializeOptions) -> SerializeResult<()> {
        self.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let generated = options.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        self.start(
            document.root_element(),
            &[("version", IATI_VERSION), ("generated-datetime", generated.as_str())],
        )
    }

    fn start(&mut self, name: &str, attrs: Attrs<'_>) -> SerializeResult<()> {
        let elem = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.write(Event::Start(elem))
    }

    fn end(&mut self, name: &str) -> SerializeResult<()> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    fn empty(&mut self, name: &str, attrs: Attrs<'_>) -> SerializeResult<()> {
        let elem = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.write(Event::Empty(elem))
    }

    fn text_element(&mut self, name: &str, attrs: Attrs<'_>, text: &str) -> SerializeResult<()> {
        self.start(name, attrs)?;
        self.write(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn narrative(&mut self, narrative: &Narrative) -> SerializeResult<()> {
        match &narrative.lang {
            Some(lang) => self.text_element("narrative", &[("xml:lang", lang.as_str())], &narrative.text),
            None => self.text_element("narrative", &[], &narrative.text),
        }
    }

    /// `<name>` wrapping one narrative per entry.
    fn narratives<'n>(
        &mut self,
        name: &str,
        attrs: Attrs<'_>,
        narratives: impl IntoIterator<Item = &'n Narrative>,
    ) -> SerializeResult<()> {
        self.start(name, attrs)?;
        for narrative in narratives {
            self.narrative(narrative)?;
        }
        self.end(name)
    }

    fn date(&mut self, name: &str, date: NaiveDate) -> SerializeResult<()> {
        let iso_date = iso(date);
        self.empty(name, &[("iso-date", iso_date.as_str())])
    }

    /// `<value>` with the value's own currency or `default_currency`.
    fn value(&mut self, value: &MonetaryValue, default_currency: Option<&str>) -> SerializeResult<()> {
        let value_date = iso(value.value_date);
        let currency = value
            .currency
            .as_deref()
            .or(default_currency)
            .ok_or_else(|| SerializeError::Xml(format!("value {} has no currency", value.amount.as_str())))?;
        self.text_element(
            "value",
            &[("currency", currency), ("value-date", value_date.as_str())],
            value.amount.as_str(),
        )
    }

    fn optional_narratives(&mut self, name: &str, narrative: Option<&Narrative>) -> SerializeResult<()> {
        match narrative {
            Some(narrative) => self.narratives(name, &[], [narrative]),
            None => Ok(()),
        }
    }

    fn reporting_org(&mut self, org: &ReportingOrg) -> SerializeResult<()> {
        let mut attrs = vec![("ref", org.reference.as_str())];
        if let Some(org_type) = &org.org_type {
            attrs.push(("type", org_type.as_str()));
        }
        match &org.name {
            Some(name) => {
                self.start("reporting-org", &attrs)?;
                self.text_element("narrative", &[], name)?;
                self.end("reporting-org")
            }
            None => self.empty("reporting-org", &attrs),
        }
    }

    fn document_link(&mut self, link: &DocumentLink) -> SerializeResult<()> {
        self.start("document-link", &[("format", link.format.as_str()), ("url", link.url.as_str())])?;
        self.narratives("title", &[], [&link.title])?;
        self.empty("category", &[("code", link.category_code.as_str())])?;
        if let Some(language) = &link.language {
            self.empty("language", &[("code", language.as_str())])?;
        }
        if let Some(date) = link.document_date {
            self.date("document-date", date)?;
        }
        self.end("document-link")
    }

    fn finish(self) -> SerializeResult<String> {
        let mut bytes = self.writer.into_inner();
        bytes.push(b'\n');
        String::from_utf8(bytes).map_err(|e| SerializeError::Xml(e.to_string()))
    }
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

// =============================================================================
// Activities
// =============================================================================

fn write_activity(doc: &mut XmlDoc, activity: &Activity, fallback_currency: Option<&str>) -> SerializeResult<()> {
    let mut attrs = Vec::new();
    if let Some(currency) = &activity.default_currency {
        attrs.push(("default-currency", currency.as_str()));
    }
    if let Some(lang) = &activity.default_language {
        attrs.push(("xml:lang", lang.as_str()));
    }
    let currency = activity.default_currency.as_deref().or(fallback_currency);
    let element = DocumentKind::Activities.record_element();

    doc.start(element, &attrs)?;
    doc.text_element("iati-identifier", &[], &activity.identifier)?;
    doc.reporting_org(&activity.reporting_org)?;
    doc.narratives("title", &[], activity.title_narratives())?;

    for description in &activity.descriptions {
        doc.narratives("description", &[("type", description.description_type.as_str())], [&description.narrative])?;
    }

    for org in &activity.participating_orgs {
        let mut org_attrs = Vec::new();
        if let Some(org_ref) = &org.org_ref {
            org_attrs.push(("ref", org_ref.as_str()));
        }
        org_attrs.push(("role", org.role.as_str()));
        if let Some(org_type) = &org.org_type {
            org_attrs.push(("type", org_type.as_str()));
        }
        match &org.name {
            Some(name) => {
                doc.start("participating-org", &org_attrs)?;
                doc.text_element("narrative", &[], name)?;
                doc.end("participating-org")?;
            }
            None => doc.empty("participating-org", &org_attrs)?,
        }
    }

    if let Some(status) = &activity.activity_status {
        doc.empty("activity-status", &[("code", status.as_str())])?;
    }

    for date in &activity.dates {
        let iso_date = iso(date.iso_date);
        doc.empty("activity-date", &[("type", date.date_type.as_str()), ("iso-date", iso_date.as_str())])?;
    }

    for contact in &activity.contacts {
        write_contact(doc, contact)?;
    }

    for location in &activity.locations {
        write_location(doc, location)?;
    }

    for sector in &activity.sectors {
        let mut sector_attrs = vec![("vocabulary", sector.vocabulary.as_str()), ("code", sector.code.as_str())];
        if let Some(percentage) = &sector.percentage {
            sector_attrs.push(("percentage", percentage.as_str()));
        }
        doc.empty("sector", &sector_attrs)?;
    }

    for budget in &activity.budgets {
        write_budget(doc, budget, currency)?;
    }

    for transaction in &activity.transactions {
        write_transaction(doc, transaction, currency)?;
    }

    for link in &activity.documents {
        doc.document_link(link)?;
    }

    doc.end(element)
}

fn write_contact(doc: &mut XmlDoc, contact: &ContactInfo) -> SerializeResult<()> {
    match &contact.contact_type {
        Some(contact_type) => doc.start("contact-info", &[("type", contact_type.as_str())])?,
        None => doc.start("contact-info", &[])?,
    }
    doc.optional_narratives("organisation", contact.organisation.as_ref())?;
    doc.optional_narratives("department", contact.department.as_ref())?;
    doc.optional_narratives("person-name", contact.person_name.as_ref())?;
    doc.optional_narratives("job-title", contact.job_title.as_ref())?;
    if let Some(telephone) = &contact.telephone {
        doc.text_element("telephone", &[], telephone)?;
    }
    if let Some(email) = &contact.email {
        doc.text_element("email", &[], email)?;
    }
    if let Some(website) = &contact.website {
        doc.text_element("website", &[], website)?;
    }
    doc.optional_narratives("mailing-address", contact.mailing_address.as_ref())?;
    doc.end("contact-info")
}

fn write_location(doc: &mut XmlDoc, location: &Location) -> SerializeResult<()> {
    match &location.reference {
        Some(reference) => doc.start("location", &[("ref", reference.as_str())])?,
        None => doc.start("location", &[])?,
    }
    if let Some(reach) = &location.reach {
        doc.empty("location-reach", &[("code", reach.as_str())])?;
    }
    if let Some(id) = &location.location_id {
        doc.empty("location-id", &[("vocabulary", id.vocabulary.as_str()), ("code", id.code.as_str())])?;
    }
    doc.optional_narratives("name", location.name.as_ref())?;
    doc.optional_narratives("description", location.description.as_ref())?;
    doc.optional_narratives("activity-description", location.activity_description.as_ref())?;
    if let Some(admin) = &location.administrative {
        let mut attrs = vec![("vocabulary", admin.vocabulary.as_str())];
        if let Some(level) = &admin.level {
            attrs.push(("level", level.as_str()));
        }
        attrs.push(("code", admin.code.as_str()));
        doc.empty("administrative", &attrs)?;
    }
    if let Some(point) = &location.point {
        doc.start("point", &[("srsName", WGS84_SRS_NAME)])?;
        doc.text_element("pos", &[], &point.pos())?;
        doc.end("point")?;
    }
    if let Some(exactness) = &location.exactness {
        doc.empty("exactness", &[("code", exactness.as_str())])?;
    }
    if let Some(class) = &location.location_class {
        doc.empty("location-class", &[("code", class.as_str())])?;
    }
    if let Some(designation) = &location.feature_designation {
        doc.empty("feature-designation", &[("code", designation.as_str())])?;
    }
    doc.end("location")
}

fn write_budget(doc: &mut XmlDoc, budget: &Budget, currency: Option<&str>) -> SerializeResult<()> {
    doc.start("budget", &[("type", budget.budget_type.as_str()), ("status", budget.status.as_str())])?;
    doc.date("period-start", budget.period_start)?;
    doc.date("period-end", budget.period_end)?;
    doc.value(&budget.value, currency)?;
    doc.end("budget")
}

fn write_transaction(doc: &mut XmlDoc, transaction: &Transaction, currency: Option<&str>) -> SerializeResult<()> {
    match &transaction.reference {
        Some(reference) => doc.start("transaction", &[("ref", reference.as_str())])?,
        None => doc.start("transaction", &[])?,
    }
    doc.empty("transaction-type", &[("code", transaction.transaction_type.as_str())])?;
    doc.date("transaction-date", transaction.date)?;
    doc.value(&transaction.value, currency)?;
    if let Some(description) = &transaction.description {
        doc.narratives("description", &[], [description])?;
    }
    for sector in &transaction.sectors {
        doc.empty("sector", &[("vocabulary", sector.vocabulary.as_str()), ("code", sector.code.as_str())])?;
    }
    doc.end("transaction")
}

// =============================================================================
// Organisations
// =============================================================================

fn write_organisation(
    doc: &mut XmlDoc,
    organisation: &Organisation,
    fallback_currency: Option<&str>,
) -> SerializeResult<()> {
    let mut attrs = Vec::new();
    if let Some(currency) = &organisation.default_currency {
        attrs.push(("default-currency", currency.as_str()));
    }
    if let Some(lang) = &organisation.default_language {
        attrs.push(("xml:lang", lang.as_str()));
    }
    let currency = organisation.default_currency.as_deref().or(fallback_currency);
    let element = DocumentKind::Organisations.record_element();

    doc.start(element, &attrs)?;
    doc.text_element("organisation-identifier", &[], &organisation.identifier)?;
    doc.narratives("name", &[], organisation.name_narratives())?;
    doc.reporting_org(&organisation.reporting_org)?;

    let mut budgets: Vec<&OrganisationBudget> = organisation.budgets.iter().collect();
    budgets.sort_by_key(|b| b.target.schema_order());
    for budget in budgets {
        write_organisation_budget(doc, budget, currency)?;
    }

    for expenditure in &organisation.expenditures {
        doc.start("total-expenditure", &[])?;
        doc.date("period-start", expenditure.period_start)?;
        doc.date("period-end", expenditure.period_end)?;
        doc.value(&expenditure.value, currency)?;
        for line in &expenditure.lines {
            write_line(doc, "expense-line", line, currency)?;
        }
        doc.end("total-expenditure")?;
    }

    for link in &organisation.documents {
        doc.document_link(link)?;
    }

    doc.end(element)
}

/// `budget-line` or `expense-line`.
fn write_line(doc: &mut XmlDoc, name: &str, line: &BudgetLine, currency: Option<&str>) -> SerializeResult<()> {
    match &line.reference {
        Some(reference) => doc.start(name, &[("ref", reference.as_str())])?,
        None => doc.start(name, &[])?,
    }
    doc.value(&line.value, currency)?;
    if let Some(narrative) = &line.narrative {
        doc.narrative(narrative)?;
    }
    doc.end(name)
}

fn write_organisation_budget(
    doc: &mut XmlDoc,
    budget: &OrganisationBudget,
    currency: Option<&str>,
) -> SerializeResult<()> {
    let element = budget.target.element_name();
    doc.start(element, &[("status", budget.status.as_str())])?;

    match &budget.target {
        BudgetTarget::TotalBudget => {}
        BudgetTarget::RecipientOrgBudget { org_ref, name } => {
            let attrs: Vec<(&str, &str)> = org_ref.iter().map(|r| ("ref", r.as_str())).collect();
            match name {
                Some(name) => {
                    doc.start("recipient-org", &attrs)?;
                    doc.text_element("narrative", &[], name)?;
                    doc.end("recipient-org")?;
                }
                None => doc.empty("recipient-org", &attrs)?,
            }
        }
        BudgetTarget::RecipientCountryBudget { country_code } => {
            doc.empty("recipient-country", &[("code", country_code.as_str())])?;
        }
        BudgetTarget::RecipientRegionBudget { region_code, vocabulary } => {
            doc.empty("recipient-region", &[("code", region_code.as_str()), ("vocabulary", vocabulary.as_str())])?;
        }
    }

    doc.date("period-start", budget.period_start)?;
    doc.date("period-end", budget.period_end)?;
    doc.value(&budget.value, currency)?;
    for line in &budget.lines {
        write_line(doc, "budget-line", line, currency)?;
    }
    doc.end(element)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ActivityDate, Administrative, Amount, Description, Expenditure, Namespace, ParticipatingOrg, Point, RecordKey,
        Sector, VocabularyCode,
    };
    use chrono::TimeZone;

    fn options() -> SerializeOptions {
        SerializeOptions::at(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn activity(id: &str) -> Activity {
        let mut activity = Activity::new(&RecordKey::new(Namespace::default(), "XM-DAC-1", id));
        activity.reporting_org.org_type = Some("10".into());
        activity.reporting_org.name = Some("Ministry & Co".into());
        activity.title = Some(Narrative::new("Water <supply>"));
        activity.default_currency = Some("EUR".into());
        activity
    }

    #[test]
    fn test_activity_document_structure() {
        let mut a = activity("AC-1");
        a.names.push(Narrative::new("Eau").with_lang(Some("fr".into())));
        a.descriptions.push(Description {
            description_type: "1".into(),
            narrative: Narrative::new("About"),
        });
        a.participating_orgs.push(ParticipatingOrg {
            role: "1".into(),
            org_ref: Some("XM-DAC-2".into()),
            org_type: None,
            name: None,
        });
        a.activity_status = Some("2".into());
        a.sectors.push(Sector {
            code: "14030".into(),
            vocabulary: "1".into(),
            percentage: Some(Amount::parse("100").unwrap()),
        });
        a.transactions.push(Transaction {
            reference: Some("TX-1".into()),
            transaction_type: "3".into(),
            date: date(2024, 2, 1),
            value: MonetaryValue {
                amount: Amount::parse("1500.50").unwrap(),
                currency: None,
                value_date: date(2024, 2, 1),
            },
            description: None,
            sectors: Vec::new(),
        });

        let xml = serialize_activities(&[a], &options()).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains(r#"<iati-activities version="2.03" generated-datetime="2024-05-01T12:00:00Z">"#));
        assert!(xml.contains(r#"<iati-activity default-currency="EUR">"#));
        assert!(xml.contains("<iati-identifier>AC-1</iati-identifier>"));
        assert!(xml.contains(r#"<reporting-org ref="XM-DAC-1" type="10">"#));
        assert!(xml.contains("<narrative>Ministry &amp; Co</narrative>"));
        assert!(xml.contains("<narrative>Water &lt;supply&gt;</narrative>"));
        assert!(xml.contains(r#"<narrative xml:lang="fr">Eau</narrative>"#));
        assert!(xml.contains(r#"<participating-org ref="XM-DAC-2" role="1"/>"#));
        assert!(xml.contains(r#"<activity-status code="2"/>"#));
        assert!(xml.contains(r#"<sector vocabulary="1" code="14030" percentage="100"/>"#));
        assert!(xml.contains(r#"<transaction ref="TX-1">"#));
        assert!(xml.contains(r#"<transaction-date iso-date="2024-02-01"/>"#));
        assert!(xml.contains(r#"<value currency="EUR" value-date="2024-02-01">1500.50</value>"#));
    }

    #[test]
    fn test_activity_element_order() {
        let mut a = activity("AC-1");
        a.activity_status = Some("2".into());
        a.descriptions.push(Description {
            description_type: "1".into(),
            narrative: Narrative::new("About"),
        });
        let xml = serialize_activities(&[a], &options()).unwrap();

        let positions: Vec<usize> = ["<iati-identifier>", "<reporting-org", "<title>", "<description", "<activity-status"]
            .iter()
            .map(|tag| xml.find(tag).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_missing_fields_reported_for_every_activity() {
        let mut missing_title = activity("AC-1");
        missing_title.title = None;
        let mut missing_org = activity("AC-2");
        missing_org.reporting_org.org_type = None;
        missing_org.reporting_org.name = None;

        let err = serialize_activities(&[missing_title, activity("AC-3"), missing_org], &options()).unwrap_err();
        match err {
            SerializeError::Schema { errors } => {
                assert_eq!(errors.len(), 3);
                assert_eq!(errors[0].identifier, "AC-1");
                assert_eq!(errors[0].field, "title");
                assert_eq!(errors[2].field, "reporting_org_name");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_populated_activities_pass_mandatory_check() {
        let activities = vec![activity("AC-1"), activity("AC-2")];
        assert!(check_activities(&activities, None).is_ok());
        let xml = serialize_activities(&activities, &options()).unwrap();
        assert_eq!(xml.matches("<iati-activity ").count(), 2);
    }

    #[test]
    fn test_empty_document() {
        let xml = serialize_activities(&[], &options()).unwrap();
        assert!(xml.contains("<iati-activities version=\"2.03\""));
        assert!(xml.trim_end().ends_with("</iati-activities>"));
    }

    #[test]
    fn test_organisation_budgets_follow_schema_order() {
        let key = RecordKey::new(Namespace::default(), "XM-DAC-1", "XM-DAC-1");
        let mut org = Organisation::new(&key);
        org.name = Some(Narrative::new("Ministry"));
        org.reporting_org.org_type = Some("10".into());
        let value = MonetaryValue {
            amount: Amount::parse("10").unwrap(),
            currency: Some("USD".into()),
            value_date: date(2024, 1, 1),
        };
        for target in [
            BudgetTarget::RecipientCountryBudget { country_code: "KE".into() },
            BudgetTarget::TotalBudget,
        ] {
            org.budgets.push(OrganisationBudget {
                target,
                status: "1".into(),
                period_start: date(2024, 1, 1),
                period_end: date(2024, 12, 31),
                value: value.clone(),
                lines: Vec::new(),
            });
        }

        let xml = serialize_organisations(&[org], &options()).unwrap();
        let total = xml.find("<total-budget").unwrap();
        let country = xml.find("<recipient-country-budget").unwrap();
        assert!(total < country);
        assert!(xml.contains("<iati-organisation>"));
        assert!(xml.trim_end().ends_with("</iati-organisation>\n</iati-organisations>"));
        assert!(xml.contains(r#"<recipient-country code="KE"/>"#));
        assert!(xml.contains("<organisation-identifier>XM-DAC-1</organisation-identifier>"));
        assert!(xml.contains(r#"<reporting-org ref="XM-DAC-1" type="10"/>"#));
    }

    fn money(amount: &str, currency: Option<&str>) -> MonetaryValue {
        MonetaryValue {
            amount: Amount::parse(amount).unwrap(),
            currency: currency.map(str::to_string),
            value_date: date(2024, 1, 1),
        }
    }

    fn transaction(value: MonetaryValue) -> Transaction {
        Transaction {
            reference: Some("TX-1".into()),
            transaction_type: "3".into(),
            date: date(2024, 1, 1),
            value,
            description: Some(Narrative::new("First tranche")),
            sectors: Vec::new(),
        }
    }

    fn organisation() -> Organisation {
        let key = RecordKey::new(Namespace::default(), "XM-DAC-1", "XM-DAC-1");
        let mut org = Organisation::new(&key);
        org.name = Some(Narrative::new("Ministry"));
        org.reporting_org.org_type = Some("10".into());
        org
    }

    #[test]
    fn test_value_without_any_currency_is_schema_error() {
        let mut a = activity("AC-1");
        a.default_currency = None;
        a.transactions.push(transaction(money("10", None)));

        let err = serialize_activities(&[a.clone()], &options()).unwrap_err();
        match err {
            SerializeError::Schema { errors } => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].identifier, "AC-1");
                assert_eq!(errors[0].field, "currency");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // a currency on the value itself needs no fallback
        let mut priced = a.clone();
        priced.transactions[0].value.currency = Some("GBP".into());
        let xml = serialize_activities(&[priced], &options()).unwrap();
        assert!(xml.contains(r#"<value currency="GBP" value-date="2024-01-01">10</value>"#));
    }

    #[test]
    fn test_fallback_currency_fills_values() {
        let mut a = activity("AC-1");
        a.default_currency = None;
        a.transactions.push(transaction(money("10", None)));
        let options = options().with_default_currency(Some("USD".into()));

        let xml = serialize_activities(&[a], &options).unwrap();
        assert!(xml.contains(r#"<value currency="USD" value-date="2024-01-01">10</value>"#));
        // the fallback is not declared as the activity's own default
        assert!(xml.contains("<iati-activity>"));
    }

    #[test]
    fn test_organisation_value_without_currency() {
        let mut org = organisation();
        org.expenditures.push(Expenditure {
            period_start: date(2023, 1, 1),
            period_end: date(2023, 12, 31),
            value: money("900", Some("EUR")),
            lines: vec![BudgetLine {
                reference: Some("E-1".into()),
                value: money("300", None),
                narrative: None,
            }],
        });

        let err = serialize_organisations(&[org.clone()], &options()).unwrap_err();
        assert!(err.to_string().contains("Organisation 'XM-DAC-1' is missing mandatory field 'currency'"));

        let xml = serialize_organisations(&[org], &options().with_default_currency(Some("USD".into()))).unwrap();
        assert!(xml.contains(r#"<value currency="USD" value-date="2024-01-01">300</value>"#));
    }

    #[test]
    fn test_budget_and_expense_lines() {
        let mut org = organisation();
        org.budgets.push(OrganisationBudget {
            target: BudgetTarget::TotalBudget,
            status: "2".into(),
            period_start: date(2024, 1, 1),
            period_end: date(2024, 12, 31),
            value: money("1000", Some("EUR")),
            lines: vec![BudgetLine {
                reference: Some("L-1".into()),
                value: money("400", Some("EUR")),
                narrative: Some(Narrative::new("Salaries").with_lang(Some("en".into()))),
            }],
        });
        org.expenditures.push(Expenditure {
            period_start: date(2023, 1, 1),
            period_end: date(2023, 12, 31),
            value: money("900", Some("EUR")),
            lines: vec![BudgetLine {
                reference: None,
                value: money("300", Some("EUR")),
                narrative: None,
            }],
        });

        let xml = serialize_organisations(&[org], &options()).unwrap();

        assert!(xml.contains(r#"<total-budget status="2">"#));
        assert!(xml.contains(r#"<budget-line ref="L-1">"#));
        assert!(xml.contains(r#"<narrative xml:lang="en">Salaries</narrative>"#));
        assert!(xml.contains("<expense-line>"));
        let budget_value = xml.find(">1000</value>").unwrap();
        let line = xml.find("<budget-line").unwrap();
        let budget_end = xml.find("</total-budget>").unwrap();
        assert!(budget_value < line && line < budget_end);
        assert!(xml.find("<expense-line").unwrap() < xml.find("</total-expenditure>").unwrap());
    }

    #[test]
    fn test_transaction_sectors() {
        let mut a = activity("AC-1");
        let mut tx = transaction(money("10", None));
        tx.sectors.push(Sector {
            code: "14030".into(),
            vocabulary: "1".into(),
            percentage: None,
        });
        a.transactions.push(tx);

        let xml = serialize_activities(&[a], &options()).unwrap();
        let tx_start = xml.find("<transaction ").unwrap();
        let description = xml[tx_start..].find("<description>").unwrap() + tx_start;
        let sector = xml.find(r#"<sector vocabulary="1" code="14030"/>"#).unwrap();
        assert!(description < sector);
        assert!(sector < xml.find("</transaction>").unwrap());
    }

    #[test]
    fn test_contact_and_location_elements() {
        let mut a = activity("AC-1");
        a.dates.push(ActivityDate {
            date_type: "1".into(),
            iso_date: date(2024, 1, 1),
        });
        a.contacts.push(ContactInfo {
            contact_type: Some("1".into()),
            organisation: Some(Narrative::new("Ministry")),
            department: None,
            person_name: Some(Narrative::new("A. Person")),
            job_title: None,
            telephone: None,
            email: Some("info@example.org".into()),
            website: None,
            mailing_address: None,
        });
        a.locations.push(Location {
            reference: Some("LOC-1".into()),
            reach: Some("1".into()),
            location_id: Some(VocabularyCode {
                code: "184745".into(),
                vocabulary: "G1".into(),
            }),
            name: Some(Narrative::new("Nairobi")),
            description: None,
            activity_description: None,
            administrative: Some(Administrative {
                code: "KE-30".into(),
                vocabulary: "G1".into(),
                level: Some("1".into()),
            }),
            point: Some(Point {
                latitude: "-1.2921".into(),
                longitude: "36.8219".into(),
            }),
            exactness: Some("1".into()),
            location_class: None,
            feature_designation: None,
        });
        a.sectors.push(Sector {
            code: "14030".into(),
            vocabulary: "1".into(),
            percentage: None,
        });

        let xml = serialize_activities(&[a], &options()).unwrap();

        assert!(xml.contains(r#"<contact-info type="1">"#));
        assert!(xml.contains("<email>info@example.org</email>"));
        assert!(xml.contains(r#"<location ref="LOC-1">"#));
        assert!(xml.contains(r#"<location-id vocabulary="G1" code="184745"/>"#));
        assert!(xml.contains(r#"<administrative vocabulary="G1" level="1" code="KE-30"/>"#));
        assert!(xml.contains(r#"<point srsName="http://www.opengis.net/def/crs/EPSG/0/4326">"#));
        assert!(xml.contains("<pos>-1.2921 36.8219</pos>"));

        let positions: Vec<usize> = ["<activity-date", "<contact-info", "<organisation>", "<person-name>", "<email>", "<location ", "<sector "]
            .iter()
            .map(|tag| xml.find(tag).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{xml}");
    }

    #[test]
    fn test_organisation_requires_name() {
        let key = RecordKey::new(Namespace::default(), "XM-DAC-1", "XM-DAC-1");
        let mut org = Organisation::new(&key);
        org.reporting_org.org_type = Some("10".into());

        let err = serialize(DocumentKind::Organisations, &[], &[org], &options()).unwrap_err();
        assert!(err.to_string().contains("Organisation 'XM-DAC-1' is missing mandatory field 'name'"));
    }
}
