//! Field merger and priority resolver.
//!
//! Records that share a connected identifier component are folded into one
//! [`MergedOrganisation`]. Every field keeps each distinct value together with
//! the sources that reported it; the "main" value of a field is the one from
//! the highest-priority source.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use serde::{Serialize, Serializer, ser::SerializeMap};
use sha2::{Digest, Sha256};
use strum::IntoEnumIterator;

use crate::{
  Error, Field, FieldValue, OrgId, OrganisationRecord, Priorities, Result,
  orgid::{ExternalLink, external_links},
};

/// Number of hex characters of the SHA-256 digest used as a dedup key.
pub const VALUE_KEY_LEN: usize = 8;

/// Short content hash of a value's string form.
pub fn value_key(value: &FieldValue) -> String {
  let digest = Sha256::digest(value.to_string().as_bytes());
  let mut key = hex::encode(digest);
  key.truncate(VALUE_KEY_LEN);
  key
}

// ─── Provenanced values ──────────────────────────────────────────────────────

/// A distinct value and every source that reported it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueEntry {
  #[serde(skip)]
  pub key:     String,
  pub value:   FieldValue,
  pub sources: Vec<String>,
}

impl ValueEntry {
  fn add_source(&mut self, source: &str) {
    if !self.sources.iter().any(|s| s == source) {
      self.sources.push(source.to_owned());
    }
  }
}

/// Distinct values of one field keyed by content hash, in first-seen order.
///
/// Serialises as a `{key: {value, sources}}` map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldValues {
  entries: Vec<ValueEntry>,
}

impl FieldValues {
  /// Record that `source` reported `value`.
  pub fn insert(&mut self, value: FieldValue, source: &str) {
    let key = value_key(&value);
    match self.entries.iter_mut().find(|e| e.key == key) {
      Some(entry) => entry.add_source(source),
      None => self.entries.push(ValueEntry {
        key,
        value,
        sources: vec![source.to_owned()],
      }),
    }
  }

  /// Fold another entry in, merging source lists without duplicates.
  pub fn absorb(&mut self, other: &ValueEntry) {
    match self.entries.iter_mut().find(|e| e.key == other.key) {
      Some(entry) => {
        for source in &other.sources {
          entry.add_source(source);
        }
      }
      None => self.entries.push(other.clone()),
    }
  }

  pub fn find_value(&self, value: &FieldValue) -> Option<&ValueEntry> {
    let key = value_key(value);
    self.entries.iter().find(|e| e.key == key)
  }

  pub fn first(&self) -> Option<&ValueEntry> { self.entries.first() }

  pub fn iter(&self) -> impl Iterator<Item = &ValueEntry> { self.entries.iter() }

  pub fn values(&self) -> impl Iterator<Item = &FieldValue> {
    self.entries.iter().map(|e| &e.value)
  }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

impl Serialize for FieldValues {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.entries.len()))?;
    for entry in &self.entries {
      map.serialize_entry(&entry.key, entry)?;
    }
    map.end()
  }
}

/// The main value of a field: one scalar, or every value of a list field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MainValue {
  Single(FieldValue),
  List(Vec<FieldValue>),
}

impl MainValue {
  /// Flatten to display strings.
  pub fn to_strings(&self) -> Vec<String> {
    match self {
      Self::Single(v) => vec![v.to_string()],
      Self::List(vs) => vs.iter().map(ToString::to_string).collect(),
    }
  }
}

// ─── Identifier scoring ──────────────────────────────────────────────────────

/// An identifier with the score used to order `orgIDs`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredId {
  pub id:     OrgId,
  pub scheme: String,
  /// Scheme rank plus the recency bonus.
  pub score:  f64,
  #[serde(skip)]
  rank:       u32,
  #[serde(skip)]
  bonus:      f64,
}

// ─── Merged organisation ─────────────────────────────────────────────────────

/// The resolved, deduplicated view of every record in one identifier
/// component. Never stored; always rebuilt from records and links.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedOrganisation {
  pub id:      OrgId,
  #[serde(rename = "orgIDs")]
  pub org_ids: Vec<OrgId>,
  pub sources: Vec<String>,
  pub name:    String,
  /// Every other known name, primary excluded.
  pub names:   FieldValues,
  pub fields:  BTreeMap<Field, FieldValues>,
  /// Member records in priority order.
  pub records: Vec<OrganisationRecord>,
}

impl MergedOrganisation {
  pub fn field(&self, field: Field) -> Option<&FieldValues> {
    self.fields.get(&field).filter(|v| !v.is_empty())
  }

  /// Every distinct value of `field`, highest priority first.
  pub fn values(&self, field: Field) -> Vec<&FieldValue> {
    self
      .field(field)
      .map(|v| v.values().collect())
      .unwrap_or_default()
  }

  /// Highest-priority scalar, or all values for list fields.
  pub fn main_value(&self, field: Field) -> Option<MainValue> {
    let values = self.field(field)?;
    if field.is_list() {
      Some(MainValue::List(values.values().cloned().collect()))
    } else {
      values.first().map(|e| MainValue::Single(e.value.clone()))
    }
  }

  fn first_value(&self, field: Field) -> Option<&FieldValue> {
    self.field(field)?.first().map(|e| &e.value)
  }

  pub fn main_text(&self, field: Field) -> Option<&str> {
    self.first_value(field)?.as_text()
  }

  pub fn active(&self) -> Option<bool> {
    self.first_value(Field::Active)?.as_bool()
  }

  pub fn latest_income(&self) -> Option<i64> {
    self.first_value(Field::LatestIncome)?.as_integer()
  }

  pub fn main_date(&self, field: Field) -> Option<NaiveDate> {
    self.first_value(field)?.as_date()
  }

  pub fn text_values(&self, field: Field) -> Vec<String> {
    self.values(field).into_iter().map(ToString::to_string).collect()
  }

  pub fn has_source(&self, source: &str) -> bool {
    self.sources.iter().any(|s| s == source)
  }

  pub fn links(&self) -> Vec<ExternalLink> { external_links(&self.org_ids) }

  /// Flat projection: the main value of every field plus identity data.
  pub fn to_json(&self) -> serde_json::Value {
    let mut out = serde_json::Map::new();
    out.insert("id".into(), serde_json::json!(self.id));
    out.insert("name".into(), serde_json::json!(self.name));
    out.insert("orgIDs".into(), serde_json::json!(self.org_ids));
    out.insert("sources".into(), serde_json::json!(self.sources));
    for field in Field::iter() {
      if field == Field::Name {
        continue;
      }
      let value = self
        .main_value(field)
        .map(|v| serde_json::to_value(v).unwrap_or(serde_json::Value::Null))
        .unwrap_or(serde_json::Value::Null);
      out.insert(field.to_string(), value);
    }
    out.insert("names".into(), serde_json::json!(self.names));
    out.insert("links".into(), serde_json::json!(self.links()));
    serde_json::Value::Object(out)
  }
}

// ─── Merger ──────────────────────────────────────────────────────────────────

/// Folds the records of one component into a [`MergedOrganisation`].
#[derive(Debug, Clone)]
pub struct Merger {
  priorities: Priorities,
  today:      NaiveDate,
}

impl Merger {
  pub fn new(priorities: Priorities) -> Self {
    Self { priorities, today: Utc::now().date_naive() }
  }

  /// Fix the reference date used for the registration recency bonus.
  pub fn as_of(mut self, today: NaiveDate) -> Self {
    self.today = today;
    self
  }

  /// Sort records by source priority; ties keep their relative order.
  pub fn sort_records(&self, records: &mut [OrganisationRecord]) {
    records.sort_by_key(|r| self.priorities.sources.rank(&r.source));
  }

  /// `1 / age_in_days` for active records with a registration date; age is
  /// clamped to at least one day.
  fn recency_bonus(&self, record: &OrganisationRecord) -> f64 {
    match record.date_registered {
      Some(registered) if record.active => {
        let age = (self.today - registered).num_days().max(1);
        1.0 / age as f64
      }
      _ => 0.0,
    }
  }

  /// Score every identifier of `records` (already priority-sorted) and order
  /// them best first. Scheme rank always dominates the recency bonus.
  pub fn score_identifiers(
    &self,
    records: &[OrganisationRecord],
  ) -> Vec<ScoredId> {
    let mut scored = Vec::new();
    for record in records {
      let bonus = self.recency_bonus(record);
      for id in &record.org_ids {
        let scheme = id.scheme().to_owned();
        let rank = self.priorities.schemes.rank(&scheme);
        let bonus = if id == &record.id { bonus } else { 0.0 };
        scored.push(ScoredId {
          id: id.clone(),
          score: rank as f64 + bonus,
          scheme,
          rank,
          bonus,
        });
      }
    }
    scored.sort_by(|a, b| {
      b.rank.cmp(&a.rank).then_with(|| b.bonus.total_cmp(&a.bonus))
    });
    scored
  }

  /// Merge `records` into one organisation.
  ///
  /// Callers must pass at least one record; every record carries its own id
  /// in `org_ids`, so the identifier list is never empty.
  pub fn merge(
    &self,
    mut records: Vec<OrganisationRecord>,
  ) -> Result<MergedOrganisation> {
    if records.is_empty() {
      return Err(Error::EmptyMerge);
    }
    for record in &mut records {
      record.normalise_org_ids();
    }
    self.sort_records(&mut records);

    let sources = self
      .priorities
      .sources
      .order(records.iter().map(|r| r.source.as_str()));

    let mut org_ids: Vec<OrgId> = Vec::new();
    for scored in self.score_identifiers(&records) {
      if !org_ids.contains(&scored.id) {
        org_ids.push(scored.id);
      }
    }
    let id = org_ids.first().cloned().ok_or(Error::EmptyMerge)?;

    let mut fields: BTreeMap<Field, FieldValues> = BTreeMap::new();
    for field in Field::iter() {
      let entry = fields.entry(field).or_default();
      for record in &records {
        for value in record.values(field) {
          entry.insert(value, &record.source);
        }
      }
    }

    let name = fields
      .get(&Field::Name)
      .and_then(FieldValues::first)
      .and_then(|e| e.value.as_text())
      .unwrap_or_default()
      .to_owned();

    let mut names = FieldValues::default();
    for field in [Field::Name, Field::AlternateName] {
      let Some(values) = fields.get(&field) else {
        continue;
      };
      for entry in values.iter() {
        if entry.value.as_text() == Some(name.as_str()) {
          continue;
        }
        names.absorb(entry);
      }
    }

    Ok(MergedOrganisation {
      id,
      org_ids,
      sources,
      name,
      names,
      fields,
      records,
    })
  }
}

impl Default for Merger {
  fn default() -> Self { Self::new(Priorities::default()) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::priority::{SchemePriority, SourcePriority};

  fn today() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 6, 1).unwrap() }

  fn merger() -> Merger { Merger::default().as_of(today()) }

  fn ncvo_records() -> Vec<OrganisationRecord> {
    vec![
      OrganisationRecord::new("GB-COH-00198344", "companies", "NCVO")
        .with_org_ids(["GB-CHC-225922"]),
      OrganisationRecord::new(
        "GB-CHC-225922",
        "ccew",
        "The National Council for Voluntary Organisations",
      )
      .with_org_ids(["GB-COH-00198344"]),
    ]
  }

  #[test]
  fn ncvo_scenario() {
    let merged = merger().merge(ncvo_records()).unwrap();
    assert_eq!(merged.id.as_str(), "GB-CHC-225922");
    assert_eq!(
      merged.name,
      "The National Council for Voluntary Organisations"
    );
    assert_eq!(merged.sources, vec!["ccew", "companies"]);

    let ncvo = merged
      .names
      .find_value(&FieldValue::Text("NCVO".into()))
      .unwrap();
    assert_eq!(ncvo.sources, vec!["companies"]);
    assert_eq!(merged.names.len(), 1);
  }

  #[test]
  fn higher_priority_source_wins_the_name() {
    let records = vec![
      OrganisationRecord::new("GB-EDU-100", "gias", "Ashfield School"),
      OrganisationRecord::new("GB-CHC-100", "ccew", "Ashfield School Trust")
        .with_org_ids(["GB-EDU-100"]),
    ];
    let merged = merger().merge(records).unwrap();
    assert_eq!(merged.name, "Ashfield School Trust");
    let gias = merged
      .names
      .find_value(&FieldValue::Text("Ashfield School".into()))
      .unwrap();
    assert_eq!(gias.sources, vec!["gias"]);
  }

  #[test]
  fn identical_values_are_deduplicated_with_all_sources() {
    let mut a = OrganisationRecord::new("GB-CHC-1", "ccew", "One");
    a.postal_code = Some("N1 9RL".into());
    let mut b = OrganisationRecord::new("GB-COH-1", "companies", "One Ltd")
      .with_org_ids(["GB-CHC-1"]);
    b.postal_code = Some("N1 9RL".into());

    let merged = merger().merge(vec![a, b]).unwrap();
    let postcodes = merged.field(Field::PostalCode).unwrap();
    assert_eq!(postcodes.len(), 1);
    assert_eq!(postcodes.first().unwrap().sources, vec!["ccew", "companies"]);
  }

  #[test]
  fn merged_org_ids_are_a_duplicate_free_union() {
    let merged = merger().merge(ncvo_records()).unwrap();
    let mut expected: Vec<_> = ncvo_records()
      .into_iter()
      .flat_map(|r| r.org_ids)
      .collect();
    expected.sort();
    expected.dedup();

    let mut actual = merged.org_ids.clone();
    actual.sort();
    assert_eq!(actual, expected);
    assert_eq!(merged.org_ids.len(), expected.len());
  }

  #[test]
  fn scheme_priority_dominates_recency() {
    let mut school = OrganisationRecord::new("GB-EDU-1", "gias", "School");
    school.date_registered = Some(today());
    let mut charity =
      OrganisationRecord::new("GB-CHC-1", "ccew", "Charity").with_org_ids([
        "GB-EDU-1",
      ]);
    charity.date_registered = NaiveDate::from_ymd_opt(1962, 1, 1);

    let merged = merger().merge(vec![school, charity]).unwrap();
    assert_eq!(merged.id.as_str(), "GB-CHC-1");
  }

  #[test]
  fn recency_breaks_ties_within_a_scheme() {
    let mut old = OrganisationRecord::new("GB-CHC-1", "ccew", "Old");
    old.date_registered = NaiveDate::from_ymd_opt(1990, 1, 1);
    let mut new = OrganisationRecord::new("GB-CHC-2", "ccew", "New")
      .with_org_ids(["GB-CHC-1"]);
    new.date_registered = NaiveDate::from_ymd_opt(2024, 5, 1);
    let mut removed = OrganisationRecord::new("GB-CHC-3", "ccew", "Gone")
      .with_org_ids(["GB-CHC-1"]);
    removed.active = false;
    removed.date_registered = NaiveDate::from_ymd_opt(2024, 5, 31);

    let merged = merger().merge(vec![old, new, removed]).unwrap();
    assert_eq!(merged.id.as_str(), "GB-CHC-2");
    assert_eq!(merged.org_ids[1].as_str(), "GB-CHC-1");
  }

  #[test]
  fn same_day_registration_does_not_divide_by_zero() {
    let mut record = OrganisationRecord::new("GB-CHC-1", "ccew", "New");
    record.date_registered = Some(today());
    let scored = merger().score_identifiers(&[record]);
    assert_eq!(scored[0].score, 6.0);
    assert!(scored[0].score.is_finite());
  }

  #[test]
  fn unknown_sources_sort_last_but_stable() {
    let priorities = Priorities {
      sources: SourcePriority::new(["oscr"]),
      schemes: SchemePriority::default(),
    };
    let records = vec![
      OrganisationRecord::new("GB-LAE-1", "lae", "Council"),
      OrganisationRecord::new("GB-NHS-1", "nhsods", "Trust")
        .with_org_ids(["GB-LAE-1"]),
      OrganisationRecord::new("GB-SC-SC1", "oscr", "Scottish")
        .with_org_ids(["GB-LAE-1"]),
    ];
    let merged = Merger::new(priorities).as_of(today()).merge(records).unwrap();
    assert_eq!(merged.sources, vec!["oscr", "lae", "nhsods"]);
    assert_eq!(merged.name, "Scottish");
    assert_eq!(merged.records[1].source, "lae");
  }

  #[test]
  fn list_fields_return_every_value() {
    let mut a = OrganisationRecord::new("GB-CHC-1", "ccew", "One");
    a.organisation_type = vec!["Registered Charity".into()];
    a.alternate_name = vec!["Uno".into()];
    let mut b = OrganisationRecord::new("GB-COH-1", "companies", "One Ltd")
      .with_org_ids(["GB-CHC-1"]);
    b.organisation_type =
      vec!["Registered Company".into(), "Registered Charity".into()];

    let merged = merger().merge(vec![a, b]).unwrap();
    let Some(MainValue::List(types)) = merged.main_value(Field::OrganisationType)
    else {
      panic!("organisationType should be list-valued");
    };
    assert_eq!(types.len(), 2);
    assert_eq!(
      merged.main_value(Field::Name),
      Some(MainValue::Single(FieldValue::Text("One".into())))
    );
    // "One Ltd" and "Uno" are secondary names.
    assert_eq!(merged.names.len(), 2);
  }

  #[test]
  fn empty_merge_is_an_error() {
    assert!(matches!(merger().merge(vec![]), Err(Error::EmptyMerge)));
  }

  #[test]
  fn merge_is_order_independent() {
    let a = merger().merge(ncvo_records()).unwrap();
    let mut reversed = ncvo_records();
    reversed.reverse();
    let b = merger().merge(reversed).unwrap();
    assert_eq!(a.id, b.id);
    assert_eq!(a.org_ids, b.org_ids);
    assert_eq!(a.name, b.name);
  }

  #[test]
  fn to_json_flattens_main_values() {
    let merged = merger().merge(ncvo_records()).unwrap();
    let json = merged.to_json();
    assert_eq!(json["id"], "GB-CHC-225922");
    assert_eq!(json["active"], true);
    assert_eq!(json["orgIDs"].as_array().unwrap().len(), 2);
    assert!(json["alternateName"].is_null());
    assert!(json["links"].as_array().unwrap().len() >= 1);
  }
}
