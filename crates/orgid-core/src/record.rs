//! Organisation records and links: the rows the resolver reads.
//!
//! A record is one regulator's view of one organisation. Records are built
//! from validated key/value maps: unknown keys are rejected rather than
//! carried along.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{Error, OrgId, Result};

// ─── Address ─────────────────────────────────────────────────────────────────

/// A postal address; merged as a single composite value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Address {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub street_address:   Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub address_locality: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub address_region:   Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub address_country:  Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub postal_code:      Option<String>,
}

impl Address {
  fn parts(&self) -> impl Iterator<Item = &str> {
    [
      &self.street_address,
      &self.address_locality,
      &self.address_region,
      &self.address_country,
      &self.postal_code,
    ]
    .into_iter()
    .filter_map(|p| p.as_deref())
    .filter(|p| !p.is_empty())
  }

  pub fn is_empty(&self) -> bool { self.parts().next().is_none() }
}

// ─── Field values ────────────────────────────────────────────────────────────

/// A single value of a mergeable field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
  Bool(bool),
  Integer(i64),
  Date(NaiveDate),
  Text(String),
  Address(Address),
}

impl FieldValue {
  pub fn as_text(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Self::Bool(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_integer(&self) -> Option<i64> {
    match self {
      Self::Integer(i) => Some(*i),
      _ => None,
    }
  }

  pub fn as_date(&self) -> Option<NaiveDate> {
    match self {
      Self::Date(d) => Some(*d),
      _ => None,
    }
  }

  pub fn as_address(&self) -> Option<&Address> {
    match self {
      Self::Address(a) => Some(a),
      _ => None,
    }
  }
}

/// The string form used for display and for content hashing.
impl fmt::Display for FieldValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Bool(b) => write!(f, "{b}"),
      Self::Integer(i) => write!(f, "{i}"),
      Self::Date(d) => write!(f, "{d}"),
      Self::Text(s) => f.write_str(s),
      Self::Address(a) => {
        for part in a.parts() {
          f.write_str(part)?;
        }
        Ok(())
      }
    }
  }
}

// ─── Fields ──────────────────────────────────────────────────────────────────

/// Every field that takes part in a merge. Identifiers are handled
/// separately by the priority resolver.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumIter,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Field {
  Name,
  AlternateName,
  CharityNumber,
  CompanyNumber,
  Telephone,
  Email,
  Description,
  Url,
  Domain,
  LatestIncome,
  DateModified,
  DateRegistered,
  DateRemoved,
  Active,
  Parent,
  OrganisationType,
  PostalCode,
  Address,
}

impl Field {
  /// List-valued fields keep every distinct value as their main value.
  pub fn is_list(self) -> bool {
    matches!(self, Self::AlternateName | Self::OrganisationType)
  }

  /// Human-readable label, used by reconciliation property metadata.
  pub fn label(self) -> &'static str {
    match self {
      Self::Name => "Name",
      Self::AlternateName => "Alternative names",
      Self::CharityNumber => "Charity number",
      Self::CompanyNumber => "Company number",
      Self::Telephone => "Telephone",
      Self::Email => "Email",
      Self::Description => "Description",
      Self::Url => "Website",
      Self::Domain => "Domain",
      Self::LatestIncome => "Latest income",
      Self::DateModified => "Date last modified",
      Self::DateRegistered => "Date registered",
      Self::DateRemoved => "Date removed",
      Self::Active => "Active",
      Self::Parent => "Parent organisation",
      Self::OrganisationType => "Organisation type",
      Self::PostalCode => "Postcode",
      Self::Address => "Address",
    }
  }

  /// Parse a camelCase field name, e.g. `"postalCode"`.
  pub fn parse(name: &str) -> Result<Self> {
    name.parse().map_err(|_| Error::UnknownField(name.to_owned()))
  }
}

// ─── OrganisationRecord ──────────────────────────────────────────────────────

/// One source's view of one organisation.
///
/// Invariant: `id` is always a member of `org_ids`; see
/// [`OrganisationRecord::from_value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OrganisationRecord {
  pub id:                OrgId,
  pub name:              String,
  #[serde(default)]
  pub alternate_name:    Vec<String>,
  #[serde(default)]
  pub organisation_type: Vec<String>,
  #[serde(default, rename = "orgIDs")]
  pub org_ids:           Vec<OrgId>,
  pub source:            String,
  pub active:            bool,
  #[serde(default, deserialize_with = "lenient_date")]
  pub date_registered:   Option<NaiveDate>,
  #[serde(default, deserialize_with = "lenient_date")]
  pub date_removed:      Option<NaiveDate>,
  #[serde(default, deserialize_with = "lenient_date")]
  pub date_modified:     Option<NaiveDate>,
  #[serde(default)]
  pub charity_number:    Option<String>,
  #[serde(default)]
  pub company_number:    Option<String>,
  #[serde(default)]
  pub description:       Option<String>,
  #[serde(default)]
  pub domain:            Option<String>,
  #[serde(default)]
  pub email:             Option<String>,
  #[serde(default)]
  pub telephone:         Option<String>,
  #[serde(default)]
  pub url:               Option<String>,
  #[serde(default)]
  pub parent:            Option<String>,
  #[serde(default)]
  pub latest_income:     Option<i64>,
  #[serde(default)]
  pub postal_code:       Option<String>,
  #[serde(default)]
  pub street_address:    Option<String>,
  #[serde(default)]
  pub address_locality:  Option<String>,
  #[serde(default)]
  pub address_region:    Option<String>,
  #[serde(default)]
  pub address_country:   Option<String>,
}

impl OrganisationRecord {
  /// Minimal record with every optional field empty.
  pub fn new(
    id: impl Into<OrgId>,
    source: impl Into<String>,
    name: impl Into<String>,
  ) -> Self {
    let id = id.into();
    Self {
      org_ids: vec![id.clone()],
      id,
      name: name.into(),
      alternate_name: Vec::new(),
      organisation_type: Vec::new(),
      source: source.into(),
      active: true,
      date_registered: None,
      date_removed: None,
      date_modified: None,
      charity_number: None,
      company_number: None,
      description: None,
      domain: None,
      email: None,
      telephone: None,
      url: None,
      parent: None,
      latest_income: None,
      postal_code: None,
      street_address: None,
      address_locality: None,
      address_region: None,
      address_country: None,
    }
  }

  /// Build a record from a key/value map, rejecting unknown keys and
  /// restoring the `id ∈ org_ids` invariant.
  pub fn from_value(value: serde_json::Value) -> Result<Self> {
    let record: Self = serde_json::from_value(value)
      .map_err(|e| Error::InvalidRecord(e.to_string()))?;
    record.validated()
  }

  /// Parse a single JSON object, as found in one line of an import file.
  pub fn from_json(s: &str) -> Result<Self> {
    let record: Self =
      serde_json::from_str(s).map_err(|e| Error::InvalidRecord(e.to_string()))?;
    record.validated()
  }

  fn validated(mut self) -> Result<Self> {
    if self.id.as_str().is_empty() {
      return Err(Error::InvalidRecord("empty id".to_owned()));
    }
    if self.source.is_empty() {
      return Err(Error::InvalidRecord(format!(
        "record {} has no source",
        self.id
      )));
    }
    self.normalise_org_ids();
    Ok(self)
  }

  /// Put `id` first in `org_ids` if missing and drop duplicates.
  pub fn normalise_org_ids(&mut self) {
    if !self.org_ids.contains(&self.id) {
      self.org_ids.insert(0, self.id.clone());
    }
    let mut seen = std::collections::HashSet::new();
    self.org_ids.retain(|id| seen.insert(id.clone()));
  }

  pub fn with_org_ids<I, T>(mut self, ids: I) -> Self
  where
    I: IntoIterator<Item = T>,
    T: Into<OrgId>,
  {
    self.org_ids.extend(ids.into_iter().map(Into::into));
    self.normalise_org_ids();
    self
  }

  pub fn address(&self) -> Address {
    Address {
      street_address:   self.street_address.clone(),
      address_locality: self.address_locality.clone(),
      address_region:   self.address_region.clone(),
      address_country:  self.address_country.clone(),
      postal_code:      self.postal_code.clone(),
    }
  }

  /// The non-empty values this record holds for `field`, lists flattened.
  pub fn values(&self, field: Field) -> Vec<FieldValue> {
    fn text(v: &Option<String>) -> Vec<FieldValue> {
      v.iter()
        .filter(|s| !s.is_empty())
        .map(|s| FieldValue::Text(s.clone()))
        .collect()
    }
    fn texts(v: &[String]) -> Vec<FieldValue> {
      v.iter()
        .filter(|s| !s.is_empty())
        .map(|s| FieldValue::Text(s.clone()))
        .collect()
    }
    fn date(v: Option<NaiveDate>) -> Vec<FieldValue> {
      v.map(FieldValue::Date).into_iter().collect()
    }

    match field {
      Field::Name => texts(std::slice::from_ref(&self.name)),
      Field::AlternateName => texts(&self.alternate_name),
      Field::CharityNumber => text(&self.charity_number),
      Field::CompanyNumber => text(&self.company_number),
      Field::Telephone => text(&self.telephone),
      Field::Email => text(&self.email),
      Field::Description => text(&self.description),
      Field::Url => text(&self.url),
      Field::Domain => text(&self.domain),
      Field::LatestIncome => {
        self.latest_income.map(FieldValue::Integer).into_iter().collect()
      }
      Field::DateModified => date(self.date_modified),
      Field::DateRegistered => date(self.date_registered),
      Field::DateRemoved => date(self.date_removed),
      Field::Active => vec![FieldValue::Bool(self.active)],
      Field::Parent => text(&self.parent),
      Field::OrganisationType => texts(&self.organisation_type),
      Field::PostalCode => text(&self.postal_code),
      Field::Address => {
        let address = self.address();
        if address.is_empty() {
          vec![]
        } else {
          vec![FieldValue::Address(address)]
        }
      }
    }
  }
}

/// Accept `YYYY-MM-DD`, RFC 3339 and `YYYY-MM-DD HH:MM:SS` dates; blank
/// strings count as missing.
fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
  D: Deserializer<'de>,
{
  let Some(raw) = Option::<String>::deserialize(deserializer)? else {
    return Ok(None);
  };
  parse_date(&raw).map_err(serde::de::Error::custom)
}

/// Parse a date in any of the formats regulators publish.
pub fn parse_date(raw: &str) -> Result<Option<NaiveDate>, String> {
  let raw = raw.trim();
  if raw.is_empty() {
    return Ok(None);
  }
  if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
    return Ok(Some(d));
  }
  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return Ok(Some(dt.date_naive()));
  }
  if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
    return Ok(Some(dt.date()));
  }
  if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
    return Ok(Some(dt.date()));
  }
  Err(format!("unrecognised date: {raw:?}"))
}

// ─── OrganisationLink ────────────────────────────────────────────────────────

/// An assertion that two identifiers refer to related or equivalent
/// organisations. Undirected for graph purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OrganisationLink {
  pub organisation_id_a: OrgId,
  pub organisation_id_b: OrgId,
  pub source:            String,
  #[serde(default)]
  pub description:       Option<String>,
}

impl OrganisationLink {
  pub fn new(
    a: impl Into<OrgId>,
    b: impl Into<OrgId>,
    source: impl Into<String>,
  ) -> Self {
    Self {
      organisation_id_a: a.into(),
      organisation_id_b: b.into(),
      source:            source.into(),
      description:       None,
    }
  }

  pub fn from_json(s: &str) -> Result<Self> {
    let link: Self =
      serde_json::from_str(s).map_err(|e| Error::InvalidLink(e.to_string()))?;
    if link.organisation_id_a.as_str().is_empty()
      || link.organisation_id_b.as_str().is_empty()
    {
      return Err(Error::InvalidLink("empty identifier".to_owned()));
    }
    Ok(link)
  }

  /// True if either end of the link is `id`.
  pub fn touches(&self, id: &OrgId) -> bool {
    &self.organisation_id_a == id || &self.organisation_id_b == id
  }
}
