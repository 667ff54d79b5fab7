//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings. Records and index documents are stored
//! as compact JSON alongside the handful of columns the queries filter on.

use chrono::{DateTime, Utc};
use orgid_core::{
  OrgId, OrganisationLink, OrganisationRecord, document::OrgDocument,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Placeholders ────────────────────────────────────────────────────────────

/// `?1, ?2, …, ?n`. Numbered so a list can be referenced twice in one
/// statement.
pub fn placeholders(n: usize) -> String {
  (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

pub fn id_strings(ids: &[OrgId]) -> Vec<String> {
  ids.iter().map(|id| id.as_str().to_owned()).collect()
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// A record ready to be written: key columns plus its JSON body.
pub struct RawRecord {
  pub id:          String,
  pub source:      String,
  pub org_ids:     Vec<String>,
  pub record_json: String,
}

impl RawRecord {
  pub fn encode(record: &OrganisationRecord) -> Result<Self> {
    Ok(Self {
      id:          record.id.to_string(),
      source:      record.source.clone(),
      org_ids:     id_strings(&record.org_ids),
      record_json: serde_json::to_string(record)?,
    })
  }
}

pub fn decode_record(record_json: &str) -> Result<OrganisationRecord> {
  Ok(OrganisationRecord::from_json(record_json)?)
}

// ─── Links ───────────────────────────────────────────────────────────────────

pub struct RawLink {
  pub organisation_id_a: String,
  pub organisation_id_b: String,
  pub source:            String,
  pub description:       Option<String>,
}

impl RawLink {
  pub fn encode(link: &OrganisationLink) -> Self {
    Self {
      organisation_id_a: link.organisation_id_a.to_string(),
      organisation_id_b: link.organisation_id_b.to_string(),
      source:            link.source.clone(),
      description:       link.description.clone(),
    }
  }

  pub fn into_link(self) -> OrganisationLink {
    OrganisationLink {
      organisation_id_a: OrgId::new(self.organisation_id_a),
      organisation_id_b: OrgId::new(self.organisation_id_b),
      source:            self.source,
      description:       self.description,
    }
  }
}

// ─── Index documents ─────────────────────────────────────────────────────────

/// An index document flattened into its table rows.
pub struct RawDocument {
  pub id:            String,
  pub name:          String,
  pub search_text:   String,
  pub document_json: String,
  pub last_updated:  String,
  pub org_ids:       Vec<String>,
  pub completions:   Vec<String>,
  pub weight:        i64,
}

impl RawDocument {
  pub fn encode(doc: &OrgDocument) -> Result<Self> {
    Ok(Self {
      id:            doc.id.to_string(),
      name:          doc.name.clone(),
      search_text:   search_text(doc),
      document_json: serde_json::to_string(doc)?,
      last_updated:  encode_dt(doc.last_updated),
      org_ids:       id_strings(&doc.org_ids),
      completions:   doc
        .complete_names
        .input
        .iter()
        .map(|s| s.to_lowercase())
        .collect(),
      weight:        i64::from(doc.complete_names.weight),
    })
  }
}

pub fn decode_document(document_json: &str) -> Result<OrgDocument> {
  Ok(serde_json::from_str(document_json)?)
}

/// Lowercased names and identifiers, one per line, for `LIKE` prefiltering.
fn search_text(doc: &OrgDocument) -> String {
  doc
    .all_names()
    .map(str::to_owned)
    .chain(doc.org_ids.iter().map(|id| id.as_str().to_owned()))
    .collect::<Vec<_>>()
    .join("\n")
    .to_lowercase()
}
