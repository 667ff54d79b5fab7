//! OpenRefine reconciliation protocol: service metadata, query matching and
//! property extension.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::{Field, MergedOrganisation, OrgId, Result, store::SearchResults};

pub const IDENTIFIER_SPACE: &str = "http://rdf.freebase.com/ns/type.object.id";
pub const SCHEMA_SPACE: &str = "http://rdf.freebase.com/ns/type.object.id";
pub const DEFAULT_TYPE: &str = "Organization";

// ─── Service metadata ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRef {
  pub id:   String,
  pub name: String,
}

impl TypeRef {
  pub fn organisation() -> Self {
    Self { id: format!("/{DEFAULT_TYPE}"), name: DEFAULT_TYPE.to_owned() }
  }

  pub fn named(name: &str) -> Self {
    Self { id: name.to_owned(), name: name.to_owned() }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct UrlTemplate {
  pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Preview {
  pub url:    String,
  pub width:  u32,
  pub height: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProposeProperties {
  pub service_url:  String,
  pub service_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtendSpec {
  pub propose_properties: ProposeProperties,
  pub property_settings:  Vec<serde_json::Value>,
}

/// The document returned by a bare `GET /reconcile`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
  pub name:             String,
  pub identifier_space: String,
  pub schema_space:     String,
  pub view:             UrlTemplate,
  pub preview:          Preview,
  pub default_types:    Vec<TypeRef>,
  pub extend:           ExtendSpec,
}

/// Service metadata with every URL rooted at `base_url`. `key_types` are
/// offered as default types after the catch-all organisation type.
pub fn service_spec(base_url: &str, key_types: &[String]) -> ServiceSpec {
  let base = base_url.trim_end_matches('/');
  ServiceSpec {
    name:             "Organisation identity resolver".to_owned(),
    identifier_space: IDENTIFIER_SPACE.to_owned(),
    schema_space:     SCHEMA_SPACE.to_owned(),
    view:             UrlTemplate { url: format!("{base}/orgid/{{{{id}}}}") },
    preview:          Preview {
      url:    format!("{base}/orgid/{{{{id}}}}.json"),
      width:  430,
      height: 300,
    },
    default_types:    std::iter::once(TypeRef::organisation())
      .chain(key_types.iter().map(|t| TypeRef::named(t)))
      .collect(),
    extend:           ExtendSpec {
      propose_properties: ProposeProperties {
        service_url:  base.to_owned(),
        service_path: "/reconcile/propose_properties".to_owned(),
      },
      property_settings:  Vec::new(),
    },
  }
}

// ─── Queries ─────────────────────────────────────────────────────────────────

/// `type` may be a single type id or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TypeFilter {
  One(String),
  Many(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PropertyValue {
  pub pid: String,
  pub v:   serde_json::Value,
}

/// A single reconciliation query.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReconQuery {
  pub query:       String,
  #[serde(rename = "type", default)]
  pub type_filter: Option<TypeFilter>,
  #[serde(default)]
  pub limit:       Option<usize>,
  #[serde(default)]
  pub properties:  Vec<PropertyValue>,
}

impl ReconQuery {
  pub fn new(query: impl Into<String>) -> Self {
    Self {
      query:       query.into(),
      type_filter: None,
      limit:       None,
      properties:  Vec::new(),
    }
  }

  /// Accept either a JSON query object or a bare search string.
  pub fn parse(raw: &str) -> Result<Self> {
    if raw.trim_start().starts_with('{') {
      Ok(serde_json::from_str(raw)?)
    } else {
      Ok(Self::new(raw))
    }
  }

  /// Organisation types to filter by; the catch-all default type is not a
  /// filter.
  pub fn organisation_types(&self) -> Vec<String> {
    let types = match &self.type_filter {
      None => return Vec::new(),
      Some(TypeFilter::One(t)) => vec![t.clone()],
      Some(TypeFilter::Many(ts)) => ts.clone(),
    };
    types
      .into_iter()
      .map(|t| t.trim_start_matches('/').to_owned())
      .filter(|t| !t.is_empty() && t != DEFAULT_TYPE)
      .collect()
  }

  /// Value of the `postalCode` property, if supplied.
  pub fn postcode(&self) -> Option<String> {
    self
      .properties
      .iter()
      .find(|p| p.pid == Field::PostalCode.to_string())
      .and_then(|p| p.v.as_str().map(str::to_owned))
  }
}

/// Parse a `queries` batch: a JSON object of query id → query.
pub fn parse_batch(raw: &str) -> Result<BTreeMap<String, ReconQuery>> {
  Ok(serde_json::from_str(raw)?)
}

// ─── Candidates ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
  pub id:       OrgId,
  pub name:     String,
  #[serde(rename = "type")]
  pub types:    Vec<TypeRef>,
  pub score:    f64,
  #[serde(rename = "match")]
  pub is_match: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconResponse {
  pub total:  usize,
  pub result: Vec<Candidate>,
}

/// Turn search hits into candidates. A candidate is a match when its name
/// equals `term` ignoring case and its score is the best in the batch.
pub fn candidates(term: &str, results: &SearchResults) -> ReconResponse {
  let max_score = results
    .max_score
    .or_else(|| results.hits.iter().map(|h| h.score).reduce(f64::max));
  let term = term.trim().to_lowercase();

  let result: Vec<Candidate> = results
    .hits
    .iter()
    .map(|hit| {
      let doc = &hit.document;
      let mut name = format!("{} ({})", doc.name, doc.id);
      if doc.active == Some(false) {
        name.push_str(" [INACTIVE]");
      }
      Candidate {
        id: doc.id.clone(),
        name,
        types: vec![TypeRef::organisation()],
        score: hit.score,
        is_match: doc.name.to_lowercase() == term
          && Some(hit.score) == max_score,
      }
    })
    .collect();

  ReconResponse { total: result.len(), result }
}

/// Score added to hits whose postcode matches the query's `postalCode`.
pub const POSTCODE_BOOST: f64 = 2.0;

/// Raise hits in `postcode` above otherwise equal hits and re-sort.
/// Postcodes compare ignoring case and spaces.
pub fn boost_postcode(results: &mut SearchResults, postcode: &str) {
  let canonical = |p: &str| -> String {
    p.chars()
      .filter(|c| !c.is_whitespace())
      .collect::<String>()
      .to_uppercase()
  };
  let wanted = canonical(postcode);
  if wanted.is_empty() {
    return;
  }
  for hit in &mut results.hits {
    if hit.document.postal_code.as_deref().map(canonical) == Some(wanted.clone()) {
      hit.score += POSTCODE_BOOST;
    }
  }
  results.hits.sort_by(|a, b| b.score.total_cmp(&a.score));
  results.max_score = results.hits.first().map(|h| h.score);
}

// ─── Extend ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PropertyRef {
  pub id: String,
}

/// Body of an `extend` request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExtendRequest {
  pub ids:        Vec<OrgId>,
  pub properties: Vec<PropertyRef>,
}

impl ExtendRequest {
  pub fn parse(raw: &str) -> Result<Self> { Ok(serde_json::from_str(raw)?) }

  /// Resolve requested property ids to fields; unknown ids are an error.
  pub fn fields(&self) -> Result<Vec<Field>> {
    self.properties.iter().map(|p| Field::parse(&p.id)).collect()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyMeta {
  pub id:   String,
  pub name: String,
}

impl From<Field> for PropertyMeta {
  fn from(field: Field) -> Self {
    Self { id: field.to_string(), name: field.label().to_owned() }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtendCell {
  #[serde(rename = "str")]
  pub text: String,
}

/// `{meta, rows}` keyed by requested id, then property id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtendResponse {
  pub meta: Vec<PropertyMeta>,
  pub rows: BTreeMap<String, BTreeMap<String, Vec<ExtendCell>>>,
}

/// Build the extension table. `orgs` pairs each requested id with its merged
/// organisation, or `None` when the id is unknown (its cells stay empty).
pub fn extend(
  fields: &[Field],
  orgs: &[(OrgId, Option<MergedOrganisation>)],
) -> ExtendResponse {
  let meta = fields.iter().copied().map(PropertyMeta::from).collect();
  let mut rows = BTreeMap::new();
  for (id, org) in orgs {
    let mut row = BTreeMap::new();
    for field in fields {
      let cells = org
        .as_ref()
        .and_then(|o| o.main_value(*field))
        .map(|v| v.to_strings())
        .unwrap_or_default()
        .into_iter()
        .map(|text| ExtendCell { text })
        .collect();
      row.insert(field.to_string(), cells);
    }
    rows.insert(id.to_string(), row);
  }
  ExtendResponse { meta, rows }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProposeResponse {
  #[serde(rename = "type")]
  pub type_id:    String,
  pub properties: Vec<PropertyMeta>,
}

/// Every property the service can extend with.
pub fn propose_properties(limit: Option<usize>) -> ProposeResponse {
  let properties = Field::iter()
    .filter(|f| *f != Field::Name)
    .map(PropertyMeta::from)
    .take(limit.unwrap_or(usize::MAX))
    .collect();
  ProposeResponse { type_id: DEFAULT_TYPE.to_owned(), properties }
}
