//! The `OrgSource` and `SearchIndex` traits and their query types.
//!
//! Both traits are implemented by storage backends (e.g.
//! `orgid-store-sqlite`). The indexing job and the API depend on these
//! abstractions, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OrgId, OrganisationLink, OrganisationRecord, document::OrgDocument};

// ─── Source tables ───────────────────────────────────────────────────────────

/// Read access to the organisation and organisation-link tables.
pub trait OrgSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Every organisation record, in a stable order.
  fn all_records(
    &self,
  ) -> impl Future<Output = Result<Vec<OrganisationRecord>, Self::Error>> + Send + '_;

  /// Every organisation link.
  fn all_links(
    &self,
  ) -> impl Future<Output = Result<Vec<OrganisationLink>, Self::Error>> + Send + '_;

  /// Records whose `id` is in `ids` or whose `org_ids` contain any of `ids`.
  fn records_for_ids<'a>(
    &'a self,
    ids: &'a [OrgId],
  ) -> impl Future<Output = Result<Vec<OrganisationRecord>, Self::Error>> + Send + 'a;

  /// Links with either end in `ids`.
  fn links_for_ids<'a>(
    &'a self,
    ids: &'a [OrgId],
  ) -> impl Future<Output = Result<Vec<OrganisationLink>, Self::Error>> + Send + 'a;
}

// ─── Search index ────────────────────────────────────────────────────────────

/// Parameters for [`SearchIndex::search`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
  /// Free-text term; `None` lists everything sorted by name.
  pub term:               Option<String>,
  /// Restrict to documents with any of these organisation types.
  pub organisation_types: Vec<String>,
  /// Restrict to documents with any of these sources.
  pub sources:            Vec<String>,
  pub active_only:        bool,
  /// Compute facet counts by type and source.
  pub aggregate:          bool,
  /// 1-based page number.
  pub page:               usize,
  pub size:               usize,
}

impl Default for SearchQuery {
  fn default() -> Self {
    Self {
      term:               None,
      organisation_types: Vec::new(),
      sources:            Vec::new(),
      active_only:        false,
      aggregate:          false,
      page:               1,
      size:               10,
    }
  }
}

impl SearchQuery {
  pub fn for_term(term: impl Into<String>) -> Self {
    Self { term: Some(term.into()), ..Self::default() }
  }

  pub fn offset(&self) -> usize { self.page.max(1).saturating_sub(1) * self.size }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
  pub score:    f64,
  pub document: OrgDocument,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetCount {
  pub key:   String,
  pub count: usize,
}

/// Facet counts, each sorted by descending count then key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Facets {
  pub by_type:   Vec<FacetCount>,
  pub by_source: Vec<FacetCount>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
  /// Matches before pagination.
  pub total:        usize,
  pub max_score:    Option<f64>,
  pub hits:         Vec<SearchHit>,
  pub aggregations: Option<Facets>,
}

/// Parameters for [`SearchIndex::autocomplete`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutocompleteQuery {
  pub prefix:             String,
  pub organisation_types: Vec<String>,
  pub limit:              usize,
}

/// Outcome of one bulk write. Per-document failures do not fail the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
  pub saved:  usize,
  pub errors: Vec<String>,
}

/// Abstraction over the search index holding merged documents.
///
/// Upserts are keyed by document `id`. The index makes no transactional
/// promises; [`SearchIndex::delete_stale`] is the only cleanup mechanism.
pub trait SearchIndex: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Insert or replace every document in `docs`.
  fn bulk_upsert<'a>(
    &'a self,
    docs: &'a [OrgDocument],
  ) -> impl Future<Output = Result<BulkOutcome, Self::Error>> + Send + 'a;

  /// Delete every document whose `last_updated` is not `run`. Returns the
  /// number deleted.
  fn delete_stale(
    &self,
    run: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Exact-term lookup: every document whose `orgIDs` contain any of `ids`.
  fn find_by_org_ids<'a>(
    &'a self,
    ids: &'a [OrgId],
  ) -> impl Future<Output = Result<Vec<OrgDocument>, Self::Error>> + Send + 'a;

  /// Free-text relevance search with filters, pagination and facets.
  fn search<'a>(
    &'a self,
    query: &'a SearchQuery,
  ) -> impl Future<Output = Result<SearchResults, Self::Error>> + Send + 'a;

  /// Prefix completion over document names, best weight first.
  fn autocomplete<'a>(
    &'a self,
    query: &'a AutocompleteQuery,
  ) -> impl Future<Output = Result<Vec<OrgDocument>, Self::Error>> + Send + 'a;

  /// Number of documents currently indexed.
  fn count(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;
}

// ─── Relevance ───────────────────────────────────────────────────────────────

/// Relevance of `doc` for `term`, or `None` when it does not match.
///
/// Exact name matches score highest, then prefix and word matches, then
/// substring matches on secondary names and identifiers. Active documents
/// get a small boost.
pub fn relevance(doc: &OrgDocument, term: &str) -> Option<f64> {
  let term = term.trim().to_lowercase();
  if term.is_empty() {
    return Some(1.0);
  }

  let mut best: f64 = 0.0;
  for (i, name) in doc.all_names().enumerate() {
    let name = name.to_lowercase();
    let weight = if i == 0 { 1.0 } else { 0.8 };
    let score = if name == term {
      10.0
    } else if name.starts_with(&term) {
      6.0
    } else if name.split_whitespace().any(|w| w == term) {
      4.0
    } else if name.contains(&term) {
      2.0
    } else {
      0.0
    };
    best = best.max(score * weight);
  }
  if doc
    .org_ids
    .iter()
    .any(|id| {
      id.as_str().eq_ignore_ascii_case(&term)
        || id.number().eq_ignore_ascii_case(&term)
    })
  {
    best = best.max(8.0);
  }
  if best == 0.0 {
    return None;
  }
  if doc.active == Some(true) {
    best += 0.5;
  }
  Some(best)
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::{Merger, OrganisationRecord};

  fn doc(name: &str, alternates: &[&str]) -> OrgDocument {
    let mut record = OrganisationRecord::new("GB-CHC-225922", "ccew", name);
    record.alternate_name = alternates.iter().map(|s| s.to_string()).collect();
    let merged = Merger::default().merge(vec![record]).unwrap();
    OrgDocument::from_merged(&merged, Utc::now())
  }

  #[test]
  fn exact_name_beats_partial() {
    let exact = doc("NCVO", &[]);
    let partial = doc("NCVO Trading", &[]);
    assert!(relevance(&exact, "ncvo") > relevance(&partial, "ncvo"));
  }

  #[test]
  fn alternate_names_and_numbers_match() {
    let d = doc("The National Council for Voluntary Organisations", &["NCVO"]);
    assert!(relevance(&d, "ncvo").is_some());
    assert!(relevance(&d, "225922").is_some());
    assert!(relevance(&d, "oxfam").is_none());
  }

  #[test]
  fn pagination_offset_is_one_based() {
    let q = SearchQuery { page: 3, size: 20, ..SearchQuery::default() };
    assert_eq!(q.offset(), 40);
    let q = SearchQuery { page: 0, ..SearchQuery::default() };
    assert_eq!(q.offset(), 0);
  }
}
