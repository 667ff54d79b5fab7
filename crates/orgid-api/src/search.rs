//! Handlers for `GET /search` and `GET /autocomplete`.
//!
//! List-valued parameters (`orgtype`, `source`) are comma-separated.

use axum::{
  Json,
  extract::{Query, State},
};
use orgid_core::{
  OrgId,
  store::{AutocompleteQuery, OrgSource, SearchIndex, SearchQuery, SearchResults},
};
use serde::{Deserialize, Serialize};

use crate::{AppState, error::ApiError};

/// Largest page a client may request.
pub const MAX_PAGE_SIZE: usize = 100;

fn comma_list(raw: Option<String>) -> Vec<String> {
  raw
    .map(|s| {
      s.split(',')
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty())
        .collect()
    })
    .unwrap_or_default()
}

// ─── Search ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct SearchParams {
  /// Free-text term; omitted lists everything by name.
  pub q:         Option<String>,
  pub orgtype:   Option<String>,
  pub source:    Option<String>,
  /// Only active organisations.
  #[serde(default)]
  pub active:    bool,
  /// 1-based page number.
  pub p:         Option<usize>,
  pub size:      Option<usize>,
  /// Include facet counts by type and source.
  #[serde(default)]
  pub aggregate: bool,
}

/// `GET /search[?q=...][&orgtype=...][&source=...][&active=true][&p=...][&size=...][&aggregate=true]`
pub async fn handler<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<SearchParams>,
) -> Result<Json<SearchResults>, ApiError>
where
  S: OrgSource + SearchIndex,
{
  let size = params.size.unwrap_or(state.settings.search_page_size);
  if size == 0 || size > MAX_PAGE_SIZE {
    return Err(ApiError::BadRequest(format!(
      "size must be between 1 and {MAX_PAGE_SIZE}"
    )));
  }

  let query = SearchQuery {
    term:               params.q,
    organisation_types: comma_list(params.orgtype),
    sources:            comma_list(params.source),
    active_only:        params.active,
    aggregate:          params.aggregate,
    page:               params.p.unwrap_or(1).max(1),
    size,
  };

  let results = state
    .store
    .search(&query)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(results))
}

// ─── Autocomplete ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct AutocompleteParams {
  #[serde(default)]
  pub q:       String,
  pub orgtype: Option<String>,
  pub limit:   Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct Suggestion {
  pub label:    String,
  pub value:    OrgId,
  pub orgtypes: Vec<String>,
}

/// `GET /autocomplete?q=...[&orgtype=...][&limit=...]`
pub async fn autocomplete<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<AutocompleteParams>,
) -> Result<Json<Vec<Suggestion>>, ApiError>
where
  S: OrgSource + SearchIndex,
{
  let query = AutocompleteQuery {
    prefix:             params.q,
    organisation_types: comma_list(params.orgtype),
    limit:              params.limit.unwrap_or(0).min(MAX_PAGE_SIZE),
  };

  let docs = state
    .store
    .autocomplete(&query)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;

  Ok(Json(
    docs
      .into_iter()
      .map(|d| Suggestion {
        label:    d.name,
        value:    d.id,
        orgtypes: d.organisation_type,
      })
      .collect(),
  ))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn comma_lists_drop_blanks() {
    assert_eq!(
      comma_list(Some("Registered Charity, ,Education".into())),
      vec!["Registered Charity", "Education"]
    );
    assert!(comma_list(None).is_empty());
  }
}
