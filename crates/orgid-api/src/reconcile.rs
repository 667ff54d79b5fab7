//! OpenRefine reconciliation endpoints.
//!
//! `GET` and `POST /reconcile` take the same parameters, from the query
//! string or a form body. The first present of `extend`, `queries` and
//! `query` is answered; with none of them the service metadata is returned.
//! A `callback` parameter wraps any response as JSONP.

use std::collections::BTreeMap;

use axum::{
  Form, Json,
  extract::{Query, State},
  http::header,
  response::{IntoResponse, Response},
};
use orgid_core::{
  reconcile::{
    self as recon, ExtendRequest, ReconQuery, ReconResponse, boost_postcode,
    candidates, parse_batch, propose_properties, service_spec,
  },
  store::{OrgSource, SearchIndex, SearchQuery},
};
use serde::{Deserialize, Serialize};

use crate::{AppState, error::ApiError, lookup::resolve};

#[derive(Debug, Deserialize, Default)]
pub struct ReconcileParams {
  pub query:    Option<String>,
  pub queries:  Option<String>,
  pub extend:   Option<String>,
  pub callback: Option<String>,
}

/// `GET /reconcile`
pub async fn get<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<ReconcileParams>,
) -> Result<Response, ApiError>
where
  S: OrgSource + SearchIndex,
  <S as OrgSource>::Error: From<orgid_core::Error>,
{
  reconcile(&state, params).await
}

/// `POST /reconcile` with a form body.
pub async fn post<S>(
  State(state): State<AppState<S>>,
  Form(params): Form<ReconcileParams>,
) -> Result<Response, ApiError>
where
  S: OrgSource + SearchIndex,
  <S as OrgSource>::Error: From<orgid_core::Error>,
{
  reconcile(&state, params).await
}

async fn reconcile<S>(
  state: &AppState<S>,
  params: ReconcileParams,
) -> Result<Response, ApiError>
where
  S: OrgSource + SearchIndex,
  <S as OrgSource>::Error: From<orgid_core::Error>,
{
  let callback = params.callback.as_deref();

  if let Some(raw) = &params.extend {
    let request = ExtendRequest::parse(raw).map_err(bad_request)?;
    let fields = request.fields().map_err(bad_request)?;
    let mut orgs = Vec::with_capacity(request.ids.len());
    for id in &request.ids {
      orgs.push((id.clone(), resolve(state, id).await?));
    }
    return respond(&recon::extend(&fields, &orgs), callback);
  }

  if let Some(raw) = &params.queries {
    let batch = parse_batch(raw).map_err(bad_request)?;
    let mut out: BTreeMap<String, ReconResponse> = BTreeMap::new();
    for (key, query) in batch {
      out.insert(key, run_query(state, &query).await?);
    }
    return respond(&out, callback);
  }

  if let Some(raw) = &params.query {
    let query = ReconQuery::parse(raw).map_err(bad_request)?;
    return respond(&run_query(state, &query).await?, callback);
  }

  let spec = service_spec(&state.settings.base_url(), &state.settings.key_types);
  respond(&spec, callback)
}

async fn run_query<S>(
  state: &AppState<S>,
  query: &ReconQuery,
) -> Result<ReconResponse, ApiError>
where
  S: OrgSource + SearchIndex,
{
  let search = SearchQuery {
    organisation_types: query.organisation_types(),
    size: query.limit.unwrap_or(state.settings.search_page_size),
    ..SearchQuery::for_term(query.query.clone())
  };
  let mut results = state
    .store
    .search(&search)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  if let Some(postcode) = query.postcode() {
    boost_postcode(&mut results, &postcode);
  }
  Ok(candidates(&query.query, &results))
}

// ─── Propose properties ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct ProposeParams {
  pub limit:    Option<usize>,
  pub callback: Option<String>,
}

/// `GET /reconcile/propose_properties[?limit=...][&callback=...]`
pub async fn propose<S>(
  State(_state): State<AppState<S>>,
  Query(params): Query<ProposeParams>,
) -> Result<Response, ApiError>
where
  S: OrgSource + SearchIndex,
{
  respond(&propose_properties(params.limit), params.callback.as_deref())
}

// ─── Responses ───────────────────────────────────────────────────────────────

fn bad_request(e: orgid_core::Error) -> ApiError { ApiError::BadRequest(e.to_string()) }

/// JSONP callbacks are restricted to dotted JavaScript identifiers.
fn valid_callback(name: &str) -> bool {
  !name.is_empty()
    && name.len() <= 128
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.'))
}

fn respond<T: Serialize>(value: &T, callback: Option<&str>) -> Result<Response, ApiError> {
  let Some(callback) = callback else {
    return Ok(Json(value).into_response());
  };
  if !valid_callback(callback) {
    return Err(ApiError::BadRequest(format!("invalid callback: {callback:?}")));
  }
  let body = serde_json::to_string(value)?;
  Ok(
    (
      [(header::CONTENT_TYPE, "application/javascript")],
      format!("{callback}({body});"),
    )
      .into_response(),
  )
}
