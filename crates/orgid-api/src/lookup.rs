//! Handlers for single-organisation lookups.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/orgid/{orgid}.json` | Merged organisation; 404 if unknown |
//! | `GET`  | `/charity/{regno}.json` | Charity view; the number is normalized first |

use axum::{
  Json,
  extract::{Path, State},
};
use orgid_core::{
  MergedOrganisation, OrgId, charity::CharityView, normalize,
  resolve::Resolver,
  store::{OrgSource, SearchIndex},
};

use crate::{AppState, error::ApiError};

/// Accept the identifier with or without a trailing `.json`.
fn strip_json(raw: &str) -> &str { raw.strip_suffix(".json").unwrap_or(raw) }

/// Resolve `id` through the source tables with the configured priorities.
pub(crate) async fn resolve<S>(
  state: &AppState<S>,
  id: &OrgId,
) -> Result<Option<MergedOrganisation>, ApiError>
where
  S: OrgSource + SearchIndex,
  <S as OrgSource>::Error: From<orgid_core::Error>,
{
  let merger = state.settings.merger();
  Resolver::new(state.store.as_ref(), &merger)
    .merge_organisation(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))
}

/// `GET /orgid/{orgid}.json`
pub async fn orgid<S>(
  State(state): State<AppState<S>>,
  Path(raw): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: OrgSource + SearchIndex,
  <S as OrgSource>::Error: From<orgid_core::Error>,
{
  let id = OrgId::new(strip_json(&raw));
  let org = resolve(&state, &id)
    .await?
    .ok_or_else(|| ApiError::UnknownId { kind: "orgid", id: id.to_string() })?;
  Ok(Json(org.to_json()))
}

/// `GET /charity/{regno}.json`
pub async fn charity<S>(
  State(state): State<AppState<S>>,
  Path(raw): Path<String>,
) -> Result<Json<CharityView>, ApiError>
where
  S: OrgSource + SearchIndex,
  <S as OrgSource>::Error: From<orgid_core::Error>,
{
  let regno = strip_json(&raw);
  let id = normalize(regno);
  let org = resolve(&state, &id)
    .await?
    .ok_or_else(|| ApiError::UnknownId { kind: "regno", id: regno.to_owned() })?;
  let view = org
    .as_charity()
    .ok_or_else(|| ApiError::NotFound(format!("{id} is not a registered charity")))?;
  Ok(Json(view))
}
