//! JSON API for the organisation resolver.
//!
//! Exposes an axum [`Router`] over any store implementing both
//! [`OrgSource`] and [`SearchIndex`]. Single-organisation lookups merge on
//! demand from the source tables; search, autocomplete and reconciliation
//! read the prebuilt index.

pub mod error;
pub mod lookup;
pub mod reconcile;
pub mod search;

use std::sync::Arc;

use axum::{Router, routing::get};
use orgid_core::{
  settings::Settings,
  store::{OrgSource, SearchIndex},
};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
#[derive(Clone)]
pub struct AppState<S> {
  pub store:    Arc<S>,
  pub settings: Arc<Settings>,
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the API router for `state`.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: OrgSource + SearchIndex + Clone + Send + Sync + 'static,
  <S as OrgSource>::Error: From<orgid_core::Error>,
{
  Router::new()
    // Lookups
    .route("/orgid/{orgid}", get(lookup::orgid::<S>))
    .route("/charity/{regno}", get(lookup::charity::<S>))
    // Search
    .route("/search", get(search::handler::<S>))
    .route("/autocomplete", get(search::autocomplete::<S>))
    // Reconciliation
    .route("/reconcile", get(reconcile::get::<S>).post(reconcile::post::<S>))
    .route("/reconcile/propose_properties", get(reconcile::propose::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request, Response, StatusCode, header},
  };
  use chrono::Utc;
  use orgid_core::{Merger, OrganisationRecord, document::OrgDocument};
  use orgid_store_sqlite::SqliteStore;
  use serde_json::Value;
  use tower::ServiceExt as _;

  use super::*;

  fn ncvo_records() -> Vec<OrganisationRecord> {
    let mut charity = OrganisationRecord::new(
      "GB-CHC-225922",
      "ccew",
      "The National Council for Voluntary Organisations",
    )
    .with_org_ids(["GB-COH-00198344"]);
    charity.alternate_name = vec!["NCVO".into()];
    charity.organisation_type = vec!["Registered Charity".into()];
    charity.postal_code = Some("N1 9RL".into());

    let mut company = OrganisationRecord::new("GB-COH-00198344", "companies", "NCVO");
    company.organisation_type = vec!["Registered Company".into()];

    vec![charity, company]
  }

  async fn make_state() -> AppState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let records = ncvo_records();
    store.insert_records(&records).await.unwrap();
    store
      .insert_records(&[OrganisationRecord::new("GB-COH-1", "companies", "Acme Ltd")])
      .await
      .unwrap();

    let merged = Merger::default().merge(records).unwrap();
    let acme = Merger::default()
      .merge(vec![OrganisationRecord::new("GB-COH-1", "companies", "Acme Ltd")])
      .unwrap();
    let now = Utc::now();
    store
      .bulk_upsert(&[
        OrgDocument::from_merged(&merged, now),
        OrgDocument::from_merged(&acme, now),
      ])
      .await
      .unwrap();

    AppState {
      store:    Arc::new(store),
      settings: Arc::new(Settings {
        base_url: Some("http://localhost:8080".into()),
        ..Settings::default()
      }),
    }
  }

  /// Percent-encode for query strings and form bodies.
  fn encode(s: &str) -> String {
    s.bytes()
      .map(|b| match b {
        b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
          (b as char).to_string()
        }
        _ => format!("%{b:02X}"),
      })
      .collect()
  }

  async fn get_raw(state: AppState<SqliteStore>, uri: &str) -> Response<Body> {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    router(state).oneshot(req).await.unwrap()
  }

  async fn post_form(
    state: AppState<SqliteStore>,
    uri: &str,
    pairs: &[(&str, &str)],
  ) -> Response<Body> {
    let body = pairs
      .iter()
      .map(|(k, v)| format!("{k}={}", encode(v)))
      .collect::<Vec<_>>()
      .join("&");
    let req = Request::builder()
      .method("POST")
      .uri(uri)
      .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
      .body(Body::from(body))
      .unwrap();
    router(state).oneshot(req).await.unwrap()
  }

  async fn body_json(resp: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  // ── Lookups ─────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn orgid_lookup_merges_linked_records() {
    let state = make_state().await;
    let resp = get_raw(state, "/orgid/GB-COH-00198344.json").await;
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["id"], "GB-CHC-225922");
    assert_eq!(json["name"], "The National Council for Voluntary Organisations");
    assert_eq!(json["orgIDs"].as_array().unwrap().len(), 2);
    assert_eq!(json["sources"], serde_json::json!(["ccew", "companies"]));
  }

  #[tokio::test]
  async fn unknown_orgid_is_404_with_query() {
    let state = make_state().await;
    let resp = get_raw(state, "/orgid/GB-CHC-404.json").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let json = body_json(resp).await;
    assert_eq!(json["query"]["orgid"], "GB-CHC-404");
    assert!(json["error"].is_string());
  }

  #[tokio::test]
  async fn charity_lookup_normalizes_number() {
    let state = make_state().await;
    let resp = get_raw(state, "/charity/225922.json").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["id"], "GB-CHC-225922");
    assert_eq!(json["ccew_number"], "225922");
  }

  #[tokio::test]
  async fn company_only_organisation_is_not_a_charity() {
    let state = make_state().await;
    let resp = get_raw(state, "/orgid/GB-COH-1.json").await;
    assert_eq!(resp.status(), StatusCode::OK);

    let state = make_state().await;
    let resp = get_raw(state, "/charity/1.json").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }

  // ── Search ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn search_finds_by_alternate_name() {
    let state = make_state().await;
    let resp = get_raw(state, "/search?q=ncvo&aggregate=true").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["hits"][0]["document"]["id"], "GB-CHC-225922");
    assert!(json["aggregations"]["by_source"].is_array());
  }

  #[tokio::test]
  async fn oversized_page_is_rejected() {
    let state = make_state().await;
    let resp = get_raw(state, "/search?q=ncvo&size=1000").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn autocomplete_suggests_by_word() {
    let state = make_state().await;
    let resp = get_raw(state, "/autocomplete?q=volunt").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json[0]["value"], "GB-CHC-225922");
    assert_eq!(json[0]["orgtypes"].as_array().unwrap().len(), 2);
  }

  // ── Reconciliation ──────────────────────────────────────────────────────────

  #[tokio::test]
  async fn reconcile_without_query_returns_service_metadata() {
    let state = make_state().await;
    let resp = get_raw(state, "/reconcile").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["identifierSpace"], orgid_core::reconcile::IDENTIFIER_SPACE);
    assert_eq!(json["view"]["url"], "http://localhost:8080/orgid/{{id}}");
  }

  #[tokio::test]
  async fn reconcile_single_query_marks_exact_match() {
    let state = make_state().await;
    let resp = get_raw(state, "/reconcile?query=NCVO").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    let first = &json["result"][0];
    assert_eq!(first["id"], "GB-CHC-225922");
    assert_eq!(
      first["name"],
      "The National Council for Voluntary Organisations (GB-CHC-225922)"
    );
    // The exact hit is on an alternate name, not the main name.
    assert_eq!(first["match"], false);
  }

  #[tokio::test]
  async fn reconcile_batch_is_keyed_by_query_id() {
    let state = make_state().await;
    let queries = r#"{"q0":{"query":"Acme Ltd"},"q1":{"query":"nothing like it"}}"#;
    let resp = post_form(state, "/reconcile", &[("queries", queries)]).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["q0"]["result"][0]["id"], "GB-COH-1");
    assert_eq!(json["q0"]["result"][0]["match"], true);
    assert_eq!(json["q1"]["result"].as_array().unwrap().len(), 0);
  }

  #[tokio::test]
  async fn malformed_batch_is_a_client_error() {
    let state = make_state().await;
    let resp = post_form(state, "/reconcile", &[("queries", r#"{"q0": {"#)]).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn reconcile_extend_returns_rows_by_id() {
    let state = make_state().await;
    let extend = r#"{"ids":["GB-CHC-225922","GB-CHC-404"],"properties":[{"id":"postalCode"}]}"#;
    let resp = post_form(state, "/reconcile", &[("extend", extend)]).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["meta"][0]["id"], "postalCode");
    assert_eq!(json["rows"]["GB-CHC-225922"]["postalCode"][0]["str"], "N1 9RL");
    assert_eq!(
      json["rows"]["GB-CHC-404"]["postalCode"].as_array().unwrap().len(),
      0
    );
  }

  #[tokio::test]
  async fn callback_wraps_response_as_jsonp() {
    let state = make_state().await;
    let uri = format!("/reconcile?query={}&callback=cb", encode("Acme Ltd"));
    let resp = get_raw(state, &uri).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
      resp.headers().get(header::CONTENT_TYPE).unwrap(),
      "application/javascript"
    );
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = std::str::from_utf8(&bytes).unwrap();
    assert!(text.starts_with("cb({"));
    assert!(text.ends_with(");"));
  }

  #[tokio::test]
  async fn propose_properties_lists_fields() {
    let state = make_state().await;
    let resp = get_raw(state, "/reconcile/propose_properties?limit=3").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["properties"].as_array().unwrap().len(), 3);
  }
}
