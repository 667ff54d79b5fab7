//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{TimeZone, Utc};
use orgid_core::{
  Merger, OrgId, OrganisationLink, OrganisationRecord,
  document::OrgDocument,
  store::{AutocompleteQuery, OrgSource, SearchIndex, SearchQuery},
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn document(id: &str, name: &str, types: &[&str]) -> OrgDocument {
  document_at(id, name, types, Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
}

fn document_at(
  id: &str,
  name: &str,
  types: &[&str],
  run: chrono::DateTime<Utc>,
) -> OrgDocument {
  let mut record = OrganisationRecord::new(id, "ccew", name);
  record.organisation_type = types.iter().map(|s| s.to_string()).collect();
  let merged = Merger::default().merge(vec![record]).unwrap();
  OrgDocument::from_merged(&merged, run)
}

// ─── Source tables ───────────────────────────────────────────────────────────

#[tokio::test]
async fn records_round_trip_in_insertion_order() {
  let s = store().await;
  let mut first = OrganisationRecord::new("GB-CHC-225922", "ccew", "NCVO");
  first.postal_code = Some("N1 9RL".into());
  let second = OrganisationRecord::new("GB-COH-00198344", "companies", "NCVO");
  s.insert_records(&[first.clone(), second.clone()]).await.unwrap();

  let all = s.all_records().await.unwrap();
  assert_eq!(all, vec![first, second]);
}

#[tokio::test]
async fn reinserting_a_record_replaces_it() {
  let s = store().await;
  let old = OrganisationRecord::new("GB-CHC-1", "ccew", "Old Name");
  let new = OrganisationRecord::new("GB-CHC-1", "ccew", "New Name");
  s.insert_records(&[old]).await.unwrap();
  s.insert_records(&[new]).await.unwrap();

  let all = s.all_records().await.unwrap();
  assert_eq!(all.len(), 1);
  assert_eq!(all[0].name, "New Name");
}

#[tokio::test]
async fn records_for_ids_follows_org_ids() {
  let s = store().await;
  s.insert_records(&[
    OrganisationRecord::new("GB-CHC-225922", "ccew", "NCVO")
      .with_org_ids(["GB-COH-00198344"]),
    OrganisationRecord::new("GB-CHC-1", "ccew", "Other"),
  ])
  .await
  .unwrap();

  let found = s
    .records_for_ids(&[OrgId::from("GB-COH-00198344")])
    .await
    .unwrap();
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].id.as_str(), "GB-CHC-225922");

  assert!(s.records_for_ids(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn links_for_ids_matches_either_end() {
  let s = store().await;
  s.insert_links(&[
    OrganisationLink::new("GB-CHC-1", "GB-COH-2", "ccew"),
    OrganisationLink::new("GB-EDU-3", "GB-CHC-1", "gias"),
    OrganisationLink::new("GB-EDU-4", "GB-EDU-5", "gias"),
  ])
  .await
  .unwrap();

  let found = s.links_for_ids(&[OrgId::from("GB-CHC-1")]).await.unwrap();
  assert_eq!(found.len(), 2);
  assert_eq!(s.all_links().await.unwrap().len(), 3);
}

// ─── Search index ────────────────────────────────────────────────────────────

#[tokio::test]
async fn bulk_upsert_then_find_by_org_ids() {
  let s = store().await;
  let doc = document("GB-CHC-225922", "NCVO", &[]);
  let outcome = s.bulk_upsert(&[doc.clone()]).await.unwrap();
  assert_eq!(outcome.saved, 1);
  assert!(outcome.errors.is_empty());

  let found = s
    .find_by_org_ids(&[OrgId::from("GB-CHC-225922")])
    .await
    .unwrap();
  assert_eq!(found, vec![doc]);
  assert_eq!(s.count().await.unwrap(), 1);
}

#[tokio::test]
async fn upserting_same_id_keeps_one_document() {
  let s = store().await;
  s.bulk_upsert(&[document("GB-CHC-1", "First", &[])]).await.unwrap();
  s.bulk_upsert(&[document("GB-CHC-1", "Second", &[])]).await.unwrap();
  assert_eq!(s.count().await.unwrap(), 1);

  let found = s.find_by_org_ids(&[OrgId::from("GB-CHC-1")]).await.unwrap();
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].name, "Second");
}

#[tokio::test]
async fn delete_stale_removes_documents_from_older_runs() {
  let s = store().await;
  let old_run = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
  let new_run = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
  s.bulk_upsert(&[
    document_at("GB-CHC-1", "Kept", &[], new_run),
    document_at("GB-CHC-2", "Gone", &[], old_run),
  ])
  .await
  .unwrap();

  assert_eq!(s.delete_stale(new_run).await.unwrap(), 1);
  assert_eq!(s.count().await.unwrap(), 1);
  assert!(
    s.find_by_org_ids(&[OrgId::from("GB-CHC-2")])
      .await
      .unwrap()
      .is_empty()
  );
  assert_eq!(s.last_indexed().await.unwrap(), Some(new_run));
}

#[tokio::test]
async fn search_ranks_exact_names_first_and_pages() {
  let s = store().await;
  s.bulk_upsert(&[
    document("GB-CHC-1", "NCVO Trading", &["Registered Company"]),
    document("GB-CHC-2", "NCVO", &["Registered Charity"]),
    document("GB-CHC-3", "Oxfam", &["Registered Charity"]),
  ])
  .await
  .unwrap();

  let results = s
    .search(&SearchQuery { aggregate: true, ..SearchQuery::for_term("ncvo") })
    .await
    .unwrap();
  assert_eq!(results.total, 2);
  assert_eq!(results.hits[0].document.name, "NCVO");
  assert_eq!(results.max_score, Some(results.hits[0].score));

  let facets = results.aggregations.unwrap();
  assert_eq!(facets.by_type.len(), 2);
  assert_eq!(facets.by_source[0].key, "ccew");
  assert_eq!(facets.by_source[0].count, 2);

  let page_two = s
    .search(&SearchQuery { page: 2, size: 1, ..SearchQuery::for_term("ncvo") })
    .await
    .unwrap();
  assert_eq!(page_two.total, 2);
  assert_eq!(page_two.hits.len(), 1);
  assert_eq!(page_two.hits[0].document.name, "NCVO Trading");
}

#[tokio::test]
async fn search_filters_by_type() {
  let s = store().await;
  s.bulk_upsert(&[
    document("GB-CHC-1", "NCVO Trading", &["Registered Company"]),
    document("GB-CHC-2", "NCVO", &["Registered Charity"]),
  ])
  .await
  .unwrap();

  let results = s
    .search(&SearchQuery {
      organisation_types: vec!["Registered Company".into()],
      ..SearchQuery::for_term("ncvo")
    })
    .await
    .unwrap();
  assert_eq!(results.total, 1);
  assert_eq!(results.hits[0].document.id.as_str(), "GB-CHC-1");
}

#[tokio::test]
async fn like_wildcards_in_terms_are_literal() {
  let s = store().await;
  s.bulk_upsert(&[document("GB-CHC-1", "NCVO", &[])]).await.unwrap();
  let results = s.search(&SearchQuery::for_term("%")).await.unwrap();
  assert_eq!(results.total, 0);
}

#[tokio::test]
async fn autocomplete_matches_word_suffixes() {
  let s = store().await;
  s.bulk_upsert(&[
    document("GB-CHC-1", "National Council for Voluntary Organisations", &[]),
    document("GB-CHC-2", "Oxfam", &[]),
  ])
  .await
  .unwrap();

  let found = s
    .autocomplete(&AutocompleteQuery { prefix: "volun".into(), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].id.as_str(), "GB-CHC-1");

  let none = s
    .autocomplete(&AutocompleteQuery { prefix: "  ".into(), ..Default::default() })
    .await
    .unwrap();
  assert!(none.is_empty());
}

#[tokio::test]
async fn ping_succeeds_on_open_store() {
  store().await.ping().await.unwrap();
}
