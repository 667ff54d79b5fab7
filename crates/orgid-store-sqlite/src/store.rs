//! [`SqliteStore`]: the SQLite implementation of [`OrgSource`] and
//! [`SearchIndex`].

use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, Utc};
use orgid_core::{
  OrgId, OrganisationLink, OrganisationRecord,
  document::OrgDocument,
  store::{
    AutocompleteQuery, BulkOutcome, FacetCount, Facets, OrgSource, SearchHit,
    SearchIndex, SearchQuery, SearchResults, relevance,
  },
};

use crate::{
  Result,
  encode::{
    RawDocument, RawLink, RawRecord, decode_document, decode_dt, decode_record,
    encode_dt, id_strings, placeholders,
  },
  schema::SCHEMA,
};

/// Completions returned when a query does not set its own limit.
pub const DEFAULT_AUTOCOMPLETE_LIMIT: usize = 10;

// ─── Store ───────────────────────────────────────────────────────────────────

/// Source tables and search index backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Round-trip a trivial query; binaries call this before serving.
  pub async fn ping(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Source writes ─────────────────────────────────────────────────────────

  /// Insert or replace records keyed by `(id, source)`.
  pub async fn insert_records(&self, records: &[OrganisationRecord]) -> Result<usize> {
    let raws = records
      .iter()
      .map(RawRecord::encode)
      .collect::<Result<Vec<_>>>()?;

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut upsert = tx.prepare(
            "INSERT INTO organisation (id, source, record_json) VALUES (?1, ?2, ?3)
             ON CONFLICT (id, source) DO UPDATE SET record_json = excluded.record_json",
          )?;
          let mut clear_ids = tx.prepare(
            "DELETE FROM organisation_org_ids WHERE id = ?1 AND source = ?2",
          )?;
          let mut insert_id = tx.prepare(
            "INSERT INTO organisation_org_ids (org_id, id, source) VALUES (?1, ?2, ?3)",
          )?;
          for raw in &raws {
            upsert.execute(rusqlite::params![raw.id, raw.source, raw.record_json])?;
            clear_ids.execute(rusqlite::params![raw.id, raw.source])?;
            for org_id in &raw.org_ids {
              insert_id.execute(rusqlite::params![org_id, raw.id, raw.source])?;
            }
          }
        }
        tx.commit()?;
        Ok(raws.len())
      })
      .await?;
    Ok(written)
  }

  /// Insert or replace links keyed by `(a, b, source)`.
  pub async fn insert_links(&self, links: &[OrganisationLink]) -> Result<usize> {
    let raws: Vec<RawLink> = links.iter().map(RawLink::encode).collect();

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut upsert = tx.prepare(
            "INSERT INTO linked_organisations
               (organisation_id_a, organisation_id_b, source, description)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (organisation_id_a, organisation_id_b, source)
             DO UPDATE SET description = excluded.description",
          )?;
          for raw in &raws {
            upsert.execute(rusqlite::params![
              raw.organisation_id_a,
              raw.organisation_id_b,
              raw.source,
              raw.description,
            ])?;
          }
        }
        tx.commit()?;
        Ok(raws.len())
      })
      .await?;
    Ok(written)
  }

  /// Timestamp of the most recent indexing run, if any document exists.
  pub async fn last_indexed(&self) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT MAX(last_updated) FROM organisation_index",
          [],
          |row| row.get(0),
        )?)
      })
      .await?;
    raw.as_deref().map(decode_dt).transpose()
  }

  async fn query_documents(
    &self,
    sql: String,
    params: Vec<String>,
  ) -> Result<Vec<OrgDocument>> {
    let raws: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    raws.iter().map(|s| decode_document(s)).collect()
  }
}

fn write_document(conn: &rusqlite::Connection, raw: &RawDocument) -> rusqlite::Result<()> {
  conn.execute(
    "DELETE FROM organisation_index_ids WHERE id = ?1",
    rusqlite::params![raw.id],
  )?;
  conn.execute(
    "DELETE FROM organisation_index_completions WHERE id = ?1",
    rusqlite::params![raw.id],
  )?;
  conn.execute(
    "INSERT INTO organisation_index (id, name, search_text, document_json, last_updated)
     VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT (id) DO UPDATE SET
       name          = excluded.name,
       search_text   = excluded.search_text,
       document_json = excluded.document_json,
       last_updated  = excluded.last_updated",
    rusqlite::params![
      raw.id,
      raw.name,
      raw.search_text,
      raw.document_json,
      raw.last_updated,
    ],
  )?;

  let mut insert_id = conn.prepare_cached(
    "INSERT INTO organisation_index_ids (org_id, id) VALUES (?1, ?2)",
  )?;
  for org_id in &raw.org_ids {
    insert_id.execute(rusqlite::params![org_id, raw.id])?;
  }

  let mut insert_completion = conn.prepare_cached(
    "INSERT INTO organisation_index_completions (input, id, weight) VALUES (?1, ?2, ?3)",
  )?;
  for input in &raw.completions {
    insert_completion.execute(rusqlite::params![input, raw.id, raw.weight])?;
  }
  Ok(())
}

/// Escape `%`, `_` and `\` for a `LIKE … ESCAPE '\'` pattern.
fn escape_like(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for c in s.chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out
}

// ─── OrgSource impl ──────────────────────────────────────────────────────────

impl OrgSource for SqliteStore {
  type Error = crate::Error;

  async fn all_records(&self) -> Result<Vec<OrganisationRecord>> {
    let raws: Vec<String> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT record_json FROM organisation ORDER BY rowid")?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    raws.iter().map(|s| decode_record(s)).collect()
  }

  async fn all_links(&self) -> Result<Vec<OrganisationLink>> {
    let raws: Vec<RawLink> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT organisation_id_a, organisation_id_b, source, description
           FROM linked_organisations ORDER BY rowid",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawLink {
              organisation_id_a: row.get(0)?,
              organisation_id_b: row.get(1)?,
              source:            row.get(2)?,
              description:       row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(raws.into_iter().map(RawLink::into_link).collect())
  }

  async fn records_for_ids(&self, ids: &[OrgId]) -> Result<Vec<OrganisationRecord>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }
    let ids = id_strings(ids);

    let raws: Vec<String> = self
      .conn
      .call(move |conn| {
        let list = placeholders(ids.len());
        let sql = format!(
          "SELECT record_json FROM organisation o
           WHERE o.id IN ({list})
              OR EXISTS (
                SELECT 1 FROM organisation_org_ids x
                WHERE x.id = o.id AND x.source = o.source AND x.org_id IN ({list})
              )
           ORDER BY o.rowid"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(ids.iter()), |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    raws.iter().map(|s| decode_record(s)).collect()
  }

  async fn links_for_ids(&self, ids: &[OrgId]) -> Result<Vec<OrganisationLink>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }
    let ids = id_strings(ids);

    let raws: Vec<RawLink> = self
      .conn
      .call(move |conn| {
        let list = placeholders(ids.len());
        let sql = format!(
          "SELECT organisation_id_a, organisation_id_b, source, description
           FROM linked_organisations
           WHERE organisation_id_a IN ({list}) OR organisation_id_b IN ({list})
           ORDER BY rowid"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(ids.iter()), |row| {
            Ok(RawLink {
              organisation_id_a: row.get(0)?,
              organisation_id_b: row.get(1)?,
              source:            row.get(2)?,
              description:       row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(raws.into_iter().map(RawLink::into_link).collect())
  }
}

// ─── SearchIndex impl ────────────────────────────────────────────────────────

impl SearchIndex for SqliteStore {
  type Error = crate::Error;

  async fn bulk_upsert(&self, docs: &[OrgDocument]) -> Result<BulkOutcome> {
    let mut errors = Vec::new();
    let mut raws = Vec::with_capacity(docs.len());
    for doc in docs {
      match RawDocument::encode(doc) {
        Ok(raw) => raws.push(raw),
        Err(e) => errors.push(format!("{}: {e}", doc.id)),
      }
    }

    let (saved, write_errors) = self
      .conn
      .call(move |conn| {
        let mut tx = conn.transaction()?;
        let mut saved = 0;
        let mut errors = Vec::new();
        for raw in &raws {
          // A failed document rolls back to its savepoint only.
          let sp = tx.savepoint()?;
          match write_document(&sp, raw) {
            Ok(()) => {
              sp.commit()?;
              saved += 1;
            }
            Err(e) => errors.push(format!("{}: {e}", raw.id)),
          }
        }
        tx.commit()?;
        Ok((saved, errors))
      })
      .await?;

    errors.extend(write_errors);
    Ok(BulkOutcome { saved, errors })
  }

  async fn delete_stale(&self, run: DateTime<Utc>) -> Result<u64> {
    let run = encode_dt(run);

    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM organisation_index_ids WHERE id IN
             (SELECT id FROM organisation_index WHERE last_updated != ?1)",
          rusqlite::params![run],
        )?;
        tx.execute(
          "DELETE FROM organisation_index_completions WHERE id IN
             (SELECT id FROM organisation_index WHERE last_updated != ?1)",
          rusqlite::params![run],
        )?;
        let deleted = tx.execute(
          "DELETE FROM organisation_index WHERE last_updated != ?1",
          rusqlite::params![run],
        )?;
        tx.commit()?;
        Ok(deleted)
      })
      .await?;
    Ok(deleted as u64)
  }

  async fn find_by_org_ids(&self, ids: &[OrgId]) -> Result<Vec<OrgDocument>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }
    let sql = format!(
      "SELECT document_json FROM organisation_index
       WHERE id IN (SELECT id FROM organisation_index_ids WHERE org_id IN ({}))
       ORDER BY name, id",
      placeholders(ids.len())
    );
    self.query_documents(sql, id_strings(ids)).await
  }

  async fn search(&self, query: &SearchQuery) -> Result<SearchResults> {
    let term = query
      .term
      .as_deref()
      .map(str::trim)
      .filter(|t| !t.is_empty())
      .map(str::to_lowercase);

    // Phase 1: LIKE prefilter in SQL. Phase 2: score, filter and page here.
    let docs = match &term {
      Some(t) => {
        self
          .query_documents(
            "SELECT document_json FROM organisation_index
             WHERE search_text LIKE ?1 ESCAPE '\\'
             ORDER BY name, id"
              .to_owned(),
            vec![format!("%{}%", escape_like(t))],
          )
          .await?
      }
      None => {
        self
          .query_documents(
            "SELECT document_json FROM organisation_index ORDER BY name, id"
              .to_owned(),
            Vec::new(),
          )
          .await?
      }
    };

    Ok(rank(docs, term.as_deref().unwrap_or(""), query))
  }

  async fn autocomplete(&self, query: &AutocompleteQuery) -> Result<Vec<OrgDocument>> {
    let prefix = query.prefix.trim().to_lowercase();
    if prefix.is_empty() {
      return Ok(Vec::new());
    }
    let limit = if query.limit == 0 { DEFAULT_AUTOCOMPLETE_LIMIT } else { query.limit };

    let docs = self
      .query_documents(
        "SELECT d.document_json
         FROM organisation_index_completions c
         JOIN organisation_index d ON d.id = c.id
         WHERE c.input LIKE ?1 ESCAPE '\\'
         GROUP BY d.id
         ORDER BY MAX(c.weight) DESC, d.name"
          .to_owned(),
        vec![format!("{}%", escape_like(&prefix))],
      )
      .await?;

    Ok(
      docs
        .into_iter()
        .filter(|d| any_of(&query.organisation_types, &d.organisation_type))
        .take(limit)
        .collect(),
    )
  }

  async fn count(&self) -> Result<u64> {
    let n: i64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM organisation_index", [], |row| {
          row.get(0)
        })?)
      })
      .await?;
    Ok(n as u64)
  }
}

// ─── Ranking ─────────────────────────────────────────────────────────────────

/// True when `wanted` is empty or shares a value with `have`.
fn any_of(wanted: &[String], have: &[String]) -> bool {
  wanted.is_empty() || have.iter().any(|h| wanted.contains(h))
}

/// Score, filter, sort and page prefiltered documents.
fn rank(docs: Vec<OrgDocument>, term: &str, query: &SearchQuery) -> SearchResults {
  let mut hits: Vec<SearchHit> = docs
    .into_iter()
    .filter(|d| any_of(&query.organisation_types, &d.organisation_type))
    .filter(|d| any_of(&query.sources, &d.sources))
    .filter(|d| !query.active_only || d.active == Some(true))
    .filter_map(|document| {
      let score = relevance(&document, term)?;
      Some(SearchHit { score, document })
    })
    .collect();

  hits.sort_by(|a, b| {
    b.score
      .total_cmp(&a.score)
      .then_with(|| a.document.name.cmp(&b.document.name))
  });

  let aggregations = query.aggregate.then(|| facets(&hits));
  let total = hits.len();
  let max_score = hits.first().map(|h| h.score);
  let hits = hits
    .into_iter()
    .skip(query.offset())
    .take(query.size)
    .collect();

  SearchResults { total, max_score, hits, aggregations }
}

fn facets(hits: &[SearchHit]) -> Facets {
  fn sorted(counts: BTreeMap<&str, usize>) -> Vec<FacetCount> {
    let mut out: Vec<FacetCount> = counts
      .into_iter()
      .map(|(key, count)| FacetCount { key: key.to_owned(), count })
      .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    out
  }

  let mut by_type = BTreeMap::new();
  let mut by_source = BTreeMap::new();
  for hit in hits {
    for t in &hit.document.organisation_type {
      *by_type.entry(t.as_str()).or_default() += 1;
    }
    for s in &hit.document.sources {
      *by_source.entry(s.as_str()).or_default() += 1;
    }
  }
  Facets { by_type: sorted(by_type), by_source: sorted(by_source) }
}
