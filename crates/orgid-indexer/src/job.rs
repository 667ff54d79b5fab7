//! [`IndexJob`]: one full indexing run.

use chrono::{DateTime, SubsecRound as _, Utc};
use orgid_core::{
  Merger,
  document::OrgDocument,
  graph::LinkGraph,
  store::{OrgSource, SearchIndex},
};
use serde_json::json;

use crate::{Error, Result};

/// Documents per bulk write unless configured otherwise.
pub const DEFAULT_BULK_LIMIT: usize = 500;

/// Bulk errors quoted in the run log; the rest are only counted.
const ERROR_SAMPLE: usize = 5;
/// Characters kept from each quoted bulk error.
const ERROR_SAMPLE_LEN: usize = 200;

/// Totals for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
  pub run:           DateTime<Utc>,
  pub records:       usize,
  pub links:         usize,
  pub organisations: usize,
  pub saved:         usize,
  pub errors:        Vec<String>,
  pub deleted:       u64,
}

impl IndexReport {
  pub fn to_json(&self) -> serde_json::Value {
    json!({
      "run":           self.run.to_rfc3339(),
      "records":       self.records,
      "links":         self.links,
      "organisations": self.organisations,
      "saved":         self.saved,
      "errors":        self.errors.len(),
      "deleted":       self.deleted,
    })
  }
}

/// A single indexing run from `source` into `index`.
pub struct IndexJob<'a, S, I> {
  source:     &'a S,
  index:      &'a I,
  merger:     Merger,
  bulk_limit: usize,
  run:        DateTime<Utc>,
}

impl<'a, S, I> IndexJob<'a, S, I>
where
  S: OrgSource,
  I: SearchIndex,
{
  /// A run stamped with the current time, truncated to whole seconds so the
  /// stored timestamp compares equal to itself after a text round trip.
  pub fn new(source: &'a S, index: &'a I, merger: Merger) -> Self {
    Self {
      source,
      index,
      merger,
      bulk_limit: DEFAULT_BULK_LIMIT,
      run: Utc::now().trunc_subsecs(0),
    }
  }

  pub fn with_bulk_limit(mut self, bulk_limit: usize) -> Self {
    self.bulk_limit = bulk_limit.max(1);
    self
  }

  pub fn with_run(mut self, run: DateTime<Utc>) -> Self {
    self.run = run;
    self
  }

  pub fn run_timestamp(&self) -> DateTime<Utc> { self.run }

  pub async fn run(self) -> Result<IndexReport> {
    let records = self
      .source
      .all_records()
      .await
      .map_err(|e| Error::Source(Box::new(e)))?;
    let links = self
      .source
      .all_links()
      .await
      .map_err(|e| Error::Source(Box::new(e)))?;
    tracing::info!(records = records.len(), links = links.len(), "loaded source tables");

    let mut report = IndexReport {
      run:           self.run,
      records:       records.len(),
      links:         links.len(),
      organisations: 0,
      saved:         0,
      errors:        Vec::new(),
      deleted:       0,
    };

    let components = LinkGraph::build(&records, &links).into_components(records);
    let mut batch: Vec<OrgDocument> = Vec::with_capacity(self.bulk_limit);
    for component in components {
      let merged = self.merger.merge(component.records)?;
      tracing::debug!(id = %merged.id, ids = component.ids.len(), "merged component");
      batch.push(OrgDocument::from_merged(&merged, self.run));
      report.organisations += 1;
      if batch.len() >= self.bulk_limit {
        self.flush(&mut batch, &mut report).await;
      }
    }
    self.flush(&mut batch, &mut report).await;

    if !report.errors.is_empty() {
      let sample = error_sample(&report.errors);
      tracing::warn!(count = report.errors.len(), ?sample, "bulk write errors");
    }

    report.deleted = self
      .index
      .delete_stale(self.run)
      .await
      .map_err(|e| Error::Index(Box::new(e)))?;
    tracing::info!(deleted = report.deleted, "removed stale documents");

    Ok(report)
  }

  /// Write `batch` and fold the outcome into `report`. A failed write is
  /// recorded as one error and the run carries on.
  async fn flush(&self, batch: &mut Vec<OrgDocument>, report: &mut IndexReport) {
    if batch.is_empty() {
      return;
    }
    match self.index.bulk_upsert(batch.as_slice()).await {
      Ok(outcome) => {
        report.saved += outcome.saved;
        report.errors.extend(outcome.errors);
        tracing::info!(saved = report.saved, organisations = report.organisations, "indexed batch");
      }
      Err(e) => {
        let message = format!("batch of {} starting at {}: {e}", batch.len(), batch[0].id);
        tracing::error!(error = %message, "bulk write failed");
        report.errors.push(message);
      }
    }
    batch.clear();
  }
}

/// The first few errors, each cut to a loggable length.
fn error_sample(errors: &[String]) -> Vec<String> {
  errors
    .iter()
    .take(ERROR_SAMPLE)
    .map(|e| e.chars().take(ERROR_SAMPLE_LEN).collect())
    .collect()
}
