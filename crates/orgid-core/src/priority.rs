//! Source and scheme priority rankings.
//!
//! Both rankings are total: an unlisted source or scheme is always ranked
//! below every listed one, never interleaved with them.

use serde::{Deserialize, Serialize};

use crate::orgid::{
  SCHEME_CCEW, SCHEME_CCNI, SCHEME_COMPANIES, SCHEME_OSCR, SCHEME_SCHOOLS,
};

pub const DEFAULT_SOURCE_PRIORITY: &[&str] =
  &["ccew", "oscr", "ccni", "companies", "gias"];

pub const DEFAULT_SCHEME_PRIORITY: &[&str] = &[
  SCHEME_CCEW,
  SCHEME_OSCR,
  SCHEME_CCNI,
  SCHEME_COMPANIES,
  SCHEME_SCHOOLS,
];

/// Sources that make a merged organisation a registered charity.
pub const CHARITY_SOURCES: &[&str] = &["ccew", "oscr", "ccni"];

// ─── Sources ─────────────────────────────────────────────────────────────────

/// Ordered list of data-provider codes, most trusted first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourcePriority(Vec<String>);

impl SourcePriority {
  pub fn new<I, S>(order: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self(order.into_iter().map(Into::into).collect())
  }

  /// Position in the list; unknown sources share the rank `len()`, after
  /// every known source. Lower is better.
  pub fn rank(&self, source: &str) -> usize {
    self
      .0
      .iter()
      .position(|s| s == source)
      .unwrap_or(self.0.len())
  }

  /// Deduplicate `sources` and order them by rank. Unknown sources keep
  /// their first-seen order after the known ones.
  pub fn order<'a>(&self, sources: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut unique: Vec<&str> = Vec::new();
    for s in sources {
      if !unique.contains(&s) {
        unique.push(s);
      }
    }
    unique.sort_by_key(|s| self.rank(s));
    unique.into_iter().map(str::to_owned).collect()
  }

  pub fn as_slice(&self) -> &[String] { &self.0 }
}

impl Default for SourcePriority {
  fn default() -> Self { Self::new(DEFAULT_SOURCE_PRIORITY.iter().copied()) }
}

// ─── Schemes ─────────────────────────────────────────────────────────────────

/// Ordered list of identifier schemes, most authoritative first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemePriority(Vec<String>);

impl SchemePriority {
  pub fn new<I, S>(order: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self(order.into_iter().map(Into::into).collect())
  }

  /// Score for identifier selection. The first listed scheme scores
  /// `len()`, the last `1`, and unknown schemes `0`. Higher is better.
  pub fn rank(&self, scheme: &str) -> u32 {
    match self.0.iter().position(|s| s == scheme) {
      Some(pos) => (self.0.len() - pos) as u32,
      None => 0,
    }
  }

  pub fn as_slice(&self) -> &[String] { &self.0 }
}

impl Default for SchemePriority {
  fn default() -> Self { Self::new(DEFAULT_SCHEME_PRIORITY.iter().copied()) }
}

// ─── Both ────────────────────────────────────────────────────────────────────

/// The pair of rankings a merge runs under.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Priorities {
  pub sources: SourcePriority,
  pub schemes: SchemePriority,
}
