//! Runtime settings shared by the indexer and the API server.
//!
//! Loaded by each binary from an optional TOML file layered under `ORGID_*`
//! environment variables. Every field has a default, so an empty source
//! deserializes to [`Settings::default`].

use std::path::PathBuf;

use serde::Deserialize;

use crate::{
  Merger, Priorities,
  priority::{SchemePriority, SourcePriority},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub host:             String,
  pub port:             u16,
  /// SQLite file holding the source tables and the search index.
  pub database_path:    PathBuf,
  /// Public root used in reconciliation service metadata. Falls back to
  /// `http://{host}:{port}`.
  pub base_url:         Option<String>,
  pub source_priority:  SourcePriority,
  pub scheme_priority:  SchemePriority,
  /// Documents per bulk write during indexing.
  pub bulk_limit:       usize,
  pub search_page_size: usize,
  /// Organisation types offered as reconciliation default types.
  pub key_types:        Vec<String>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      host:             "127.0.0.1".to_owned(),
      port:             8080,
      database_path:    PathBuf::from("orgid.sqlite3"),
      base_url:         None,
      source_priority:  SourcePriority::default(),
      scheme_priority:  SchemePriority::default(),
      bulk_limit:       500,
      search_page_size: 10,
      key_types:        vec![
        "Registered Charity".to_owned(),
        "Registered Company".to_owned(),
        "Education".to_owned(),
      ],
    }
  }
}

impl Settings {
  pub fn priorities(&self) -> Priorities {
    Priorities {
      sources: self.source_priority.clone(),
      schemes: self.scheme_priority.clone(),
    }
  }

  /// A merger dated today under the configured priorities.
  pub fn merger(&self) -> Merger { Merger::new(self.priorities()) }

  pub fn base_url(&self) -> String {
    match &self.base_url {
      Some(url) => url.trim_end_matches('/').to_owned(),
      None => format!("http://{}:{}", self.host, self.port),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_input_keeps_defaults() {
    let settings: Settings = serde_json::from_str(
      r#"{"port": 9000, "source_priority": ["oscr", "ccew"]}"#,
    )
    .unwrap();
    assert_eq!(settings.port, 9000);
    assert_eq!(settings.bulk_limit, 500);
    assert_eq!(settings.priorities().sources.rank("oscr"), 0);
    assert_eq!(settings.priorities().schemes.rank("GB-CHC"), 5);
    assert_eq!(settings.base_url(), "http://127.0.0.1:9000");
  }
}
