//! Error types for `orgid-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown field: {0:?}")]
  UnknownField(String),

  #[error("cannot merge an empty set of records")]
  EmptyMerge,

  #[error("invalid organisation record: {0}")]
  InvalidRecord(String),

  #[error("invalid organisation link: {0}")]
  InvalidLink(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
