//! SQLite backend for the organisation resolver.
//!
//! One database file holds both the source tables (records and links, as
//! loaded by the importer) and the search index written by the indexing
//! job. All access goes through [`tokio_rusqlite`] so queries run on a
//! dedicated thread without blocking the async runtime.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
