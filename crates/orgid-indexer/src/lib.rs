//! Batch job that rebuilds the search index from the source tables.
//!
//! Every record and link is read, records are grouped into connected
//! components, each component is merged into one document, and documents
//! are written in bulk batches stamped with the run's timestamp. Documents
//! left over from earlier runs are deleted at the end.

pub mod error;
pub mod import;
pub mod job;

pub use error::{Error, Result};
pub use job::{IndexJob, IndexReport};
