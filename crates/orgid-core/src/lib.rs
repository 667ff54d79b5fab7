//! Core types and pure logic for the organisation identity resolver.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! storage and search backends live behind the traits in [`store`]; the
//! indexing job and the JSON API depend on this crate, never the reverse.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod charity;
pub mod document;
pub mod error;
pub mod graph;
pub mod merge;
pub mod orgid;
pub mod priority;
pub mod reconcile;
pub mod record;
pub mod resolve;
pub mod settings;
pub mod store;

pub use error::{Error, Result};
pub use merge::{MergedOrganisation, Merger};
pub use orgid::{OrgId, normalize};
pub use priority::Priorities;
pub use record::{Field, FieldValue, OrganisationLink, OrganisationRecord};
