//! Loading source tables from JSON-lines files.
//!
//! Each non-blank line holds one record or one link. Lines that fail to
//! parse are reported with their line number and skipped; they never abort
//! the import.

use std::io::BufRead;

use orgid_core::{OrganisationLink, OrganisationRecord};

use crate::Result;

/// Parsed rows plus one message per rejected line.
#[derive(Debug, Clone, Default)]
pub struct Parsed<T> {
  pub rows:     Vec<T>,
  pub rejected: Vec<String>,
}

fn parse_lines<T>(
  reader: impl BufRead,
  parse: impl Fn(&str) -> orgid_core::Result<T>,
) -> Result<Parsed<T>> {
  let mut parsed = Parsed { rows: Vec::new(), rejected: Vec::new() };
  for (i, line) in reader.lines().enumerate() {
    let line = line?;
    if line.trim().is_empty() {
      continue;
    }
    match parse(&line) {
      Ok(row) => parsed.rows.push(row),
      Err(e) => parsed.rejected.push(format!("line {}: {e}", i + 1)),
    }
  }
  Ok(parsed)
}

pub fn read_records(reader: impl BufRead) -> Result<Parsed<OrganisationRecord>> {
  parse_lines(reader, OrganisationRecord::from_json)
}

pub fn read_links(reader: impl BufRead) -> Result<Parsed<OrganisationLink>> {
  parse_lines(reader, OrganisationLink::from_json)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bad_lines_are_rejected_not_fatal() {
    let input = concat!(
      r#"{"id":"GB-CHC-1","name":"One","source":"ccew","active":true}"#,
      "\n\n",
      r#"{"id":"GB-CHC-2","name":"Two","source":"ccew","active":true,"shoeSize":9}"#,
      "\n",
      r#"{"id":"GB-CHC-3","name":"Three","source":"ccew","active":false,"dateRegistered":"2001-02-03 00:00:00"}"#,
      "\n",
    );
    let parsed = read_records(input.as_bytes()).unwrap();
    assert_eq!(parsed.rows.len(), 2);
    assert_eq!(parsed.rejected.len(), 1);
    assert!(parsed.rejected[0].starts_with("line 3:"));
    assert_eq!(parsed.rows[0].org_ids, vec!["GB-CHC-1".into()]);
  }

  #[test]
  fn links_parse_with_optional_description() {
    let input = concat!(
      r#"{"organisationIdA":"GB-CHC-1","organisationIdB":"GB-COH-2","source":"ccew"}"#,
      "\n",
      r#"{"organisationIdA":"GB-CHC-1","organisationIdB":"","source":"ccew"}"#,
    );
    let parsed = read_links(input.as_bytes()).unwrap();
    assert_eq!(parsed.rows.len(), 1);
    assert_eq!(parsed.rejected.len(), 1);
  }
}
