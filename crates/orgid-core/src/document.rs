//! The flattened search-index document built from a merged organisation.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Field, MergedOrganisation, OrgId, record::Address};

/// Input and weight for the autocomplete field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionField {
  pub input:  Vec<String>,
  pub weight: u32,
}

/// One document in the search index. `last_updated` is the timestamp of the
/// indexing run that last wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgDocument {
  pub id:                OrgId,
  pub name:              String,
  #[serde(rename = "orgIDs")]
  pub org_ids:           Vec<OrgId>,
  pub alternate_name:    Vec<String>,
  pub organisation_type: Vec<String>,
  pub sources:           Vec<String>,
  pub active:            Option<bool>,
  pub postal_code:       Option<String>,
  pub address:           Option<Address>,
  pub charity_number:    Option<String>,
  pub company_number:    Option<String>,
  pub telephone:         Option<String>,
  pub email:             Option<String>,
  pub description:       Option<String>,
  pub url:               Option<String>,
  pub domain:            Option<String>,
  pub parent:            Option<String>,
  pub latest_income:     Option<i64>,
  pub date_registered:   Option<NaiveDate>,
  pub date_removed:      Option<NaiveDate>,
  pub date_modified:     Option<NaiveDate>,
  pub complete_names:    CompletionField,
  pub last_updated:      DateTime<Utc>,
}

impl OrgDocument {
  pub fn from_merged(org: &MergedOrganisation, last_updated: DateTime<Utc>) -> Self {
    let text = |f: Field| org.main_text(f).map(str::to_owned);

    let alternate_name: Vec<String> =
      org.names.values().map(ToString::to_string).collect();

    let all_names = std::iter::once(org.name.as_str())
      .chain(alternate_name.iter().map(String::as_str));

    Self {
      id: org.id.clone(),
      name: org.name.clone(),
      org_ids: org.org_ids.clone(),
      organisation_type: org.text_values(Field::OrganisationType),
      sources: org.sources.clone(),
      active: org.active(),
      postal_code: text(Field::PostalCode),
      address: org
        .field(Field::Address)
        .and_then(|v| v.first())
        .and_then(|e| e.value.as_address())
        .cloned(),
      charity_number: text(Field::CharityNumber),
      company_number: text(Field::CompanyNumber),
      telephone: text(Field::Telephone),
      email: text(Field::Email),
      description: text(Field::Description),
      url: text(Field::Url),
      domain: text(Field::Domain),
      parent: text(Field::Parent),
      latest_income: org.latest_income(),
      date_registered: org.main_date(Field::DateRegistered),
      date_removed: org.main_date(Field::DateRemoved),
      date_modified: org.main_date(Field::DateModified),
      complete_names: CompletionField {
        input:  complete_names(all_names),
        weight: completion_weight(org.latest_income()),
      },
      alternate_name,
      last_updated,
    }
  }

  /// Every name the document is known by, primary first.
  pub fn all_names(&self) -> impl Iterator<Item = &str> {
    std::iter::once(self.name.as_str())
      .chain(self.alternate_name.iter().map(String::as_str))
  }
}

/// Every trailing word sequence of every name, so that "Council for
/// Voluntary Organisations" completes from "coun", "vol" or "org".
pub fn complete_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
  let mut out = BTreeSet::new();
  for name in names {
    let words: Vec<&str> = name.split_whitespace().collect();
    for start in 0..words.len() {
      out.insert(words[start..].join(" "));
    }
  }
  out.into_iter().collect()
}

/// `max(1, ceil(ln(1 + income)))`: monotonic in income, at least one.
pub fn completion_weight(latest_income: Option<i64>) -> u32 {
  let income = latest_income.unwrap_or(0).max(0) as f64;
  (income.ln_1p().ceil() as u32).max(1)
}
