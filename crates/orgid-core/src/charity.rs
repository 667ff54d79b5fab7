//! Registered-charity projection of a merged organisation.

use chrono::NaiveDate;
use serde::Serialize;

use crate::{
  Field, MergedOrganisation, OrgId,
  orgid::{
    LABEL_CCEW, LABEL_CCNI, LABEL_OSCR, SCHEME_CCEW, SCHEME_CCNI, SCHEME_OSCR,
    normalize,
  },
  priority::CHARITY_SOURCES,
};

/// One known name of a charity, with the sources that report it joined by
/// `+`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharityName {
  pub name:   String,
  pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharityGeo {
  pub postcode: Option<String>,
}

/// The charity-register view served for charity-number lookups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharityView {
  pub id:              OrgId,
  pub active:          Option<bool>,
  pub known_as:        String,
  pub names:           Vec<CharityName>,
  pub geo:             CharityGeo,
  pub url:             Option<String>,
  pub domain:          Option<String>,
  pub latest_income:   Option<i64>,
  pub parent:          Option<String>,
  pub company_number:  Option<String>,
  pub ccew_number:     Option<String>,
  pub oscr_number:     Option<String>,
  pub ccni_number:     Option<String>,
  pub ccew_link:       Option<String>,
  pub oscr_link:       Option<String>,
  pub ccni_link:       Option<String>,
  pub date_registered: Option<NaiveDate>,
  pub date_removed:    Option<NaiveDate>,
  pub last_modified:   Option<NaiveDate>,
  #[serde(rename = "org-ids")]
  pub org_ids:         Vec<OrgId>,
  pub alt_names:       Vec<String>,
}

impl MergedOrganisation {
  /// The charity view, or `None` when no charity regulator contributed.
  pub fn as_charity(&self) -> Option<CharityView> {
    if !CHARITY_SOURCES.iter().any(|s| self.has_source(s)) {
      return None;
    }

    let names = [Field::Name, Field::AlternateName]
      .into_iter()
      .filter_map(|f| self.field(f))
      .flat_map(|values| values.iter())
      .map(|entry| CharityName {
        name:   entry.value.to_string(),
        source: entry.sources.join("+"),
      })
      .collect();

    let postcode = self
      .field(Field::Address)
      .and_then(|v| v.first())
      .and_then(|e| e.value.as_address())
      .and_then(|a| a.postal_code.clone())
      .or_else(|| self.main_text(Field::PostalCode).map(str::to_owned));

    let mut view = CharityView {
      id: self.id.clone(),
      active: self.active(),
      known_as: self.name.clone(),
      names,
      geo: CharityGeo { postcode },
      url: self.main_text(Field::Url).map(str::to_owned),
      domain: self.main_text(Field::Domain).map(str::to_owned),
      latest_income: self.latest_income(),
      parent: self.main_text(Field::Parent).map(str::to_owned),
      company_number: self.main_text(Field::CompanyNumber).map(str::to_owned),
      ccew_number: None,
      oscr_number: None,
      ccni_number: None,
      ccew_link: None,
      oscr_link: None,
      ccni_link: None,
      date_registered: self.main_date(Field::DateRegistered),
      date_removed: self.main_date(Field::DateRemoved),
      last_modified: self.main_date(Field::DateModified),
      org_ids: self.org_ids.clone(),
      alt_names: self.text_values(Field::AlternateName),
    };

    for link in self.links() {
      let slot = match link.label.as_str() {
        LABEL_CCEW => &mut view.ccew_link,
        LABEL_OSCR => &mut view.oscr_link,
        LABEL_CCNI => &mut view.ccni_link,
        _ => continue,
      };
      slot.get_or_insert(link.url);
    }

    for id in &self.org_ids {
      let slot = match id.scheme() {
        SCHEME_CCEW => &mut view.ccew_number,
        SCHEME_OSCR => &mut view.oscr_number,
        SCHEME_CCNI => &mut view.ccni_number,
        _ => continue,
      };
      if slot.is_none() {
        // Re-normalising strips any stray formatting from the number.
        *slot = Some(normalize(id.number()).number().to_owned());
      }
    }

    Some(view)
  }
}
