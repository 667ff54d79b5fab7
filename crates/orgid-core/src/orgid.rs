//! Org-ids (`{scheme}-{number}` identifiers) and the registration-number
//! normalizer that produces them.

use std::{borrow::Borrow, fmt};

use serde::{Deserialize, Serialize};

/// Every canonical identifier handled by the resolver starts with this.
pub const NATIONAL_PREFIX: &str = "GB-";

pub const SCHEME_CCEW: &str = "GB-CHC";
pub const SCHEME_OSCR: &str = "GB-SC";
pub const SCHEME_CCNI: &str = "GB-NIC";
pub const SCHEME_COMPANIES: &str = "GB-COH";
pub const SCHEME_SCHOOLS: &str = "GB-EDU";
pub const SCHEME_NHS: &str = "GB-NHS";

// ─── OrgId ───────────────────────────────────────────────────────────────────

/// A globally unique organisation identifier, e.g. `GB-SC-SC007427`.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OrgId(String);

impl OrgId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }

  /// The scheme is the first two `-`-separated segments (`GB-CHC`).
  /// An identifier with fewer segments is its own scheme.
  pub fn scheme(&self) -> &str {
    match self.0.match_indices('-').nth(1) {
      Some((idx, _)) => &self.0[..idx],
      None => &self.0,
    }
  }

  /// The register-local number, i.e. everything after the scheme.
  pub fn number(&self) -> &str {
    let scheme = self.scheme();
    self.0[scheme.len()..].trim_start_matches('-')
  }

  pub fn has_scheme(&self, scheme: &str) -> bool { self.scheme() == scheme }
}

impl fmt::Display for OrgId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for OrgId {
  fn from(s: &str) -> Self { Self(s.to_owned()) }
}

impl From<String> for OrgId {
  fn from(s: String) -> Self { Self(s) }
}

impl Borrow<str> for OrgId {
  fn borrow(&self) -> &str { &self.0 }
}

impl AsRef<str> for OrgId {
  fn as_ref(&self) -> &str { &self.0 }
}

// ─── Normalizer ──────────────────────────────────────────────────────────────

/// Canonicalise a raw charity registration number into an org-id.
///
/// - Input already carrying the national `GB-` prefix is returned unchanged.
/// - Otherwise the number is uppercased, leading characters that cannot start
///   a registration number and trailing non-digits are stripped, and the
///   scheme is chosen from the first character: `S` → Scotland, `N` →
///   Northern Ireland (digits only), anything else → England & Wales.
///
/// Total: every input maps to some identifier.
pub fn normalize(raw: &str) -> OrgId {
  let trimmed = raw.trim();
  if trimmed.starts_with(NATIONAL_PREFIX) {
    return OrgId::from(trimmed);
  }

  let upper = trimmed.to_uppercase();
  let regno = upper
    .trim_start_matches(|c: char| {
      !(c.is_ascii_digit() || matches!(c, 'S' | 'C' | 'N' | 'I'))
    })
    .trim_end_matches(|c: char| !c.is_ascii_digit());

  if regno.starts_with('S') {
    OrgId(format!("{SCHEME_OSCR}-{regno}"))
  } else if regno.starts_with('N') {
    let digits: String = regno.chars().filter(char::is_ascii_digit).collect();
    OrgId(format!("{SCHEME_CCNI}-{digits}"))
  } else {
    OrgId(format!("{SCHEME_CCEW}-{regno}"))
  }
}

// ─── External registers ──────────────────────────────────────────────────────

/// A link to a page about an organisation on an external register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLink {
  pub url:   String,
  pub label: String,
}

pub const LABEL_CCEW: &str = "Charity Commission England and Wales";
pub const LABEL_OSCR: &str = "Office of Scottish Charity Regulator";
pub const LABEL_CCNI: &str = "Charity Commission Northern Ireland";

/// URL templates per scheme; `{}` is replaced with the register number.
const EXTERNAL_REGISTERS: &[(&str, &[(&str, &str)])] = &[
  (SCHEME_CCEW, &[
    (
      "https://register-of-charities.charitycommission.gov.uk/charity-details/?regid={}&subid=0",
      LABEL_CCEW,
    ),
    ("https://charitybase.uk/charities/{}", "CharityBase"),
    ("http://opencharities.org/charities/{}", "OpenCharities"),
    ("http://www.guidestar.org.uk/summary.aspx?CCReg={}", "GuideStar"),
    ("https://olib.uk/charity/html/{}", "CharityData by Olly Benson"),
  ]),
  (SCHEME_CCNI, &[(
    "http://www.charitycommissionni.org.uk/charity-details/?regid={}&subid=0",
    LABEL_CCNI,
  )]),
  (SCHEME_OSCR, &[(
    "https://www.oscr.org.uk/about-charities/search-the-register/charity-details?number={}",
    LABEL_OSCR,
  )]),
  (SCHEME_SCHOOLS, &[(
    "https://get-information-schools.service.gov.uk/Establishments/Establishment/Details/{}",
    "Get information about schools",
  )]),
  (SCHEME_NHS, &[(
    "https://odsportal.hscic.gov.uk/Organisation/Details/{}",
    "NHS Digital",
  )]),
];

/// All known external register links for the given identifiers, in input
/// order.
pub fn external_links<'a>(
  ids: impl IntoIterator<Item = &'a OrgId>,
) -> Vec<ExternalLink> {
  let mut links = Vec::new();
  for id in ids {
    let Some((_, templates)) = EXTERNAL_REGISTERS
      .iter()
      .find(|(scheme, _)| id.has_scheme(scheme))
    else {
      continue;
    };
    for (template, label) in templates.iter() {
      links.push(ExternalLink {
        url:   template.replace("{}", id.number()),
        label: (*label).to_owned(),
      });
    }
  }
  links
}
