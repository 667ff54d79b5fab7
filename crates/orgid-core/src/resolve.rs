//! Single-organisation resolution against an [`OrgSource`].
//!
//! Starting from one identifier, records and links are fetched hop by hop
//! until no new identifiers appear. The component containing the starting
//! identifier is then merged.

use std::collections::{BTreeSet, HashSet};

use crate::{
  Merger, MergedOrganisation, OrgId, OrganisationLink, OrganisationRecord,
  graph::LinkGraph, store::OrgSource,
};

/// Everything fetched for one component.
#[derive(Debug, Clone, Default)]
pub struct Neighbourhood {
  pub ids:     BTreeSet<OrgId>,
  pub records: Vec<OrganisationRecord>,
  pub links:   Vec<OrganisationLink>,
}

pub struct Resolver<'a, S> {
  source: &'a S,
  merger: &'a Merger,
}

impl<'a, S> Resolver<'a, S>
where
  S: OrgSource,
  S::Error: From<crate::Error>,
{
  pub fn new(source: &'a S, merger: &'a Merger) -> Self { Self { source, merger } }

  /// Fetch records and links reachable from `id`.
  pub async fn neighbourhood(&self, id: &OrgId) -> Result<Neighbourhood, S::Error> {
    let mut found = Neighbourhood::default();
    let mut record_keys: HashSet<(OrgId, String)> = HashSet::new();
    let mut link_keys: HashSet<(OrgId, OrgId, String)> = HashSet::new();
    let mut frontier = vec![id.clone()];
    found.ids.insert(id.clone());

    // Each id enters the frontier at most once, so this ends.
    while !frontier.is_empty() {
      let records = self.source.records_for_ids(&frontier).await?;
      let links = self.source.links_for_ids(&frontier).await?;

      let mut next = Vec::new();
      let mut discover = |id: &OrgId, ids: &mut BTreeSet<OrgId>| {
        if ids.insert(id.clone()) {
          next.push(id.clone());
        }
      };
      for record in records {
        if !record_keys.insert((record.id.clone(), record.source.clone())) {
          continue;
        }
        discover(&record.id, &mut found.ids);
        for other in &record.org_ids {
          discover(other, &mut found.ids);
        }
        found.records.push(record);
      }
      for link in links {
        let key = (
          link.organisation_id_a.clone(),
          link.organisation_id_b.clone(),
          link.source.clone(),
        );
        if !link_keys.insert(key) {
          continue;
        }
        discover(&link.organisation_id_a, &mut found.ids);
        discover(&link.organisation_id_b, &mut found.ids);
        found.links.push(link);
      }
      frontier = next;
    }
    tracing::debug!(%id, ids = found.ids.len(), records = found.records.len(), "expanded component");
    Ok(found)
  }

  /// Resolve `id` to its merged organisation, or `None` when no record
  /// carries it.
  pub async fn merge_organisation(
    &self,
    id: &OrgId,
  ) -> Result<Option<MergedOrganisation>, S::Error> {
    let found = self.neighbourhood(id).await?;
    if found.records.is_empty() {
      return Ok(None);
    }

    let graph = LinkGraph::build(&found.records, &found.links);
    let members: HashSet<OrgId> = graph.component_of(id).into_iter().collect();
    let records: Vec<OrganisationRecord> = found
      .records
      .into_iter()
      .filter(|r| members.contains(&r.id))
      .collect();
    if records.is_empty() {
      return Ok(None);
    }
    Ok(Some(self.merge_records(records)?))
  }

  /// Merge an already-grouped set of records.
  pub fn merge_records(
    &self,
    records: Vec<OrganisationRecord>,
  ) -> Result<MergedOrganisation, S::Error> {
    Ok(self.merger.merge(records)?)
  }
}

#[cfg(test)]
mod tests {
  use std::future::Future;

  use super::*;
  use crate::Error;

  #[derive(Default)]
  struct MemorySource {
    records: Vec<OrganisationRecord>,
    links:   Vec<OrganisationLink>,
  }

  impl OrgSource for MemorySource {
    type Error = Error;

    fn all_records(
      &self,
    ) -> impl Future<Output = Result<Vec<OrganisationRecord>, Error>> + Send + '_
    {
      async move { Ok(self.records.clone()) }
    }

    fn all_links(
      &self,
    ) -> impl Future<Output = Result<Vec<OrganisationLink>, Error>> + Send + '_
    {
      async move { Ok(self.links.clone()) }
    }

    fn records_for_ids<'a>(
      &'a self,
      ids: &'a [OrgId],
    ) -> impl Future<Output = Result<Vec<OrganisationRecord>, Error>> + Send + 'a
    {
      async move {
        Ok(
          self
            .records
            .iter()
            .filter(|r| {
              ids.contains(&r.id) || r.org_ids.iter().any(|o| ids.contains(o))
            })
            .cloned()
            .collect(),
        )
      }
    }

    fn links_for_ids<'a>(
      &'a self,
      ids: &'a [OrgId],
    ) -> impl Future<Output = Result<Vec<OrganisationLink>, Error>> + Send + 'a
    {
      async move {
        Ok(
          self
            .links
            .iter()
            .filter(|l| ids.iter().any(|id| l.touches(id)))
            .cloned()
            .collect(),
        )
      }
    }
  }

  fn source() -> MemorySource {
    MemorySource {
      records: vec![
        OrganisationRecord::new("GB-CHC-1", "ccew", "Alpha"),
        OrganisationRecord::new("GB-COH-2", "companies", "ALPHA LTD"),
        OrganisationRecord::new("GB-EDU-3", "gias", "Alpha School"),
        OrganisationRecord::new("GB-CHC-9", "ccew", "Unrelated"),
      ],
      links:   vec![
        OrganisationLink::new("GB-CHC-1", "GB-COH-2", "ccew"),
        OrganisationLink::new("GB-COH-2", "GB-EDU-3", "gias"),
      ],
    }
  }

  #[tokio::test]
  async fn resolves_transitive_component_from_any_member() {
    let source = source();
    let merger = Merger::default();
    let resolver = Resolver::new(&source, &merger);

    for start in ["GB-CHC-1", "GB-COH-2", "GB-EDU-3"] {
      let org = resolver
        .merge_organisation(&OrgId::from(start))
        .await
        .unwrap()
        .unwrap();
      assert_eq!(org.id.as_str(), "GB-CHC-1");
      assert_eq!(org.name, "Alpha");
      assert_eq!(org.records.len(), 3);
      assert!(!org.org_ids.contains(&OrgId::from("GB-CHC-9")));
    }
  }

  #[tokio::test]
  async fn unknown_identifier_resolves_to_none() {
    let source = source();
    let merger = Merger::default();
    let resolver = Resolver::new(&source, &merger);
    let org = resolver
      .merge_organisation(&OrgId::from("GB-CHC-404"))
      .await
      .unwrap();
    assert!(org.is_none());
  }

  #[tokio::test]
  async fn long_chains_resolve_to_the_whole_component() {
    let source = MemorySource {
      records: (0..20)
        .map(|i| OrganisationRecord::new(format!("GB-CHC-{i}"), "ccew", format!("Link {i}")))
        .collect(),
      links:   (0..19)
        .map(|i| {
          OrganisationLink::new(format!("GB-CHC-{i}"), format!("GB-CHC-{}", i + 1), "ccew")
        })
        .collect(),
    };
    let merger = Merger::default();
    let resolver = Resolver::new(&source, &merger);

    let graph = LinkGraph::build(&source.records, &source.links);
    let components: Vec<_> = graph.into_components(source.records.clone()).collect();
    assert_eq!(components.len(), 1);

    for start in ["GB-CHC-0", "GB-CHC-19"] {
      let org = resolver
        .merge_organisation(&OrgId::from(start))
        .await
        .unwrap()
        .unwrap();
      assert_eq!(org.records.len(), components[0].records.len());
      assert_eq!(org.org_ids.len(), 20);
    }
  }

  #[tokio::test]
  async fn duplicate_rows_are_merged_once() {
    let mut source = source();
    source
      .records
      .push(OrganisationRecord::new("GB-CHC-1", "ccew", "Alpha"));
    let merger = Merger::default();
    let resolver = Resolver::new(&source, &merger);
    let found = resolver.neighbourhood(&OrgId::from("GB-CHC-1")).await.unwrap();
    assert_eq!(found.records.len(), 3);
    assert_eq!(found.links.len(), 2);
  }
}
