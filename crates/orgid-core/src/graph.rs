//! Link graph: groups records that describe the same organisation.
//!
//! Identifiers are nodes. Each record contributes edges from its own id to
//! every id in its `org_ids`; each link contributes one undirected edge.
//! Connected components come from a union-find over interned ids, so
//! grouping is transitive: A–B and B–C put A, B and C together.

use std::collections::{HashMap, HashSet};

use petgraph::unionfind::UnionFind;

use crate::{OrgId, OrganisationLink, OrganisationRecord};

// ─── Graph ───────────────────────────────────────────────────────────────────

/// Interned org-ids plus the undirected edges between them.
#[derive(Debug, Default, Clone)]
pub struct LinkGraph {
  index: HashMap<OrgId, usize>,
  ids:   Vec<OrgId>,
  edges: Vec<(usize, usize)>,
}

impl LinkGraph {
  pub fn new() -> Self { Self::default() }

  /// Build the graph from every record's identifiers and every link.
  pub fn build(
    records: &[OrganisationRecord],
    links: &[OrganisationLink],
  ) -> Self {
    let mut graph = Self::new();
    for record in records {
      graph.add_record(record);
    }
    for link in links {
      graph.add_link(link);
    }
    graph
  }

  pub fn add_record(&mut self, record: &OrganisationRecord) {
    self.intern(&record.id);
    for other in &record.org_ids {
      self.union(&record.id, other);
    }
  }

  pub fn add_link(&mut self, link: &OrganisationLink) {
    self.union(&link.organisation_id_a, &link.organisation_id_b);
  }

  fn intern(&mut self, id: &OrgId) -> usize {
    if let Some(&idx) = self.index.get(id) {
      return idx;
    }
    let idx = self.ids.len();
    self.index.insert(id.clone(), idx);
    self.ids.push(id.clone());
    idx
  }

  /// Join `a` and `b`, interning either if new.
  pub fn union(&mut self, a: &OrgId, b: &OrgId) {
    let a = self.intern(a);
    let b = self.intern(b);
    if a != b {
      self.edges.push((a, b));
    }
  }

  /// Disjoint sets over the interned ids, one per connected component.
  fn forest(&self) -> UnionFind<usize> {
    let mut forest = UnionFind::new(self.ids.len());
    for &(a, b) in &self.edges {
      forest.union(a, b);
    }
    forest
  }

  pub fn connected(&self, a: &OrgId, b: &OrgId) -> bool {
    match (self.index.get(a), self.index.get(b)) {
      (Some(&a), Some(&b)) => self.forest().equiv(a, b),
      _ => false,
    }
  }

  /// Every identifier in the same component as `id`, in interning order.
  pub fn component_of(&self, id: &OrgId) -> Vec<OrgId> {
    let Some(&idx) = self.index.get(id) else {
      return Vec::new();
    };
    let forest = self.forest();
    let root = forest.find(idx);
    (0..self.ids.len())
      .filter(|&i| forest.find(i) == root)
      .map(|i| self.ids[i].clone())
      .collect()
  }

  /// Consume the graph and group `records` into components.
  ///
  /// Records whose id is not in the graph are added as singletons first.
  pub fn into_components(
    mut self,
    records: Vec<OrganisationRecord>,
  ) -> Components {
    for record in &records {
      self.add_record(record);
    }
    let labels = self.forest().into_labeling();

    let mut members: HashMap<usize, Vec<OrgId>> = HashMap::new();
    for (id, &root) in self.ids.iter().zip(&labels) {
      members.entry(root).or_default().push(id.clone());
    }

    let mut order: Vec<usize> = Vec::new();
    let mut buckets: HashMap<usize, Vec<OrganisationRecord>> = HashMap::new();
    for record in records {
      let root = labels[self.index[&record.id]];
      let bucket = buckets.entry(root).or_default();
      if bucket.is_empty() {
        order.push(root);
      }
      bucket.push(record);
    }

    Components {
      order: order.into_iter(),
      buckets,
      members,
      seen: HashSet::new(),
    }
  }
}

// ─── Components ──────────────────────────────────────────────────────────────

/// All records belonging to one real-world organisation.
#[derive(Debug, Clone)]
pub struct Component {
  /// Every identifier in the component, including ids known only from links.
  pub ids:     Vec<OrgId>,
  /// Member records in their original relative order.
  pub records: Vec<OrganisationRecord>,
}

/// Iterator over components in order of each component's first record.
///
/// Every identifier of a yielded component is marked seen; a component whose
/// identifiers have already been seen is never yielded twice.
pub struct Components {
  order:   std::vec::IntoIter<usize>,
  buckets: HashMap<usize, Vec<OrganisationRecord>>,
  members: HashMap<usize, Vec<OrgId>>,
  seen:    HashSet<OrgId>,
}

impl Components {
  pub fn is_seen(&self, id: &OrgId) -> bool { self.seen.contains(id) }
}

impl Iterator for Components {
  type Item = Component;

  fn next(&mut self) -> Option<Component> {
    loop {
      let root = self.order.next()?;
      let Some(records) = self.buckets.remove(&root) else {
        continue;
      };
      let ids = self.members.remove(&root).unwrap_or_default();
      if records.iter().all(|r| self.seen.contains(&r.id)) {
        continue;
      }
      self.seen.extend(ids.iter().cloned());
      return Some(Component { ids, records });
    }
  }
}
