//! Cycle guard for parent/child relations.
//!
//! Business units, budgets, activities and party accountabilities all form
//! parent graphs that must stay acyclic and irreflexive per relation kind. The
//! guard walks parents through a lookup function, so the same code serves an
//! in-aggregate adjacency map and graphs spread across many aggregates.

use std::collections::{BTreeMap, HashSet};
use std::convert::Infallible;
use std::hash::Hash;

use crate::error::DomainError;

/// Ancestor walks over an arbitrary parent lookup.
pub struct HierarchyGuard;

impl HierarchyGuard {
    /// Whether `candidate` appears among the (transitive) parents of `node`
    /// for relations of `kind`.
    ///
    /// Iterative, and each node is expanded at most once, so deep or already
    /// corrupted graphs terminate.
    pub fn ancestors_include<Id, K, E, F>(
        node: Id,
        candidate: Id,
        kind: &K,
        mut parents_of: F,
    ) -> Result<bool, E>
    where
        Id: Copy + Eq + Hash,
        F: FnMut(Id, &K) -> Result<Vec<Id>, E>,
    {
        let mut visited = HashSet::new();
        visited.insert(node);
        let mut pending = parents_of(node, kind)?;

        while let Some(next) = pending.pop() {
            if next == candidate {
                return Ok(true);
            }
            if visited.insert(next) {
                pending.extend(parents_of(next, kind)?);
            }
        }
        Ok(false)
    }

    /// `parent != child` and `child` is not already an ancestor of `parent`.
    pub fn can_attach<Id, K, E, F>(parent: Id, child: Id, kind: &K, parents_of: F) -> Result<bool, E>
    where
        Id: Copy + Eq + Hash,
        F: FnMut(Id, &K) -> Result<Vec<Id>, E>,
    {
        if parent == child {
            return Ok(false);
        }
        Ok(!Self::ancestors_include(parent, child, kind, parents_of)?)
    }

    /// Like [`can_attach`](Self::can_attach), failing with `invalid parent`.
    pub fn ensure_can_attach<Id, K, E, F>(
        parent: Id,
        child: Id,
        kind: &K,
        parents_of: F,
    ) -> Result<(), E>
    where
        Id: Copy + Eq + Hash,
        F: FnMut(Id, &K) -> Result<Vec<Id>, E>,
        E: From<DomainError>,
    {
        if Self::can_attach(parent, child, kind, parents_of)? {
            Ok(())
        } else {
            Err(DomainError::invalid_parent().into())
        }
    }
}

/// Adjacency map of child → parents, keyed by id (arena style).
///
/// Entities reference each other only by id; the map owns the edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentMap<Id: Ord, K> {
    parents: BTreeMap<Id, Vec<(Id, K)>>,
}

impl<Id: Ord, K> Default for ParentMap<Id, K> {
    fn default() -> Self {
        Self {
            parents: BTreeMap::new(),
        }
    }
}

impl<Id, K> ParentMap<Id, K>
where
    Id: Copy + Ord + Hash,
    K: Clone + PartialEq,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parents(&self, child: Id, kind: &K) -> Vec<Id> {
        self.parents
            .get(&child)
            .map(|edges| {
                edges
                    .iter()
                    .filter(|(_, k)| k == kind)
                    .map(|(p, _)| *p)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn children(&self, parent: Id, kind: &K) -> Vec<Id> {
        self.parents
            .iter()
            .filter(|(_, edges)| edges.iter().any(|(p, k)| *p == parent && k == kind))
            .map(|(child, _)| *child)
            .collect()
    }

    pub fn ancestors_include(&self, node: Id, candidate: Id, kind: &K) -> bool {
        let walked = HierarchyGuard::ancestors_include(node, candidate, kind, |id, k| {
            Ok::<_, Infallible>(self.parents(id, k))
        });
        match walked {
            Ok(found) => found,
            Err(never) => match never {},
        }
    }

    pub fn can_attach(&self, parent: Id, child: Id, kind: &K) -> bool {
        parent != child && !self.ancestors_include(parent, child, kind)
    }

    /// Record an edge without the guard (replay of already validated facts).
    pub fn insert_unchecked(&mut self, parent: Id, child: Id, kind: K) {
        let edges = self.parents.entry(child).or_default();
        if !edges.iter().any(|(p, k)| *p == parent && *k == kind) {
            edges.push((parent, kind));
        }
    }

    pub fn detach(&mut self, child: Id, kind: &K) {
        if let Some(edges) = self.parents.get_mut(&child) {
            edges.retain(|(_, k)| k != kind);
            if edges.is_empty() {
                self.parents.remove(&child);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainResult;
    use proptest::prelude::*;
    use std::collections::HashMap;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Kind {
        Reports,
        Funds,
    }

    /// Guard then insert, the way aggregates split it across handle and apply.
    fn attach<K: Clone + PartialEq>(map: &mut ParentMap<u32, K>, parent: u32, child: u32, kind: K) -> DomainResult<()> {
        if !map.can_attach(parent, child, &kind) {
            return Err(DomainError::invalid_parent());
        }
        map.insert_unchecked(parent, child, kind);
        Ok(())
    }

    fn lookup(edges: &HashMap<u32, u32>) -> impl FnMut(u32, &()) -> Result<Vec<u32>, DomainError> + '_ {
        move |id, _| Ok(edges.get(&id).copied().into_iter().collect())
    }

    #[test]
    fn walks_the_whole_chain() {
        // 1 <- 2 <- 3 <- 4
        let edges: HashMap<u32, u32> = [(2, 1), (3, 2), (4, 3)].into_iter().collect();
        assert!(HierarchyGuard::ancestors_include(4, 1, &(), lookup(&edges)).unwrap());
        assert!(!HierarchyGuard::ancestors_include(1, 4, &(), lookup(&edges)).unwrap());
        assert!(!HierarchyGuard::ancestors_include(4, 7, &(), lookup(&edges)).unwrap());
    }

    #[test]
    fn rejects_self_parent_and_back_edges() {
        let edges: HashMap<u32, u32> = [(2, 1), (3, 2)].into_iter().collect();
        assert!(!HierarchyGuard::can_attach(5, 5, &(), lookup(&edges)).unwrap());
        // 3 already descends from 1, so 1 cannot move under 3.
        assert!(!HierarchyGuard::can_attach(3, 1, &(), lookup(&edges)).unwrap());
        assert!(HierarchyGuard::can_attach(1, 3, &(), lookup(&edges)).unwrap());

        let err = HierarchyGuard::ensure_can_attach(3, 1, &(), lookup(&edges)).unwrap_err();
        assert_eq!(err, DomainError::invalid_parent());
    }

    #[test]
    fn terminates_on_corrupted_cycles() {
        let edges: HashMap<u32, u32> = [(1, 2), (2, 1)].into_iter().collect();
        assert!(!HierarchyGuard::ancestors_include(1, 9, &(), lookup(&edges)).unwrap());
    }

    #[test]
    fn lookup_errors_propagate() {
        let result = HierarchyGuard::ancestors_include(1u32, 2u32, &(), |_, _| {
            Err::<Vec<u32>, _>(DomainError::not_found("node 1"))
        });
        assert_eq!(result, Err(DomainError::not_found("node 1")));
    }

    #[test]
    fn parent_map_filters_by_kind() {
        let mut map = ParentMap::new();
        attach(&mut map, 1, 2, Kind::Reports).unwrap();
        attach(&mut map, 2, 3, Kind::Reports).unwrap();

        // The same back edge is fine under another relation kind.
        attach(&mut map, 3, 1, Kind::Funds).unwrap();
        assert_eq!(attach(&mut map, 3, 1, Kind::Reports), Err(DomainError::invalid_parent()));
        assert_eq!(map.parents(1, &Kind::Funds), vec![3]);
        assert_eq!(map.children(2, &Kind::Reports), vec![3]);

        map.detach(3, &Kind::Reports);
        assert!(map.can_attach(3, 1, &Kind::Reports));
    }

    proptest! {
        #[test]
        fn a_node_never_attaches_to_itself(node in 0u32..1000, chain in prop::collection::vec(0u32..1000, 0..20)) {
            let mut map = ParentMap::new();
            for pair in chain.windows(2) {
                let _ = attach(&mut map, pair[0], pair[1], ());
            }
            prop_assert!(!map.can_attach(node, node, &()));
        }

        #[test]
        fn accepted_edges_keep_the_graph_acyclic(edges in prop::collection::vec((0u32..30, 0u32..30), 0..60)) {
            let mut map = ParentMap::new();
            for (parent, child) in edges {
                let _ = attach(&mut map, parent, child, ());
            }
            for node in 0u32..30 {
                prop_assert!(!map.ancestors_include(node, node, &()));
            }
        }
    }
}
