//! Cross-references: directed, kind-tagged edges between addresses held
//! in mirrored FROM and TO indices. The mirror is an invariant: every
//! edge present in one index is present in the other.

use std::collections::{BTreeMap, BTreeSet};

use core_address::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum XRefKind {
    Unknown,
    Read,
    Write,
    Call,
    Branch,
}

/// The document's cross-reference graph.
#[derive(Debug, Default)]
pub struct XRefGraph {
    from: BTreeMap<Address, BTreeSet<(Address, XRefKind)>>,
    to: BTreeMap<Address, BTreeSet<(Address, XRefKind)>>,
}

impl XRefGraph {
    /// Insert an edge. Returns `false` when the identical edge already
    /// exists (re-analysis inserts no duplicates).
    pub fn add(&mut self, from: Address, to: Address, kind: XRefKind) -> bool {
        let inserted = self.from.entry(from).or_default().insert((to, kind));
        if inserted {
            self.to.entry(to).or_default().insert((from, kind));
        }
        inserted
    }

    pub fn contains(&self, from: &Address, to: &Address, kind: XRefKind) -> bool {
        self.from
            .get(from)
            .is_some_and(|set| set.contains(&(*to, kind)))
    }

    /// Edges leaving `address` as `(target, kind)` pairs.
    pub fn outgoing(&self, address: &Address) -> Vec<(Address, XRefKind)> {
        self.from
            .get(address)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Edges arriving at `address` as `(origin, kind)` pairs.
    pub fn incoming(&self, address: &Address) -> Vec<(Address, XRefKind)> {
        self.to
            .get(address)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Total edge count.
    pub fn len(&self) -> usize {
        self.from.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.from.values().all(BTreeSet::is_empty)
    }

    /// Flatten to `(from, to, kind)` triples, for persistence.
    pub fn edges(&self) -> Vec<(Address, Address, XRefKind)> {
        self.from
            .iter()
            .flat_map(|(from, set)| set.iter().map(|(to, kind)| (*from, *to, *kind)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(offset: u64) -> Address {
        Address::linear(offset, 32)
    }

    #[test]
    fn indices_mirror_each_other() {
        let mut graph = XRefGraph::default();
        assert!(graph.add(addr(0x103), addr(0x106), XRefKind::Branch));
        assert!(graph.add(addr(0x110), addr(0x106), XRefKind::Call));
        for (from, to, kind) in graph.edges() {
            assert!(graph.outgoing(&from).contains(&(to, kind)));
            assert!(graph.incoming(&to).contains(&(from, kind)));
        }
        assert_eq!(graph.incoming(&addr(0x106)).len(), 2);
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn duplicate_edges_are_rejected() {
        let mut graph = XRefGraph::default();
        assert!(graph.add(addr(1), addr(2), XRefKind::Read));
        assert!(!graph.add(addr(1), addr(2), XRefKind::Read));
        assert_eq!(graph.len(), 1);
        // Same endpoints, different kind: a distinct edge.
        assert!(graph.add(addr(1), addr(2), XRefKind::Write));
        assert_eq!(graph.len(), 2);
    }
}
