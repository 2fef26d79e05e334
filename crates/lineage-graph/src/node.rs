//! Version nodes: versions placed into the DAG.
//!
//! A node owns its [`Version`] and shares its parent nodes. Two derived
//! values are computed lazily and cached per node:
//! - the ancestry (every revision reachable through parents, self included)
//! - the resolved state (this node's view of the whole document)
//!
//! Both caches may be evicted at any time; the next read recomputes them.
//! Nodes built by a graph with a cache budget are admitted to it whenever
//! they fill a cache, and the budget evicts the least recently admitted
//! nodes once it is full.

use crate::cache::{CacheBudget, CacheSlot};
use crate::merge::{self, VersionProperty};
use lineage_core::{Path, Revision, Version, VersionKind};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

/// Set of revisions reachable from a node, the node itself included.
pub type Ancestry = HashSet<Revision>;

/// The last write seen for one path.
#[derive(Clone, Debug)]
pub(crate) struct Entry<V> {
    /// `None` when the last write was a tombstone.
    pub(crate) value: Option<V>,
    pub(crate) revision: Revision,
    /// The node that made the write. Descendants keep it alive.
    pub(crate) writer: Weak<VersionNode<V>>,
}

impl<V: Clone + PartialEq> Entry<V> {
    /// Check whether the write was made with `revision` in its history.
    pub(crate) fn has_seen(&self, revision: &Revision) -> bool {
        self.writer
            .upgrade()
            .is_some_and(|writer| writer.descends_from(revision))
    }
}

/// Resolved view of a document at one node.
#[derive(Clone, Debug)]
pub(crate) struct ResolvedState<V> {
    pub(crate) entries: BTreeMap<Path, Entry<V>>,
    /// Conflicts detected while merging parents and not yet rewritten.
    pub(crate) conflicts: BTreeMap<Path, Vec<VersionProperty<V>>>,
}

impl<V> Default for ResolvedState<V> {
    fn default() -> Self {
        ResolvedState {
            entries: BTreeMap::new(),
            conflicts: BTreeMap::new(),
        }
    }
}

/// A vertex of the version graph.
pub struct VersionNode<V = serde_json::Value> {
    version: Version<V>,
    parents: Vec<Arc<VersionNode<V>>>,
    sequence: u64,
    this: Weak<VersionNode<V>>,
    budget: Option<Arc<CacheBudget<V>>>,
    ancestry: CacheSlot<Ancestry>,
    state: CacheSlot<ResolvedState<V>>,
}

impl<V> VersionNode<V> {
    /// Parents must be sorted by revision; the graph builder guarantees it.
    pub(crate) fn new(
        version: Version<V>,
        parents: Vec<Arc<VersionNode<V>>>,
        sequence: u64,
        budget: Option<Arc<CacheBudget<V>>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| VersionNode {
            version,
            parents,
            sequence,
            this: this.clone(),
            budget,
            ancestry: CacheSlot::new(),
            state: CacheSlot::new(),
        })
    }

    pub(crate) fn downgrade(&self) -> Weak<VersionNode<V>> {
        self.this.clone()
    }

    pub fn version(&self) -> &Version<V> {
        &self.version
    }

    pub fn revision(&self) -> &Revision {
        self.version.revision()
    }

    pub fn branch(&self) -> &str {
        self.version.branch()
    }

    pub fn kind(&self) -> VersionKind {
        self.version.kind()
    }

    /// Parent nodes, ordered by revision.
    pub fn parents(&self) -> &[Arc<VersionNode<V>>] {
        &self.parents
    }

    pub fn changeset(&self) -> &BTreeMap<Path, Option<V>> {
        self.version.changeset()
    }

    /// Position of this node in the insertion order of its graph lineage.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Drop cached ancestry and resolved state.
    pub fn evict_caches(&self) {
        self.ancestry.clear();
        self.state.clear();
    }

    /// Check whether any derived value is currently cached.
    pub fn is_cached(&self) -> bool {
        self.ancestry.is_filled() || self.state.is_filled()
    }

    /// Every ancestor shares this node's budget.
    fn admit(&self, filled: &[Arc<VersionNode<V>>]) {
        if let Some(budget) = &self.budget {
            budget.admit(filled.iter().map(|node| &**node).chain([self]));
        }
    }
}

impl<V: Clone + PartialEq> VersionNode<V> {
    /// All revisions reachable from this node, itself included.
    pub fn ancestry(&self) -> Arc<Ancestry> {
        if let Some(ancestry) = self.ancestry.get() {
            return ancestry;
        }

        let filled = fill_bottom_up(
            &self.parents,
            |node| node.ancestry.is_filled(),
            |node| node.ancestry.store(Arc::new(node.compute_ancestry())),
        );
        let ancestry = Arc::new(self.compute_ancestry());
        self.ancestry.store(ancestry.clone());
        self.admit(&filled);
        ancestry
    }

    /// Check whether `revision` is this node or one of its ancestors.
    pub fn descends_from(&self, revision: &Revision) -> bool {
        self.ancestry().contains(revision)
    }

    /// This node's view of the document: every live path with its value.
    pub fn resolved_properties(&self) -> BTreeMap<Path, V> {
        self.state()
            .entries
            .iter()
            .filter_map(|(path, entry)| entry.value.clone().map(|value| (path.clone(), value)))
            .collect()
    }

    /// Live values together with the revision that wrote them.
    pub fn versioned_properties(&self) -> BTreeMap<Path, VersionProperty<V>> {
        self.state()
            .entries
            .iter()
            .filter(|(_, entry)| entry.value.is_some())
            .map(|(path, entry)| {
                (
                    path.clone(),
                    VersionProperty::new(entry.revision, entry.value.clone()),
                )
            })
            .collect()
    }

    /// The resolved value of a single path.
    pub fn property(&self, path: &Path) -> Option<V> {
        self.state().entries.get(path).and_then(|entry| entry.value.clone())
    }

    /// The last write to `path` this node has seen, deletions included.
    pub fn last_write(&self, path: &Path) -> Option<VersionProperty<V>> {
        self.state()
            .entries
            .get(path)
            .map(|entry| VersionProperty::new(entry.revision, entry.value.clone()))
    }

    /// Unresolved conflicts inherited from merging this node's parents.
    ///
    /// A conflict on a path stays here until a later version rewrites it.
    pub fn conflicts(&self) -> BTreeMap<Path, Vec<VersionProperty<V>>> {
        self.state().conflicts.clone()
    }

    pub(crate) fn state(&self) -> Arc<ResolvedState<V>> {
        if let Some(state) = self.state.get() {
            return state;
        }

        // Ancestry is needed by every merge below; fill it iteratively first.
        self.ancestry();
        let filled = fill_bottom_up(
            &self.parents,
            |node| node.state.is_filled(),
            |node| node.state.store(Arc::new(node.compute_state())),
        );
        let state = Arc::new(self.compute_state());
        self.state.store(state.clone());
        self.admit(&filled);
        state
    }

    fn compute_ancestry(&self) -> Ancestry {
        let mut ancestry = match self.parents.as_slice() {
            [parent] => (*parent.ancestry()).clone(),
            parents => {
                let mut ancestry = Ancestry::new();
                for parent in parents {
                    ancestry.extend(parent.ancestry().iter().copied());
                }
                ancestry
            }
        };
        ancestry.insert(*self.revision());
        ancestry
    }

    fn compute_state(&self) -> ResolvedState<V> {
        let mut state = match self.parents.as_slice() {
            [] => ResolvedState::default(),
            [parent] => (*parent.state()).clone(),
            parents => merge::resolve(parents).1,
        };

        for (path, value) in self.version.changeset() {
            state.conflicts.remove(path);
            state.entries.insert(
                path.clone(),
                Entry {
                    value: value.clone(),
                    revision: *self.revision(),
                    writer: self.downgrade(),
                },
            );
        }
        state
    }
}

impl<V> Drop for VersionNode<V> {
    // Unlinks uniquely owned ancestors with an explicit stack instead of
    // recursing through the parent chain.
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.parents);
        while let Some(parent) = pending.pop() {
            if let Ok(mut node) = Arc::try_unwrap(parent) {
                pending.append(&mut node.parents);
            }
        }
    }
}

impl<V> fmt::Debug for VersionNode<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionNode")
            .field("revision", self.revision())
            .field("branch", &self.branch())
            .field("kind", &self.kind())
            .field(
                "parents",
                &self.parents.iter().map(|p| *p.revision()).collect::<Vec<_>>(),
            )
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Fill a cache for every uncached ancestor of `roots`, parents first, and
/// return the nodes that were filled.
///
/// Uses an explicit stack so long histories cannot overflow the call stack.
fn fill_bottom_up<V>(
    roots: &[Arc<VersionNode<V>>],
    is_filled: impl Fn(&VersionNode<V>) -> bool,
    fill: impl Fn(&VersionNode<V>),
) -> Vec<Arc<VersionNode<V>>> {
    let mut filled = Vec::new();
    let mut expanded = HashSet::new();
    let mut stack: Vec<(&Arc<VersionNode<V>>, bool)> =
        roots.iter().rev().map(|node| (node, false)).collect();

    while let Some((node, ready)) = stack.pop() {
        if is_filled(node) {
            continue;
        }
        if ready {
            fill(node);
            filled.push(Arc::clone(node));
        } else if expanded.insert(*node.revision()) {
            stack.push((node, true));
            for parent in node.parents.iter().rev() {
                if !is_filled(parent) {
                    stack.push((parent, false));
                }
            }
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_core::Path;
    use serde_json::{json, Value};

    fn path(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    fn node(
        parents: Vec<Arc<VersionNode<Value>>>,
        sequence: u64,
        changes: &[(&str, Option<Value>)],
    ) -> Arc<VersionNode<Value>> {
        let version = Version::builder()
            .with_parents(parents.iter().map(|p| *p.revision()))
            .with_changeset(changes.iter().map(|(p, v)| (path(p), v.clone())))
            .build()
            .unwrap();
        VersionNode::new(version, parents, sequence, None)
    }

    #[test]
    fn test_root_node() {
        let root = node(vec![], 0, &[("a", Some(json!(1)))]);

        assert_eq!(root.ancestry().len(), 1);
        assert!(root.descends_from(root.revision()));
        assert_eq!(root.resolved_properties(), BTreeMap::from([(path("a"), json!(1))]));
    }

    #[test]
    fn test_linear_inheritance() {
        let v1 = node(vec![], 0, &[("a", Some(json!(1))), ("b", Some(json!(2)))]);
        let v2 = node(vec![v1.clone()], 1, &[("b", Some(json!(3)))]);
        let v3 = node(vec![v2.clone()], 2, &[("a", None)]);

        assert_eq!(
            v3.resolved_properties(),
            BTreeMap::from([(path("b"), json!(3))])
        );
        assert_eq!(v3.ancestry().len(), 3);
        assert!(v3.descends_from(v1.revision()));
        assert!(!v1.descends_from(v3.revision()));
    }

    #[test]
    fn test_versioned_properties_keep_writer() {
        let v1 = node(vec![], 0, &[("a", Some(json!(1)))]);
        let v2 = node(vec![v1.clone()], 1, &[("b", Some(json!(2)))]);

        let versioned = v2.versioned_properties();
        assert_eq!(versioned[&path("a")].revision, *v1.revision());
        assert_eq!(versioned[&path("b")].revision, *v2.revision());
    }

    #[test]
    fn test_own_write_beats_merge() {
        let base = node(vec![], 0, &[]);
        let left = node(vec![base.clone()], 1, &[("x", Some(json!("left")))]);
        let right = node(vec![base.clone()], 2, &[("x", Some(json!("right")))]);
        let merged = node(vec![left, right], 3, &[("x", Some(json!("mine")))]);

        assert_eq!(merged.property(&path("x")), Some(json!("mine")));
        assert!(merged.conflicts().is_empty());
    }

    #[test]
    fn test_merge_node_carries_conflict() {
        let base = node(vec![], 0, &[]);
        let left = node(vec![base.clone()], 1, &[("x", Some(json!("left")))]);
        let right = node(vec![base.clone()], 2, &[("x", Some(json!("right")))]);
        let merged = node(vec![left.clone(), right.clone()], 3, &[]);

        assert_eq!(merged.property(&path("x")), Some(json!("right")));
        let conflicts = merged.conflicts();
        assert_eq!(
            conflicts[&path("x")],
            vec![VersionProperty::new(*left.revision(), Some(json!("left")))]
        );
    }

    #[test]
    fn test_eviction_is_transparent() {
        let v1 = node(vec![], 0, &[("a", Some(json!(1)))]);
        let v2 = node(vec![v1.clone()], 1, &[("b", Some(json!(2)))]);

        let before = v2.resolved_properties();
        assert!(v1.is_cached());

        v1.evict_caches();
        v2.evict_caches();
        assert!(!v2.is_cached());
        assert_eq!(v2.resolved_properties(), before);
    }

    #[test]
    fn test_last_write_includes_deletions() {
        let v1 = node(vec![], 0, &[("a", Some(json!(1))), ("b", Some(json!(2)))]);
        let v2 = node(vec![v1.clone()], 1, &[("a", None)]);

        assert_eq!(
            v2.last_write(&path("a")),
            Some(VersionProperty::new(*v2.revision(), None))
        );
        assert_eq!(
            v2.last_write(&path("b")),
            Some(VersionProperty::new(*v1.revision(), Some(json!(2))))
        );
        assert_eq!(v2.last_write(&path("c")), None);
    }

    #[test]
    fn test_descendant_state_does_not_pin_ancestry() {
        let v1 = node(vec![], 0, &[("a", Some(json!(1)))]);
        let v2 = node(vec![v1.clone()], 1, &[("b", Some(json!(2)))]);

        let held = v1.ancestry();
        v2.resolved_properties();
        v1.evict_caches();

        assert_eq!(Arc::strong_count(&held), 1);
        assert!(v2.is_cached());
    }

    #[test]
    fn test_budget_evicts_least_recently_admitted() {
        let budget = Arc::new(CacheBudget::new(std::num::NonZeroUsize::new(2).unwrap()));
        let version = |parents: &[&Arc<VersionNode<Value>>], value: i64| {
            Version::builder()
                .with_parents(parents.iter().map(|p| *p.revision()))
                .with_value(path("a"), json!(value))
                .build()
                .unwrap()
        };
        let v1 = VersionNode::new(version(&[], 1), vec![], 0, Some(budget.clone()));
        let v2 = VersionNode::new(version(&[&v1], 2), vec![v1.clone()], 1, Some(budget.clone()));
        let v3 = VersionNode::new(version(&[&v2], 3), vec![v2.clone()], 2, Some(budget.clone()));

        assert_eq!(v3.property(&path("a")), Some(json!(3)));
        assert!(!v1.is_cached());
        assert!(v2.is_cached());
        assert!(v3.is_cached());
        assert_eq!(budget.resident(), 2);

        assert_eq!(v1.property(&path("a")), Some(json!(1)));
        assert!(v1.is_cached());
        assert!(!v2.is_cached());
    }

    #[test]
    fn test_deep_history_does_not_overflow() {
        let mut head = node(vec![], 0, &[("counter", Some(json!(0)))]);
        for i in 1..3_000u64 {
            head = node(vec![head], i, &[("counter", Some(json!(i)))]);
        }

        assert_eq!(head.property(&path("counter")), Some(json!(2_999)));
        assert_eq!(head.ancestry().len(), 3_000);
    }
}
