//! Property-level merge of concurrent heads.
//!
//! Merging a set of nodes works in four steps:
//! 1. Drop every requested head that is an ancestor of another one.
//! 2. Collect, per path, the last write seen by each surviving head.
//! 3. The write with the greatest revision wins.
//! 4. A losing write is a conflict unless it was overwritten or it holds the
//!    same value as the winner. A write is overwritten when a head holding
//!    the winner has seen it, or when any other write collected for the path
//!    was made after seeing it.
//!
//! Conflicts found while merging the parents of a node stay attached to
//! that node until a later version rewrites the path, so they are reported
//! again by any merge that includes the node. They are dropped by the same
//! overwrite rule as fresh losers.

use crate::error::{GraphError, Result};
use crate::node::{Ancestry, Entry, ResolvedState, VersionNode};
use lineage_core::{Path, Revision};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A value together with the revision that wrote it.
///
/// A `None` value stands for a deletion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionProperty<V = serde_json::Value> {
    pub revision: Revision,
    pub value: Option<V>,
}

impl<V> VersionProperty<V> {
    pub fn new(revision: Revision, value: Option<V>) -> Self {
        VersionProperty { revision, value }
    }
}

/// Result of merging a set of heads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Merge<V = serde_json::Value> {
    merge_heads: BTreeSet<Revision>,
    properties: BTreeMap<Path, V>,
    revisions: BTreeMap<Path, Revision>,
    conflicts: BTreeMap<Path, Vec<VersionProperty<V>>>,
}

impl<V> Merge<V> {
    /// A merge of nothing: no heads, no properties, no conflicts.
    pub fn empty() -> Self {
        Merge {
            merge_heads: BTreeSet::new(),
            properties: BTreeMap::new(),
            revisions: BTreeMap::new(),
            conflicts: BTreeMap::new(),
        }
    }

    /// The requested heads that are not an ancestor of another requested head.
    pub fn merge_heads(&self) -> &BTreeSet<Revision> {
        &self.merge_heads
    }

    /// Winning value of every live path.
    pub fn properties(&self) -> &BTreeMap<Path, V> {
        &self.properties
    }

    /// Losing concurrent writes per path, ordered by revision.
    pub fn conflicts(&self) -> &BTreeMap<Path, Vec<VersionProperty<V>>> {
        &self.conflicts
    }

    pub fn property(&self, path: &Path) -> Option<&V> {
        self.properties.get(path)
    }

    /// Revision that wrote the winning value of `path`.
    pub fn revision_of(&self, path: &Path) -> Option<&Revision> {
        self.revisions.get(path)
    }

    /// Losing writes for `path`; empty when the path is not in conflict.
    pub fn conflicts_at(&self, path: &Path) -> &[VersionProperty<V>] {
        self.conflicts.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.merge_heads.is_empty()
    }

    pub fn into_properties(self) -> BTreeMap<Path, V> {
        self.properties
    }
}

impl<V: Clone + PartialEq> Merge<V> {
    /// Merge the given heads.
    ///
    /// Fails with [`GraphError::EmptyMergeInput`] when no head is given.
    pub fn of<I>(heads: I) -> Result<Self>
    where
        I: IntoIterator<Item = Arc<VersionNode<V>>>,
    {
        let requested: Vec<_> = heads.into_iter().collect();
        if requested.is_empty() {
            return Err(GraphError::EmptyMergeInput);
        }

        let (heads, state) = resolve(&requested);
        let mut merge = Merge::empty();
        merge.merge_heads = heads.iter().map(|head| *head.revision()).collect();
        for (path, entry) in state.entries {
            if let Some(value) = entry.value {
                merge.revisions.insert(path.clone(), entry.revision);
                merge.properties.insert(path, value);
            }
        }
        merge.conflicts = state.conflicts;
        Ok(merge)
    }
}

impl<V> Default for Merge<V> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Prune `requested` to an antichain and merge the survivors' states.
pub(crate) fn resolve<V: Clone + PartialEq>(
    requested: &[Arc<VersionNode<V>>],
) -> (Vec<Arc<VersionNode<V>>>, ResolvedState<V>) {
    let heads = prune(requested);
    let state = match heads.as_slice() {
        [] => ResolvedState::default(),
        [head] => (*head.state()).clone(),
        _ => merge_states(&heads),
    };
    (heads, state)
}

/// Remove duplicates and every head contained in another head's ancestry.
fn prune<V: Clone + PartialEq>(requested: &[Arc<VersionNode<V>>]) -> Vec<Arc<VersionNode<V>>> {
    let unique: BTreeMap<Revision, &Arc<VersionNode<V>>> = requested
        .iter()
        .map(|node| (*node.revision(), node))
        .collect();
    let candidates: Vec<_> = unique.into_values().collect();
    let ancestries: Vec<Arc<Ancestry>> = candidates.iter().map(|node| node.ancestry()).collect();

    candidates
        .iter()
        .enumerate()
        .filter(|(i, node)| {
            !ancestries
                .iter()
                .enumerate()
                .any(|(j, ancestry)| *i != j && ancestry.contains(node.revision()))
        })
        .map(|(_, node)| Arc::clone(node))
        .collect()
}

/// Merge the states of an antichain of at least two heads.
fn merge_states<V: Clone + PartialEq>(heads: &[Arc<VersionNode<V>>]) -> ResolvedState<V> {
    let states: Vec<_> = heads.iter().map(|head| head.state()).collect();
    let ancestries: Vec<_> = heads.iter().map(|head| head.ancestry()).collect();

    // path -> origin revision -> (entry, indexes of the heads holding it)
    let mut candidates: BTreeMap<&Path, BTreeMap<Revision, (&Entry<V>, Vec<usize>)>> =
        BTreeMap::new();
    for (i, state) in states.iter().enumerate() {
        for (path, entry) in &state.entries {
            candidates
                .entry(path)
                .or_default()
                .entry(entry.revision)
                .or_insert_with(|| (entry, Vec::new()))
                .1
                .push(i);
        }
    }

    let mut merged = ResolvedState::default();
    for (path, mut writes) in candidates {
        let Some((_, (winner, holders))) = writes.pop_last() else {
            continue;
        };

        // Some other write to this path was made after seeing `revision`.
        let seen_by_other = |revision: &Revision| {
            std::iter::once(winner)
                .chain(writes.values().map(|(entry, _)| *entry))
                .any(|entry| entry.revision != *revision && entry.has_seen(revision))
        };

        let mut conflicts: BTreeMap<Revision, Option<V>> = BTreeMap::new();
        for (revision, (loser, _)) in &writes {
            let overwritten = holders.iter().any(|&i| ancestries[i].contains(revision))
                || seen_by_other(revision);
            if overwritten || loser.value == winner.value {
                continue;
            }
            conflicts.insert(*revision, loser.value.clone());
        }

        for carried in states.iter().filter_map(|state| state.conflicts.get(path)) {
            for conflict in carried {
                if conflict.revision == winner.revision
                    || conflict.value == winner.value
                    || seen_by_other(&conflict.revision)
                {
                    continue;
                }
                conflicts
                    .entry(conflict.revision)
                    .or_insert_with(|| conflict.value.clone());
            }
        }

        if !conflicts.is_empty() {
            merged.conflicts.insert(
                path.clone(),
                conflicts
                    .into_iter()
                    .map(|(revision, value)| VersionProperty::new(revision, value))
                    .collect(),
            );
        }
        merged.entries.insert(path.clone(), winner.clone());
    }
    merged
}
