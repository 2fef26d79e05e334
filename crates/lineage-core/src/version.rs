//! Immutable versions and their builder.
//!
//! A version is a changeset keyed by [`Path`], plus the metadata that places
//! it in the version graph: its own revision, its parent revisions, a branch
//! label and a kind. A `None` value in the changeset is a tombstone.

use crate::error::{Result, VersionError};
use crate::path::Path;
use crate::revision::Revision;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Branch used when none is given.
pub const DEFAULT_BRANCH: &str = "default";

/// How a version relates to the history before it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionKind {
    /// Regular version with zero or more parents.
    #[default]
    Normal,
    /// Starts a new lineage; never has parents.
    Root,
}

/// An immutable changeset placed at one revision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Version<V = serde_json::Value> {
    revision: Revision,
    parents: BTreeSet<Revision>,
    branch: String,
    kind: VersionKind,
    changeset: BTreeMap<Path, Option<V>>,
}

impl<V> Version<V> {
    /// Start building a version.
    pub fn builder() -> VersionBuilder<V> {
        VersionBuilder::new()
    }

    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    pub fn parents(&self) -> &BTreeSet<Revision> {
        &self.parents
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn kind(&self) -> VersionKind {
        self.kind
    }

    pub fn is_root(&self) -> bool {
        self.kind == VersionKind::Root
    }

    /// The path writes of this version; `None` marks a deleted path.
    pub fn changeset(&self) -> &BTreeMap<Path, Option<V>> {
        &self.changeset
    }
}

/// Builder for [`Version`].
///
/// Every field has a default: a fresh revision, the default branch, a normal
/// kind, no parents and an empty changeset.
#[derive(Clone, Debug)]
pub struct VersionBuilder<V = serde_json::Value> {
    revision: Option<Revision>,
    parents: BTreeSet<Revision>,
    branch: String,
    kind: VersionKind,
    changeset: BTreeMap<Path, Option<V>>,
}

impl<V> Default for VersionBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> VersionBuilder<V> {
    pub fn new() -> Self {
        VersionBuilder {
            revision: None,
            parents: BTreeSet::new(),
            branch: DEFAULT_BRANCH.to_string(),
            kind: VersionKind::Normal,
            changeset: BTreeMap::new(),
        }
    }

    pub fn with_revision(mut self, revision: Revision) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_kind(mut self, kind: VersionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Add a single parent revision.
    pub fn with_parent(mut self, parent: Revision) -> Self {
        self.parents.insert(parent);
        self
    }

    /// Replace the parent set.
    pub fn with_parents(mut self, parents: impl IntoIterator<Item = Revision>) -> Self {
        self.parents = parents.into_iter().collect();
        self
    }

    /// Write `value` at `path`.
    pub fn with_value(mut self, path: Path, value: impl Into<V>) -> Self {
        self.changeset.insert(path, Some(value.into()));
        self
    }

    /// Delete `path`.
    pub fn with_tombstone(mut self, path: Path) -> Self {
        self.changeset.insert(path, None);
        self
    }

    /// Merge a whole changeset into the builder; later entries win.
    pub fn with_changeset(mut self, changeset: impl IntoIterator<Item = (Path, Option<V>)>) -> Self {
        self.changeset.extend(changeset);
        self
    }

    /// Validate and build the version.
    pub fn build(self) -> Result<Version<V>> {
        let revision = self.revision.unwrap_or_default();

        if self.kind == VersionKind::Root && !self.parents.is_empty() {
            return Err(VersionError::InvalidVersion(format!(
                "root version {} declares {} parent(s)",
                revision,
                self.parents.len()
            )));
        }
        if self.parents.contains(&revision) {
            return Err(VersionError::InvalidVersion(format!(
                "version {} lists itself as parent",
                revision
            )));
        }
        if self.branch.is_empty() {
            return Err(VersionError::InvalidVersion(format!(
                "version {} has an empty branch name",
                revision
            )));
        }

        Ok(Version {
            revision,
            parents: self.parents,
            branch: self.branch,
            kind: self.kind,
            changeset: self.changeset,
        })
    }
}
