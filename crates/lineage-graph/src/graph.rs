//! Append-only, layered version graph.
//!
//! Every [`VersionGraph::commit`] produces a new graph whose newest layer
//! holds the committed nodes and points at the previous graph's layers.
//! Older graphs stay valid and share every node with the newer ones.
//!
//! Lookups walk the layer chain from newest to oldest. When the chain grows
//! beyond [`GraphConfig::max_layer_depth`], the commit flattens it into a
//! single layer (still sharing the same nodes).
//!
//! All graphs of one lineage share a cache budget: at most
//! [`GraphConfig::cache_capacity`] nodes keep their derived caches filled.

use crate::cache::CacheBudget;
use crate::error::{GraphError, Result};
use crate::merge::Merge;
use crate::node::VersionNode;
use lineage_core::{Revision, Version, VersionError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, trace};

type NodeRef<V> = Arc<VersionNode<V>>;
type HeadIndex<V> = BTreeMap<String, BTreeMap<Revision, NodeRef<V>>>;

/// Configuration for a version graph lineage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Maximum number of layers a lookup may walk before commits flatten
    /// the chain.
    pub max_layer_depth: usize,
    /// Maximum number of nodes whose ancestry and resolved state stay
    /// cached at once; `0` leaves caches unbounded.
    pub cache_capacity: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            max_layer_depth: 32,
            cache_capacity: 16_384,
        }
    }
}

struct Layer<V> {
    parent: Option<Arc<Layer<V>>>,
    nodes: HashMap<Revision, NodeRef<V>>,
    depth: usize,
}

impl<V> Layer<V> {
    fn empty() -> Self {
        Layer {
            parent: None,
            nodes: HashMap::new(),
            depth: 0,
        }
    }

    fn find(&self, revision: &Revision) -> Option<&NodeRef<V>> {
        let mut layer = Some(self);
        while let Some(current) = layer {
            if let Some(node) = current.nodes.get(revision) {
                return Some(node);
            }
            layer = current.parent.as_deref();
        }
        None
    }

    fn iter(&self) -> impl Iterator<Item = &NodeRef<V>> {
        std::iter::successors(Some(self), |layer| layer.parent.as_deref())
            .flat_map(|layer| layer.nodes.values())
    }
}

/// An immutable snapshot of a document's version history.
pub struct VersionGraph<V = serde_json::Value> {
    layer: Arc<Layer<V>>,
    heads: Arc<HeadIndex<V>>,
    tip: Option<NodeRef<V>>,
    len: usize,
    config: GraphConfig,
    budget: Option<Arc<CacheBudget<V>>>,
}

impl<V> Clone for VersionGraph<V> {
    fn clone(&self) -> Self {
        VersionGraph {
            layer: Arc::clone(&self.layer),
            heads: Arc::clone(&self.heads),
            tip: self.tip.clone(),
            len: self.len,
            config: self.config,
            budget: self.budget.clone(),
        }
    }
}

impl<V> Default for VersionGraph<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> VersionGraph<V> {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    /// Create an empty graph with the given configuration.
    pub fn with_config(config: GraphConfig) -> Self {
        VersionGraph {
            layer: Arc::new(Layer::empty()),
            heads: Arc::new(BTreeMap::new()),
            tip: None,
            len: 0,
            config,
            budget: NonZeroUsize::new(config.cache_capacity)
                .map(|capacity| Arc::new(CacheBudget::new(capacity))),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Number of versions in the graph.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The most recently committed node.
    pub fn tip(&self) -> Option<&NodeRef<V>> {
        self.tip.as_ref()
    }

    pub fn contains(&self, revision: &Revision) -> bool {
        self.layer.find(revision).is_some()
    }

    /// Look up a node anywhere in the layer chain.
    pub fn get_version_node(&self, revision: &Revision) -> Result<NodeRef<V>> {
        self.layer
            .find(revision)
            .cloned()
            .ok_or(GraphError::NotFound(*revision))
    }

    /// Leaf nodes of `branch`, ordered by revision.
    pub fn heads(&self, branch: &str) -> Vec<NodeRef<V>> {
        self.heads
            .get(branch)
            .map(|heads| heads.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every branch with at least one version.
    pub fn branches(&self) -> BTreeSet<String> {
        self.heads.keys().cloned().collect()
    }

    /// Newest nodes of `branch`: its heads, or when a child on another
    /// branch retired all of them, the branch nodes that no other node of
    /// the branch descends from. Ordered by revision.
    pub fn branch_frontier(&self, branch: &str) -> Vec<NodeRef<V>>
    where
        V: Clone + PartialEq,
    {
        let heads = self.heads(branch);
        if !heads.is_empty() || !self.heads.contains_key(branch) {
            return heads;
        }

        let members: BTreeMap<Revision, NodeRef<V>> = self
            .layer
            .iter()
            .filter(|node| node.branch() == branch)
            .map(|node| (*node.revision(), Arc::clone(node)))
            .collect();
        let mut frontier = members.clone();
        for node in members.values() {
            let ancestry = node.ancestry();
            frontier.retain(|revision, _| revision == node.revision() || !ancestry.contains(revision));
        }
        frontier.into_values().collect()
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> Vec<NodeRef<V>> {
        let mut nodes: Vec<_> = self.layer.iter().cloned().collect();
        nodes.sort_by_key(|node| node.sequence());
        nodes
    }

    /// Number of layers a lookup may have to walk.
    pub fn layer_depth(&self) -> usize {
        self.layer.depth
    }

    /// Check whether both handles refer to the same graph snapshot.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.layer, &other.layer) && Arc::ptr_eq(&self.heads, &other.heads)
    }

    /// Drop the cached ancestry and resolved state of every node.
    pub fn evict_caches(&self) {
        for node in self.layer.iter() {
            node.evict_caches();
        }
    }

    /// Number of nodes holding a cached ancestry or resolved state.
    pub fn cached_nodes(&self) -> usize {
        self.layer.iter().filter(|node| node.is_cached()).count()
    }

    /// Build a single-layer graph from nodes given in insertion order.
    fn from_nodes(
        nodes: Vec<NodeRef<V>>,
        config: GraphConfig,
        budget: Option<Arc<CacheBudget<V>>>,
    ) -> Self {
        let mut heads = HeadIndex::new();
        for node in &nodes {
            update_heads(&mut heads, node);
        }
        let len = nodes.len();
        let tip = nodes.last().cloned();
        let layer = Layer {
            parent: None,
            nodes: nodes
                .into_iter()
                .map(|node| (*node.revision(), node))
                .collect(),
            depth: 1,
        };

        VersionGraph {
            layer: Arc::new(layer),
            heads: Arc::new(heads),
            tip,
            len,
            config,
            budget,
        }
    }
}

impl<V: Clone + PartialEq> VersionGraph<V> {
    /// Build a fresh graph from versions whose parents are all in the batch.
    pub fn init<I>(versions: I) -> Result<Self>
    where
        I: IntoIterator<Item = Version<V>>,
    {
        Self::new().commit(versions)
    }

    /// Produce a new graph with `versions` appended, in iteration order.
    ///
    /// Either every version is added or the call fails and nothing changes.
    /// An empty batch returns the same graph.
    pub fn commit<I>(&self, versions: I) -> Result<Self>
    where
        I: IntoIterator<Item = Version<V>>,
    {
        let mut builder = GraphBuilder::new(self);
        for version in versions {
            builder.add(version)?;
        }
        Ok(builder.build())
    }

    /// View of the graph as it was right after `revision` was committed.
    pub fn at(&self, revision: &Revision) -> Result<Self> {
        let target = self.get_version_node(revision)?;
        if self.tip.as_ref().map(|tip| tip.revision()) == Some(revision) {
            return Ok(self.clone());
        }

        let mut nodes = self.nodes();
        nodes.retain(|node| node.sequence() <= target.sequence());
        Ok(Self::from_nodes(nodes, self.config, self.budget.clone()))
    }

    /// Merge the nodes of the given revisions.
    ///
    /// An empty revision set yields [`Merge::empty`].
    pub fn merge_revisions<I>(&self, revisions: I) -> Result<Merge<V>>
    where
        I: IntoIterator<Item = Revision>,
    {
        let heads = revisions
            .into_iter()
            .map(|revision| self.get_version_node(&revision))
            .collect::<Result<Vec<_>>>()?;
        if heads.is_empty() {
            return Ok(Merge::empty());
        }
        Merge::of(heads)
    }

    /// Merge the current heads of the given branches.
    ///
    /// Unknown branches contribute no heads.
    pub fn merge_branches<I, S>(&self, branches: I) -> Result<Merge<V>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let heads: Vec<_> = branches
            .into_iter()
            .flat_map(|branch| self.heads(branch.as_ref()))
            .collect();
        if heads.is_empty() {
            return Ok(Merge::empty());
        }
        Merge::of(heads)
    }
}

impl<V> fmt::Debug for VersionGraph<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionGraph")
            .field("len", &self.len)
            .field("tip", &self.tip.as_ref().map(|tip| *tip.revision()))
            .field("branches", &self.heads.keys().collect::<Vec<_>>())
            .field("layer_depth", &self.layer.depth)
            .finish()
    }
}

/// Accumulates one commit's layer on top of a base graph.
struct GraphBuilder<'a, V> {
    base: &'a VersionGraph<V>,
    nodes: HashMap<Revision, NodeRef<V>>,
    heads: Option<HeadIndex<V>>,
    tip: Option<NodeRef<V>>,
}

impl<'a, V> GraphBuilder<'a, V> {
    fn new(base: &'a VersionGraph<V>) -> Self {
        GraphBuilder {
            base,
            nodes: HashMap::new(),
            heads: None,
            tip: None,
        }
    }

    fn find(&self, revision: &Revision) -> Option<&NodeRef<V>> {
        self.nodes
            .get(revision)
            .or_else(|| self.base.layer.find(revision))
    }

    fn add(&mut self, version: Version<V>) -> Result<()> {
        let revision = *version.revision();

        if version.is_root() && !version.parents().is_empty() {
            return Err(VersionError::InvalidVersion(format!(
                "root version {} declares {} parent(s)",
                revision,
                version.parents().len()
            ))
            .into());
        }
        if self.find(&revision).is_some() {
            return Err(GraphError::DuplicateRevision(revision));
        }

        let parents = version
            .parents()
            .iter()
            .map(|parent| {
                self.find(parent)
                    .cloned()
                    .ok_or(GraphError::MissingParent {
                        revision,
                        parent: *parent,
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let sequence = (self.base.len + self.nodes.len()) as u64;
        let node = VersionNode::new(version, parents, sequence, self.base.budget.clone());

        let heads = self
            .heads
            .get_or_insert_with(|| (*self.base.heads).clone());
        update_heads(heads, &node);

        trace!(revision = %revision, branch = node.branch(), "staged version");
        self.nodes.insert(revision, Arc::clone(&node));
        self.tip = Some(node);
        Ok(())
    }

    fn build(self) -> VersionGraph<V> {
        let (Some(heads), Some(tip)) = (self.heads, self.tip) else {
            return self.base.clone();
        };

        let added = self.nodes.len();
        let len = self.base.len + added;
        let config = self.base.config;

        let parent = (!self.base.is_empty()).then(|| Arc::clone(&self.base.layer));
        let depth = parent.as_ref().map_or(0, |p| p.depth) + 1;
        let layer = if depth > config.max_layer_depth {
            trace!(depth, len, "flattening layer chain");
            let mut nodes: HashMap<_, _> = self
                .base
                .layer
                .iter()
                .map(|node| (*node.revision(), Arc::clone(node)))
                .collect();
            nodes.extend(self.nodes);
            Layer {
                parent: None,
                nodes,
                depth: 1,
            }
        } else {
            Layer {
                parent,
                nodes: self.nodes,
                depth,
            }
        };

        debug!(added, len, tip = %tip.revision(), "committed versions");
        VersionGraph {
            layer: Arc::new(layer),
            heads: Arc::new(heads),
            tip: Some(tip),
            len,
            config,
            budget: self.base.budget.clone(),
        }
    }
}

/// Make `node` a head of its branch and retire its parents as heads.
fn update_heads<V>(heads: &mut HeadIndex<V>, node: &NodeRef<V>) {
    for parent in node.parents() {
        if let Some(branch_heads) = heads.get_mut(parent.branch()) {
            branch_heads.remove(parent.revision());
        }
    }
    heads
        .entry(node.branch().to_string())
        .or_default()
        .insert(*node.revision(), Arc::clone(node));
}
