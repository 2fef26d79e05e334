//! Document repository: version graphs backed by a [`VersionStore`].
//!
//! The repository keeps no state of its own besides the store. Callers hold
//! on to the [`VersionGraph`] they loaded and pass it back when committing;
//! the graph is extended first, so ordering and duplicate errors surface
//! before anything is written.

use crate::error::Result;
use crate::json::{changeset_from_json, to_json};
use crate::store::{DocumentId, VersionStore};
use lineage_core::Version;
use lineage_graph::{GraphConfig, GraphError, VersionGraph};
use serde_json::Value;
use std::marker::PhantomData;
use tracing::{debug, warn};

/// Loads and extends the version graphs of stored documents.
#[derive(Debug)]
pub struct DocumentRepository<S, V = Value> {
    store: S,
    config: GraphConfig,
    _values: PhantomData<fn() -> V>,
}

impl<S, V> DocumentRepository<S, V>
where
    S: VersionStore<V>,
    V: Clone + PartialEq,
{
    pub fn new(store: S) -> Self {
        Self::with_config(store, GraphConfig::default())
    }

    /// Use `config` for every graph this repository builds.
    pub fn with_config(store: S, config: GraphConfig) -> Self {
        DocumentRepository {
            store,
            config,
            _values: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Rebuild the graph of `document` from its stored versions.
    pub fn load_graph(&self, document: &DocumentId) -> Result<VersionGraph<V>> {
        let versions = self.store.load(document)?;
        debug!(document = %document, versions = versions.len(), "loading graph");
        Ok(VersionGraph::with_config(self.config).commit(versions)?)
    }

    /// Commit `versions` on top of `graph` and persist them.
    ///
    /// Returns the extended graph. On error the store is left as it was.
    pub fn commit_versions(
        &self,
        document: &DocumentId,
        graph: &VersionGraph<V>,
        versions: Vec<Version<V>>,
    ) -> Result<VersionGraph<V>> {
        if versions.is_empty() {
            return Ok(graph.clone());
        }

        let extended = graph.commit(versions.iter().cloned())?;
        if let Err(err) = self.persist(document, versions) {
            warn!(document = %document, error = %err, "persisting versions failed");
            self.store.rollback()?;
            return Err(err);
        }
        Ok(extended)
    }

    fn persist(&self, document: &DocumentId, versions: Vec<Version<V>>) -> Result<()> {
        self.store.append(document, versions)?;
        self.store.commit()
    }
}

impl<S: VersionStore<Value>> DocumentRepository<S, Value> {
    /// The merged document of the given branches as nested JSON.
    pub fn read_document<I, B>(&self, graph: &VersionGraph, branches: I) -> Result<Value>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<str>,
    {
        let merge = graph.merge_branches(branches)?;
        to_json(merge.properties())
    }

    /// Record `document` as the next state of `branch`.
    ///
    /// The new version's parents are the newest nodes of `branch` (see
    /// [`VersionGraph::branch_frontier`]), so a branch whose heads were
    /// retired by a child on another branch keeps its history. The changeset
    /// is the difference between the parents' merge and `document`.
    /// Returns the graph unchanged when nothing differs.
    pub fn write_document(
        &self,
        id: &DocumentId,
        graph: &VersionGraph,
        branch: &str,
        document: &Value,
    ) -> Result<VersionGraph> {
        let parents = graph.branch_frontier(branch);
        let merge = graph.merge_revisions(parents.iter().map(|node| *node.revision()))?;
        let previous = to_json(merge.properties())?;

        let changeset = changeset_from_json(&previous, document);
        if changeset.is_empty() {
            return Ok(graph.clone());
        }

        let version = Version::builder()
            .with_branch(branch)
            .with_parents(parents.iter().map(|node| *node.revision()))
            .with_changeset(changeset)
            .build()
            .map_err(GraphError::from)?;
        self.commit_versions(id, graph, vec![version])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryVersionStore;
    use lineage_core::{Path, Revision};
    use serde_json::json;

    fn repository() -> DocumentRepository<MemoryVersionStore> {
        DocumentRepository::new(MemoryVersionStore::new())
    }

    #[test]
    fn test_load_unknown_document() {
        let repo = repository();
        let id = DocumentId::new();
        assert_eq!(
            repo.load_graph(&id).unwrap_err(),
            StoreError::DocumentNotFound(id)
        );
    }

    #[test]
    fn test_commit_then_reload() {
        let repo = repository();
        let id = DocumentId::new();
        let v1: Version = Version::builder()
            .with_value(Path::parse("a").unwrap(), json!(1))
            .build()
            .unwrap();

        let graph = repo
            .commit_versions(&id, &VersionGraph::new(), vec![v1.clone()])
            .unwrap();
        let loaded = repo.load_graph(&id).unwrap();

        assert_eq!(loaded.len(), graph.len());
        assert_eq!(
            loaded.get_version_node(v1.revision()).unwrap().version(),
            &v1
        );
    }

    #[test]
    fn test_rejected_commit_writes_nothing() {
        let repo = repository();
        let id = DocumentId::new();
        let missing = Revision::new();
        let orphan: Version = Version::builder().with_parent(missing).build().unwrap();

        let result = repo.commit_versions(&id, &VersionGraph::new(), vec![orphan.clone()]);
        assert_eq!(
            result.unwrap_err(),
            StoreError::Graph(GraphError::MissingParent {
                revision: *orphan.revision(),
                parent: missing,
            })
        );
        assert!(repo.store().is_empty());
        assert_eq!(repo.store().pending_len(), 0);
    }

    #[test]
    fn test_write_and_read_document() {
        let repo = repository();
        let id = DocumentId::new();
        let graph = VersionGraph::new();

        let graph = repo
            .write_document(&id, &graph, "default", &json!({"name": "John", "tags": ["a"]}))
            .unwrap();
        let graph = repo
            .write_document(&id, &graph, "default", &json!({"name": "Jane", "tags": ["a"]}))
            .unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(
            repo.read_document(&graph, ["default"]).unwrap(),
            json!({"name": "Jane", "tags": ["a"]})
        );

        let reloaded = repo.load_graph(&id).unwrap();
        assert_eq!(
            repo.read_document(&reloaded, ["default"]).unwrap(),
            json!({"name": "Jane", "tags": ["a"]})
        );
    }

    #[test]
    fn test_unchanged_document_adds_no_version() {
        let repo = repository();
        let id = DocumentId::new();
        let document = json!({"a": 1});

        let graph = repo
            .write_document(&id, &VersionGraph::new(), "default", &document)
            .unwrap();
        let same = repo.write_document(&id, &graph, "default", &document).unwrap();

        assert!(same.ptr_eq(&graph));
        assert_eq!(repo.store().len(), 1);
    }

    #[test]
    fn test_write_after_branch_retired_keeps_history() {
        let repo = repository();
        let id = DocumentId::new();
        let graph = repo
            .write_document(&id, &VersionGraph::new(), "default", &json!({"name": "John", "age": 30}))
            .unwrap();
        let base = graph.heads("default")[0].clone();

        let fork: Version = Version::builder()
            .with_branch("alt")
            .with_parent(*base.revision())
            .with_value(Path::parse("city").unwrap(), json!("Paris"))
            .build()
            .unwrap();
        let graph = repo.commit_versions(&id, &graph, vec![fork]).unwrap();
        assert!(graph.heads("default").is_empty());

        let graph = repo
            .write_document(&id, &graph, "default", &json!({"name": "John", "age": 31}))
            .unwrap();
        let heads = graph.heads("default");
        assert_eq!(heads.len(), 1);
        assert_eq!(heads[0].parents().len(), 1);
        assert_eq!(heads[0].parents()[0].revision(), base.revision());
        assert_eq!(heads[0].changeset().len(), 1);

        let merge = graph.merge_branches(["default", "alt"]).unwrap();
        assert!(!merge.has_conflicts());
        assert_eq!(
            repo.read_document(&graph, ["default", "alt"]).unwrap(),
            json!({"name": "John", "age": 31, "city": "Paris"})
        );
    }

    #[test]
    fn test_read_oversized_index_is_an_error() {
        let repo = repository();
        let id = DocumentId::new();
        let version: Version = Version::builder()
            .with_value(Path::parse("list[4000000000]").unwrap(), json!(1))
            .build()
            .unwrap();
        let graph = repo
            .commit_versions(&id, &VersionGraph::new(), vec![version])
            .unwrap();

        assert!(matches!(
            repo.read_document(&graph, ["default"]),
            Err(StoreError::Serialization(_))
        ));
        assert!(matches!(
            repo.write_document(&id, &graph, "default", &json!({})),
            Err(StoreError::Serialization(_))
        ));
    }
}
