//! Version persistence trait and the in-memory implementation.
//!
//! Stores are append-only per document. Appended versions are staged until
//! [`VersionStore::commit`] makes them visible to [`VersionStore::load`];
//! [`VersionStore::rollback`] discards whatever is staged.

use crate::error::{Result, StoreError};
use lineage_core::Version;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use ulid::Ulid;

/// Unique identifier for a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Ulid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Ulid> for DocumentId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DocumentId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| StoreError::Serialization(format!("invalid document id {s:?}: {e}")))
    }
}

/// Trait for append-only version storage.
pub trait VersionStore<V = serde_json::Value>: Send + Sync {
    /// Stage versions for `document`, keeping their order.
    fn append(&self, document: &DocumentId, versions: Vec<Version<V>>) -> Result<()>;

    /// Make every staged version visible.
    fn commit(&self) -> Result<()>;

    /// Discard every staged version.
    fn rollback(&self) -> Result<()>;

    /// Committed versions of `document` in append order.
    fn load(&self, document: &DocumentId) -> Result<Vec<Version<V>>>;

    /// Every document with committed versions.
    fn documents(&self) -> Result<BTreeSet<DocumentId>>;
}

type Documents<V> = BTreeMap<DocumentId, Vec<Version<V>>>;

/// In-memory implementation of [`VersionStore`].
pub struct MemoryVersionStore<V = serde_json::Value> {
    pending: RwLock<Documents<V>>,
    committed: RwLock<Documents<V>>,
}

impl<V> MemoryVersionStore<V> {
    /// Create a new empty store.
    pub fn new() -> Self {
        MemoryVersionStore {
            pending: RwLock::new(BTreeMap::new()),
            committed: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of staged versions across all documents.
    pub fn pending_len(&self) -> usize {
        self.pending.read().values().map(Vec::len).sum()
    }

    /// Number of committed versions across all documents.
    pub fn len(&self) -> usize {
        self.committed.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Serialize> MemoryVersionStore<V> {
    /// Serialize every committed version to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&*self.committed.read())?)
    }
}

impl<V: DeserializeOwned> MemoryVersionStore<V> {
    /// Rebuild a store from [`MemoryVersionStore::to_json`] output.
    pub fn from_json(json: &str) -> Result<Self> {
        let committed: Documents<V> = serde_json::from_str(json)?;
        Ok(MemoryVersionStore {
            pending: RwLock::new(BTreeMap::new()),
            committed: RwLock::new(committed),
        })
    }
}

impl<V> Default for MemoryVersionStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for MemoryVersionStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryVersionStore")
            .field("documents", &self.committed.read().len())
            .field("committed", &self.len())
            .field("pending", &self.pending_len())
            .finish()
    }
}

impl<V: Clone + Send + Sync> VersionStore<V> for MemoryVersionStore<V> {
    fn append(&self, document: &DocumentId, versions: Vec<Version<V>>) -> Result<()> {
        if versions.is_empty() {
            return Ok(());
        }
        debug!(document = %document, count = versions.len(), "staging versions");
        self.pending
            .write()
            .entry(*document)
            .or_default()
            .extend(versions);
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut pending = self.pending.write();
        if pending.is_empty() {
            return Ok(());
        }
        let mut committed = self.committed.write();
        let staged = std::mem::take(&mut *pending);
        debug!(documents = staged.len(), "committing staged versions");
        for (document, versions) in staged {
            committed.entry(document).or_default().extend(versions);
        }
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let discarded = std::mem::take(&mut *self.pending.write());
        if !discarded.is_empty() {
            debug!(documents = discarded.len(), "discarded staged versions");
        }
        Ok(())
    }

    fn load(&self, document: &DocumentId) -> Result<Vec<Version<V>>> {
        self.committed
            .read()
            .get(document)
            .cloned()
            .ok_or(StoreError::DocumentNotFound(*document))
    }

    fn documents(&self) -> Result<BTreeSet<DocumentId>> {
        Ok(self.committed.read().keys().copied().collect())
    }
}
