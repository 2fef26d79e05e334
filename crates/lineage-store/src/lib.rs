//! # lineage-store
//!
//! Persistence and JSON projection for Lineage version graphs.
//!
//! This crate provides:
//! - [`VersionStore`]: append-only version storage with staged commits
//! - [`MemoryVersionStore`]: in-memory store, serializable to JSON
//! - [`DocumentRepository`]: loads and extends the graph of a document
//! - [`to_json`] / [`flatten_json`]: nested documents to property maps and back
//!
//! ## Example
//!
//! ```rust
//! use lineage_graph::VersionGraph;
//! use lineage_store::{DocumentId, DocumentRepository, MemoryVersionStore};
//! use serde_json::json;
//!
//! let repo: DocumentRepository<MemoryVersionStore> =
//!     DocumentRepository::new(MemoryVersionStore::new());
//! let id = DocumentId::new();
//!
//! let graph = repo
//!     .write_document(&id, &VersionGraph::new(), "default", &json!({"name": "John"}))
//!     .unwrap();
//! let graph = repo
//!     .write_document(&id, &graph, "alt", &json!({"name": "Jane"}))
//!     .unwrap();
//!
//! let reloaded = repo.load_graph(&id).unwrap();
//! assert_eq!(reloaded.len(), graph.len());
//! assert_eq!(
//!     repo.read_document(&reloaded, ["alt"]).unwrap(),
//!     json!({"name": "Jane"})
//! );
//! ```

pub mod error;
pub mod json;
pub mod repository;
pub mod store;

pub use error::{Result, StoreError};
pub use json::{changeset_from_json, flatten_json, to_json};
pub use repository::DocumentRepository;
pub use store::{DocumentId, MemoryVersionStore, VersionStore};
