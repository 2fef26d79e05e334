//! # lineage-graph
//!
//! Append-only version DAG with property-level merge.
//!
//! This crate provides:
//! - [`VersionGraph`]: immutable graph snapshots; commits return a new graph
//! - [`VersionNode`]: a version with resolved parents and lazily cached state
//! - [`Merge`]: last-writer-wins merge of concurrent heads with conflict reports
//!
//! ## Resolution
//!
//! Every node resolves to a full property map: the merge of its parents'
//! states with its own changeset applied on top. Resolved states and
//! ancestry sets are cached per node and can be evicted at any time; they
//! are recomputed on demand.
//!
//! ## Example
//!
//! ```rust
//! use lineage_core::{Path, Version};
//! use lineage_graph::VersionGraph;
//! use serde_json::json;
//!
//! let status = Path::parse("status").unwrap();
//!
//! let base: Version = Version::builder()
//!     .with_value(status.clone(), json!("draft"))
//!     .build()
//!     .unwrap();
//! let review: Version = Version::builder()
//!     .with_parent(*base.revision())
//!     .with_value(status.clone(), json!("review"))
//!     .build()
//!     .unwrap();
//! let published: Version = Version::builder()
//!     .with_parent(*base.revision())
//!     .with_branch("alt")
//!     .with_value(status.clone(), json!("published"))
//!     .build()
//!     .unwrap();
//!
//! let graph = VersionGraph::init([base, review.clone(), published.clone()]).unwrap();
//! let merge = graph.merge_branches(["default", "alt"]).unwrap();
//!
//! assert_eq!(merge.property(&status), Some(&json!("published")));
//! assert_eq!(merge.conflicts_at(&status).len(), 1);
//! assert_eq!(merge.conflicts_at(&status)[0].revision, *review.revision());
//! ```

mod cache;
pub mod error;
pub mod graph;
pub mod merge;
pub mod node;

pub use error::{GraphError, Result};
pub use graph::{GraphConfig, VersionGraph};
pub use merge::{Merge, VersionProperty};
pub use node::{Ancestry, VersionNode};
