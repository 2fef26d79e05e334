//! Error types for graph construction, lookup and merging.

use lineage_core::{Revision, VersionError};
use thiserror::Error;

/// Errors that can occur while building or querying a version graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A committed version references a parent the graph does not contain.
    #[error("Version not found: parent {parent} of {revision}")]
    MissingParent { revision: Revision, parent: Revision },

    #[error("Duplicate revision: {0}")]
    DuplicateRevision(Revision),

    #[error("Version not found: {0}")]
    NotFound(Revision),

    #[error("Nothing to merge: at least one head is required")]
    EmptyMergeInput,

    #[error(transparent)]
    Version(#[from] VersionError),
}

pub type Result<T> = std::result::Result<T, GraphError>;
