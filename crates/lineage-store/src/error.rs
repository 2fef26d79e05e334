//! Error types for the store layer.

use crate::store::DocumentId;
use lineage_graph::GraphError;
use thiserror::Error;

/// Errors that can occur while persisting or loading versions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    DocumentNotFound(DocumentId),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
