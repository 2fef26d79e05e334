//! Error types for revisions, paths and versions.

use thiserror::Error;

/// Errors raised while building or parsing core values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Invalid revision: {0}")]
    InvalidRevision(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

pub type Result<T> = std::result::Result<T, VersionError>;
