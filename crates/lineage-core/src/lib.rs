//! # lineage-core
//!
//! Value types shared by every Lineage crate:
//! - [`Revision`]: totally ordered, globally unique version identifier
//! - [`Path`]: hierarchical property path used as changeset key
//! - [`Version`]: immutable changeset with parents, branch and kind
//!
//! ## Example
//!
//! ```rust
//! use lineage_core::{Path, Version};
//! use serde_json::json;
//!
//! let first: Version = Version::builder()
//!     .with_value(Path::parse("firstName").unwrap(), json!("John"))
//!     .build()
//!     .unwrap();
//!
//! let second: Version = Version::builder()
//!     .with_parent(*first.revision())
//!     .with_tombstone(Path::parse("firstName").unwrap())
//!     .build()
//!     .unwrap();
//!
//! assert!(first.revision() < second.revision());
//! assert_eq!(second.changeset().len(), 1);
//! ```

pub mod error;
pub mod path;
pub mod revision;
pub mod version;

pub use error::{Result, VersionError};
pub use path::{Path, Segment};
pub use revision::{Revision, RevisionClock};
pub use version::{Version, VersionBuilder, VersionKind, DEFAULT_BRANCH};
