//! Data model: identifiers and the artifact store.

pub mod store;
pub mod types;

pub use store::{ArtifactStore, Asset, MergeCandidate, StoreError};
pub use types::{ArchivePath, ClassName, ValidationError};
