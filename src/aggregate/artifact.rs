//! The aggregate being built: one store plus the classes it must carry.

use std::collections::BTreeSet;

use crate::model::{ArchivePath, ArtifactStore, ClassName, ValidationError};

/// Archive directory holding compiled classes.
pub const CLASSES_DIR: &str = "/WEB-INF/classes";

/// Archive path of `class`'s compiled file.
///
/// # Errors
/// Returns [`ValidationError`] if the class name does not form a valid path.
pub fn class_file_entry(class: &ClassName) -> Result<ArchivePath, ValidationError> {
    ArchivePath::new(&format!("{CLASSES_DIR}/{}", class.class_file_path()))
}

/// The merged deployment handed back to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregateArtifact {
    store: ArtifactStore,
    required: BTreeSet<ClassName>,
}

impl AggregateArtifact {
    /// An empty aggregate named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            store: ArtifactStore::new(name),
            required: BTreeSet::new(),
        }
    }

    /// Deployment name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.store.name()
    }

    /// The merged content.
    #[must_use]
    pub const fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub(crate) const fn store_mut(&mut self) -> &mut ArtifactStore {
        &mut self.store
    }

    /// Consume the aggregate, returning its store.
    #[must_use]
    pub fn into_store(self) -> ArtifactStore {
        self.store
    }

    /// Record `class` as required. Its class file is not placed here: the
    /// aggregator merges it like any unit entry.
    ///
    /// Returns `false` if the class was already required.
    pub fn require(&mut self, class: &ClassName) -> bool {
        self.required.insert(class.clone())
    }

    /// Returns `true` if `class` is required.
    #[must_use]
    pub fn is_required(&self, class: &ClassName) -> bool {
        self.required.contains(class)
    }

    /// Required classes in name order.
    pub fn required_classes(&self) -> impl Iterator<Item = &ClassName> {
        self.required.iter()
    }

    /// Number of required classes.
    #[must_use]
    pub fn required_count(&self) -> usize {
        self.required.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_marks_without_touching_store() {
        let class = ClassName::new("a.b.CTest").unwrap();
        let mut agg = AggregateArtifact::new("x.war");

        assert!(agg.require(&class));
        assert!(!agg.require(&class));
        assert!(agg.store().is_empty());
        assert_eq!(agg.name(), "x.war");
        assert_eq!(agg.required_count(), 1);
    }

    #[test]
    fn class_file_entry_lives_under_web_inf_classes() {
        let class = ClassName::new("a.b.CTest").unwrap();
        assert_eq!(
            class_file_entry(&class).unwrap().as_str(),
            "/WEB-INF/classes/a/b/CTest.class"
        );
    }
}
