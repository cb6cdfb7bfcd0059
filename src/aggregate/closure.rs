//! Class closure: make every supertype of a merged class part of the
//! aggregate.
//!
//! A test class is only loadable in the aggregate if its superclasses and
//! interfaces are too. The closure walks declared metadata in the registry
//! and records each reachable class as required. Names absent from the
//! registry are platform types and end the walk, as does a descriptor with
//! no superclass.
//!
//! Known bytecode is handed back as a small store rather than written into
//! the aggregate, so it meets the conflict policy like unit content does.

use tracing::trace;

use super::artifact::{AggregateArtifact, class_file_entry};
use crate::model::{ArtifactStore, ClassName, ValidationError};
use crate::registry::ClassRegistry;

/// What one registration newly added.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClosureAdditions {
    /// Newly required classes, in walk order.
    pub classes: Vec<ClassName>,
    /// Class files of the new classes whose bytecode is known.
    pub class_files: ArtifactStore,
}

/// Registers classes and their supertypes in an aggregate.
#[derive(Clone, Copy, Debug)]
pub struct ClassClosure<'r> {
    registry: &'r ClassRegistry,
}

impl<'r> ClassClosure<'r> {
    /// A closure walker backed by `registry`.
    #[must_use]
    pub const fn new(registry: &'r ClassRegistry) -> Self {
        Self { registry }
    }

    /// Mark `class` and every registered supertype as required in `target`,
    /// returning the class files still to be merged.
    ///
    /// Already-required classes are not walked again: their supertypes were
    /// added when they were.
    ///
    /// # Errors
    /// Returns [`ValidationError`] if a class name does not form a valid
    /// archive path.
    pub fn register(
        &self,
        class: &ClassName,
        target: &mut AggregateArtifact,
    ) -> Result<ClosureAdditions, ValidationError> {
        let mut additions = ClosureAdditions {
            classes: Vec::new(),
            class_files: ArtifactStore::new(format!("{class} closure")),
        };
        let mut pending = vec![class];
        while let Some(name) = pending.pop() {
            let Some(descriptor) = self.registry.get(name) else {
                trace!(class = %name, "platform type, not packaged");
                continue;
            };
            if !target.require(name) {
                continue;
            }
            if let Some(bytes) = descriptor.class_bytes() {
                additions.class_files.add(class_file_entry(name)?, bytes.clone());
            }
            additions.classes.push(name.clone());
            if let Some(superclass) = descriptor.superclass() {
                pending.push(superclass);
            }
            pending.extend(descriptor.interfaces().iter().rev());
        }
        Ok(additions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArchivePath, Asset};
    use crate::registry::ClassDescriptor;

    fn cn(s: &str) -> ClassName {
        ClassName::new(s).unwrap()
    }

    fn registry() -> ClassRegistry {
        ClassRegistry::new()
            .with(ClassDescriptor::new(cn("t.Marker")))
            .and_then(|r| r.with(ClassDescriptor::new(cn("t.Listener")).implements(cn("t.Marker"))))
            .and_then(|r| {
                r.with(
                    ClassDescriptor::new(cn("t.Base"))
                        .extends(cn("java.lang.Object"))
                        .implements(cn("java.io.Serializable"))
                        .bytecode(Asset::from("base-bytes")),
                )
            })
            .and_then(|r| {
                r.with(
                    ClassDescriptor::new(cn("t.FooTest"))
                        .extends(cn("t.Base"))
                        .implements(cn("t.Listener"))
                        .bytecode(Asset::from("foo-bytes")),
                )
            })
            .unwrap()
    }

    fn names(artifact: &AggregateArtifact) -> Vec<&str> {
        artifact.required_classes().map(ClassName::as_str).collect()
    }

    #[test]
    fn walks_superclasses_and_interfaces() {
        let reg = registry();
        let mut agg = AggregateArtifact::new("agg.war");
        let added = ClassClosure::new(&reg)
            .register(&cn("t.FooTest"), &mut agg)
            .unwrap();

        assert_eq!(added.classes.len(), 4);
        assert_eq!(added.classes[0], cn("t.FooTest"));
        assert_eq!(names(&agg), ["t.Base", "t.FooTest", "t.Listener", "t.Marker"]);
        assert!(!agg.is_required(&cn("java.lang.Object")));
        assert!(!agg.is_required(&cn("java.io.Serializable")));
    }

    #[test]
    fn returns_known_bytecode_under_web_inf_classes() {
        let reg = registry();
        let mut agg = AggregateArtifact::new("agg.war");
        let added = ClassClosure::new(&reg)
            .register(&cn("t.FooTest"), &mut agg)
            .unwrap();

        let path = ArchivePath::new("/WEB-INF/classes/t/FooTest.class").unwrap();
        assert_eq!(added.class_files.get(&path), Some(&Asset::from("foo-bytes")));
        // Only classes with bytecode produce entries.
        assert_eq!(added.class_files.len(), 2);
        // Placing them is the aggregator's job.
        assert!(agg.store().is_empty());
    }

    #[test]
    fn registering_twice_is_a_no_op() {
        let reg = registry();
        let closure = ClassClosure::new(&reg);
        let mut agg = AggregateArtifact::new("agg.war");
        closure.register(&cn("t.FooTest"), &mut agg).unwrap();
        let before = agg.clone();

        let again = closure.register(&cn("t.FooTest"), &mut agg).unwrap();
        assert!(again.classes.is_empty());
        assert!(again.class_files.is_empty());
        assert!(closure.register(&cn("t.Base"), &mut agg).unwrap().classes.is_empty());
        assert_eq!(agg, before);
    }

    #[test]
    fn unregistered_class_adds_nothing() {
        let reg = registry();
        let mut agg = AggregateArtifact::new("agg.war");
        let added = ClassClosure::new(&reg)
            .register(&cn("java.lang.Thread"), &mut agg)
            .unwrap();
        assert!(added.classes.is_empty());
        assert_eq!(agg.required_count(), 0);
    }

    #[test]
    fn cyclic_metadata_terminates() {
        let reg = ClassRegistry::new()
            .with(ClassDescriptor::new(cn("c.A")).extends(cn("c.B")))
            .and_then(|r| r.with(ClassDescriptor::new(cn("c.B")).implements(cn("c.A"))))
            .unwrap();
        let mut agg = AggregateArtifact::new("agg.war");
        let added = ClassClosure::new(&reg).register(&cn("c.A"), &mut agg).unwrap();
        assert_eq!(added.classes.len(), 2);
    }
}
