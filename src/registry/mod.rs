//! Class registry: explicit class metadata and unit factories.
//!
//! The aggregator never inspects compiled classes. Everything it needs to
//! know about a class is declared up front in a [`ClassDescriptor`]:
//!
//! - its superclass and interfaces (for the class closure);
//! - its tags (e.g. [`IGNORE_AGGREGATION`]);
//! - its bytecode, when known (copied into the aggregate by the closure);
//! - an optional [`UnitFactory`] that builds its deployment unit;
//! - namespace declarations at class and method level.
//!
//! A descriptor without a factory inherits the nearest ancestor's. A
//! descriptor marked `framework` ends that search.
//!
//! Registries are built in code or loaded from a TOML manifest (see
//! [`manifest`]).

pub mod manifest;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::model::{ArtifactStore, Asset, ClassName};

/// Tag excluding a class from batch aggregation; it needs its own
/// deployment.
pub const IGNORE_AGGREGATION: &str = "ignore-aggregation";

// ---------------------------------------------------------------------------
// UnitFactory
// ---------------------------------------------------------------------------

/// Builds one class's self-contained deployment unit.
///
/// Implemented for any `Fn() -> anyhow::Result<ArtifactStore>`, so most
/// registrations are plain closures or function items.
pub trait UnitFactory: Send + Sync {
    /// Build a fresh unit.
    ///
    /// # Errors
    /// Any error is reported as a unit construction failure for the class
    /// being merged.
    fn build(&self) -> anyhow::Result<ArtifactStore>;
}

impl<F> UnitFactory for F
where
    F: Fn() -> anyhow::Result<ArtifactStore> + Send + Sync,
{
    fn build(&self) -> anyhow::Result<ArtifactStore> {
        self()
    }
}

// ---------------------------------------------------------------------------
// ClassDescriptor
// ---------------------------------------------------------------------------

/// Declared metadata for one class.
#[derive(Clone)]
pub struct ClassDescriptor {
    name: ClassName,
    superclass: Option<ClassName>,
    interfaces: Vec<ClassName>,
    tags: BTreeSet<String>,
    framework: bool,
    bytecode: Option<Asset>,
    factory: Option<Arc<dyn UnitFactory>>,
    namespaces: Vec<String>,
    method_namespaces: BTreeMap<String, Vec<String>>,
}

impl ClassDescriptor {
    /// A descriptor with no supertypes, tags, bytecode, or factory.
    #[must_use]
    pub fn new(name: ClassName) -> Self {
        Self {
            name,
            superclass: None,
            interfaces: Vec::new(),
            tags: BTreeSet::new(),
            framework: false,
            bytecode: None,
            factory: None,
            namespaces: Vec::new(),
            method_namespaces: BTreeMap::new(),
        }
    }

    /// Set the superclass.
    #[must_use]
    pub fn extends(mut self, superclass: ClassName) -> Self {
        self.superclass = Some(superclass);
        self
    }

    /// Add a declared interface.
    #[must_use]
    pub fn implements(mut self, interface: ClassName) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Mark as a framework class (factory lookup stops here).
    #[must_use]
    pub const fn framework(mut self) -> Self {
        self.framework = true;
        self
    }

    /// Attach compiled class content.
    #[must_use]
    pub fn bytecode(mut self, asset: Asset) -> Self {
        self.bytecode = Some(asset);
        self
    }

    /// Register the unit factory.
    #[must_use]
    pub fn factory(mut self, factory: impl UnitFactory + 'static) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Declare class-level namespaces.
    #[must_use]
    pub fn within_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespaces = namespaces.into_iter().map(Into::into).collect();
        self
    }

    /// Declare namespaces for one test method.
    #[must_use]
    pub fn method_within_namespaces<I, S>(mut self, method: impl Into<String>, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.method_namespaces.insert(
            method.into(),
            namespaces.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// The class name.
    #[must_use]
    pub const fn name(&self) -> &ClassName {
        &self.name
    }

    /// The declared superclass, if any.
    #[must_use]
    pub const fn superclass(&self) -> Option<&ClassName> {
        self.superclass.as_ref()
    }

    /// Declared interfaces in declaration order.
    #[must_use]
    pub fn interfaces(&self) -> &[ClassName] {
        &self.interfaces
    }

    /// Returns `true` if the class carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// All tags, sorted.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Returns `true` for framework classes.
    #[must_use]
    pub const fn is_framework(&self) -> bool {
        self.framework
    }

    /// Compiled class content, if known.
    #[must_use]
    pub const fn class_bytes(&self) -> Option<&Asset> {
        self.bytecode.as_ref()
    }

    /// The factory declared directly on this class.
    #[must_use]
    pub fn declared_factory(&self) -> Option<&dyn UnitFactory> {
        self.factory.as_deref()
    }

    /// Class-level namespaces.
    #[must_use]
    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// Namespaces declared on `method`, if any.
    #[must_use]
    pub fn method_namespaces(&self, method: &str) -> &[String] {
        self.method_namespaces
            .get(method)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("superclass", &self.superclass)
            .field("interfaces", &self.interfaces)
            .field("tags", &self.tags)
            .field("framework", &self.framework)
            .field("bytecode", &self.bytecode)
            .field("factory", &self.factory.as_ref().map(|_| "<factory>"))
            .field("namespaces", &self.namespaces)
            .field("method_namespaces", &self.method_namespaces)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ClassRegistry
// ---------------------------------------------------------------------------

/// Registering a class twice.
#[derive(Debug, thiserror::Error)]
#[error("class {0} is already registered")]
pub struct DuplicateClass(pub ClassName);

/// Lookup table from class name to descriptor, plus package-level
/// namespace declarations.
#[derive(Clone, Debug, Default)]
pub struct ClassRegistry {
    classes: BTreeMap<ClassName, ClassDescriptor>,
    package_namespaces: BTreeMap<String, Vec<String>>,
}

impl ClassRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor.
    ///
    /// # Errors
    /// Returns [`DuplicateClass`] if the name is already registered.
    pub fn register(&mut self, descriptor: ClassDescriptor) -> Result<(), DuplicateClass> {
        if self.classes.contains_key(descriptor.name()) {
            return Err(DuplicateClass(descriptor.name().clone()));
        }
        self.classes.insert(descriptor.name().clone(), descriptor);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    ///
    /// # Errors
    /// Returns [`DuplicateClass`] if the name is already registered.
    pub fn with(mut self, descriptor: ClassDescriptor) -> Result<Self, DuplicateClass> {
        self.register(descriptor)?;
        Ok(self)
    }

    /// Declare namespaces for every class in `package`.
    pub fn set_package_namespaces<I, S>(&mut self, package: impl Into<String>, namespaces: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.package_namespaces.insert(
            package.into(),
            namespaces.into_iter().map(Into::into).collect(),
        );
    }

    /// Look up a class.
    #[must_use]
    pub fn get(&self, name: &ClassName) -> Option<&ClassDescriptor> {
        self.classes.get(name)
    }

    /// Package-level namespaces for `package`.
    #[must_use]
    pub fn package_namespaces(&self, package: &str) -> &[String] {
        self.package_namespaces
            .get(package)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of registered classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// All descriptors in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ClassDescriptor> {
        self.classes.values()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
