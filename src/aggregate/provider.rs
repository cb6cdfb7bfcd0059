//! Unit lookup: find and invoke the factory that builds a class's unit.
//!
//! A class without its own factory inherits the nearest ancestor's. The walk
//! follows declared superclasses in the registry and stops at the first
//! framework descriptor or unregistered (platform) name.

use std::collections::BTreeSet;

use tracing::debug;

use crate::model::{ArtifactStore, ClassName};
use crate::registry::{ClassRegistry, UnitFactory};

/// Failures obtaining one class's deployment unit.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Neither the class nor any non-framework ancestor declares a factory.
    #[error("no deployment factory found for {class} or its superclasses")]
    NoFactoryFound {
        /// The class being merged.
        class: ClassName,
    },

    /// The factory ran and returned an error.
    #[error("could not build deployment unit for {class}: {cause:#}")]
    UnitConstructionFailed {
        /// The class being merged.
        class: ClassName,
        /// The factory's error.
        cause: anyhow::Error,
    },
}

impl ProviderError {
    /// The class the failure belongs to.
    #[must_use]
    pub const fn class(&self) -> &ClassName {
        match self {
            Self::NoFactoryFound { class } | Self::UnitConstructionFailed { class, .. } => class,
        }
    }
}

/// One class's freshly built unit. Dropped after it is merged.
#[derive(Debug)]
pub struct DeploymentUnit {
    /// The class the unit was built for.
    pub class: ClassName,
    /// The class whose factory built it (the class itself or an ancestor).
    pub declared_by: ClassName,
    /// Unit content.
    pub store: ArtifactStore,
}

/// Resolves classes to their deployment units.
#[derive(Clone, Copy, Debug)]
pub struct UnitProvider<'r> {
    registry: &'r ClassRegistry,
}

impl<'r> UnitProvider<'r> {
    /// A provider backed by `registry`.
    #[must_use]
    pub const fn new(registry: &'r ClassRegistry) -> Self {
        Self { registry }
    }

    /// Find the factory for `class` and the class that declares it.
    ///
    /// # Errors
    /// Returns [`ProviderError::NoFactoryFound`] if the walk ends without a
    /// factory.
    pub fn find_factory(
        &self,
        class: &ClassName,
    ) -> Result<(&'r ClassName, &'r dyn UnitFactory), ProviderError> {
        let mut seen = BTreeSet::new();
        let mut current = self.registry.get(class);
        while let Some(descriptor) = current {
            if descriptor.is_framework() || !seen.insert(descriptor.name()) {
                break;
            }
            if let Some(factory) = descriptor.declared_factory() {
                return Ok((descriptor.name(), factory));
            }
            current = descriptor.superclass().and_then(|s| self.registry.get(s));
        }
        Err(ProviderError::NoFactoryFound {
            class: class.clone(),
        })
    }

    /// Build the deployment unit for `class`.
    ///
    /// # Errors
    /// Returns [`ProviderError::NoFactoryFound`] if no factory applies and
    /// [`ProviderError::UnitConstructionFailed`] if the factory fails.
    pub fn unit_for(&self, class: &ClassName) -> Result<DeploymentUnit, ProviderError> {
        let (declared_by, factory) = self.find_factory(class)?;
        debug!(class = %class, declared_by = %declared_by, "building deployment unit");
        let store = factory
            .build()
            .map_err(|cause| ProviderError::UnitConstructionFailed {
                class: class.clone(),
                cause,
            })?;
        Ok(DeploymentUnit {
            class: class.clone(),
            declared_by: declared_by.clone(),
            store,
        })
    }
}
