//! Namespace replication: run a test once per declared namespace.
//!
//! Namespaces are declared on a test method, its class, or its package.
//! The first non-empty level wins, in that order. With the global ignore
//! switch on, or with nothing declared, the test runs once in whatever
//! namespace is current.

use tracing::debug;

use super::{VariantContext, VariantFailure, run_all};
use crate::config::NamespaceConfig;
use crate::error::ErrorAggregate;
use crate::model::ClassName;
use crate::registry::ClassRegistry;

/// In-memory namespace setting.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NamespaceSlot {
    current: Option<String>,
}

impl NamespaceSlot {
    /// A slot holding `namespace`.
    #[must_use]
    pub fn new(namespace: Option<&str>) -> Self {
        Self {
            current: namespace.map(str::to_owned),
        }
    }

    /// The namespace in effect.
    #[must_use]
    pub fn get(&self) -> Option<&str> {
        self.current.as_deref()
    }
}

impl VariantContext for NamespaceSlot {
    fn current(&self) -> Option<String> {
        self.current.clone()
    }

    fn set(&mut self, value: Option<&str>) {
        self.current = value.map(str::to_owned);
    }
}

/// Namespaces declared for `method` of `class`: method level, else class
/// level, else package level. Empty if none are declared.
#[must_use]
pub fn resolve_namespaces<'r>(
    registry: &'r ClassRegistry,
    class: &ClassName,
    method: Option<&str>,
) -> &'r [String] {
    let descriptor = registry.get(class);
    let from_method = descriptor
        .zip(method)
        .map(|(d, m)| d.method_namespaces(m))
        .unwrap_or_default();
    if !from_method.is_empty() {
        return from_method;
    }
    let from_class = descriptor.map(|d| d.namespaces()).unwrap_or_default();
    if !from_class.is_empty() {
        return from_class;
    }
    registry.package_namespaces(class.package().unwrap_or_default())
}

/// How a test will be run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NamespacePlan {
    /// Once, in the current namespace.
    Once,
    /// Once per namespace, in declaration order.
    PerNamespace(Vec<String>),
}

/// Runs tests under their declared namespaces.
#[derive(Clone, Copy, Debug)]
pub struct NamespaceRunner<'r> {
    registry: &'r ClassRegistry,
    ignore_within_namespace: bool,
}

impl<'r> NamespaceRunner<'r> {
    /// A runner backed by `registry`.
    #[must_use]
    pub const fn new(registry: &'r ClassRegistry, config: &NamespaceConfig) -> Self {
        Self {
            registry,
            ignore_within_namespace: config.ignore_within_namespace,
        }
    }

    /// Decide how `method` of `class` runs.
    #[must_use]
    pub fn plan(&self, class: &ClassName, method: Option<&str>) -> NamespacePlan {
        if self.ignore_within_namespace {
            return NamespacePlan::Once;
        }
        match resolve_namespaces(self.registry, class, method) {
            [] => NamespacePlan::Once,
            namespaces => NamespacePlan::PerNamespace(namespaces.to_vec()),
        }
    }

    /// Run `op` for `method` of `class` under its planned namespaces.
    ///
    /// # Errors
    /// As [`run_all`]; a single-run plan returns `op`'s error unchanged.
    pub fn run<C, E, F>(
        &self,
        ctx: &mut C,
        class: &ClassName,
        method: Option<&str>,
        mut op: F,
    ) -> Result<(), E>
    where
        C: VariantContext,
        E: std::fmt::Display + From<ErrorAggregate<VariantFailure<E>>>,
        F: FnMut(&C) -> Result<(), E>,
    {
        match self.plan(class, method) {
            NamespacePlan::Once => {
                debug!(class = %class, "running without namespace replication");
                op(ctx)
            }
            NamespacePlan::PerNamespace(namespaces) => {
                debug!(class = %class, namespaces = ?namespaces, "running per namespace");
                run_all(ctx, namespaces, op)
            }
        }
    }
}
