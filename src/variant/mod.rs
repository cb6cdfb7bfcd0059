//! Variant execution: run one operation once per variant of a shared
//! context.
//!
//! The executor owns the context for the duration of a run:
//!
//! - the context's original value is captured once, before the first
//!   variant;
//! - before each invocation the context is switched to that variant;
//! - the original value is put back once, after the last variant, on every
//!   exit path including a panicking operation.
//!
//! A failing variant does not stop the run. Failures are tagged with their
//! variant and surfaced with the rule in [`crate::error`]: one failure comes
//! back as the operation's own error, several as an [`ErrorAggregate`].

pub mod namespace;

use std::fmt;

use tracing::{debug, warn};

use crate::error::{ErrorAggregate, Surfaced, surface};

pub use namespace::{NamespacePlan, NamespaceRunner, NamespaceSlot, resolve_namespaces};

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// A process-wide setting an operation reads, switched per variant.
pub trait VariantContext {
    /// The value currently in effect, if any.
    fn current(&self) -> Option<String>;

    /// Put `value` into effect; `None` clears the setting.
    fn set(&mut self, value: Option<&str>);
}

/// Holds the context for a run and restores its original value on drop.
struct ContextGuard<'a, C: VariantContext> {
    ctx: &'a mut C,
    original: Option<String>,
}

impl<'a, C: VariantContext> ContextGuard<'a, C> {
    fn new(ctx: &'a mut C) -> Self {
        let original = ctx.current();
        Self { ctx, original }
    }
}

impl<C: VariantContext> Drop for ContextGuard<'_, C> {
    fn drop(&mut self) {
        self.ctx.set(self.original.as_deref());
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of running the operation under one variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariantOutcome<E> {
    /// The variant id.
    pub variant: String,
    /// The operation's error, if it failed.
    pub failure: Option<E>,
}

impl<E> VariantOutcome<E> {
    /// Returns `true` if the variant succeeded.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.failure.is_none()
    }
}

/// A failure tagged with the variant it happened under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariantFailure<E> {
    /// The variant id.
    pub variant: String,
    /// The operation's error.
    pub error: E,
}

impl<E: fmt::Display> fmt::Display for VariantFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.variant, self.error)
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for VariantFailure<E> {}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Run `op` once per variant and report every outcome, in variant order.
///
/// The context is switched before each call and restored afterwards, also
/// if `op` panics.
pub fn run_each<C, I, V, E, F>(ctx: &mut C, variants: I, mut op: F) -> Vec<VariantOutcome<E>>
where
    C: VariantContext,
    I: IntoIterator<Item = V>,
    V: AsRef<str>,
    E: fmt::Display,
    F: FnMut(&C) -> Result<(), E>,
{
    let mut guard = ContextGuard::new(ctx);
    let mut outcomes = Vec::new();
    for variant in variants {
        let variant = variant.as_ref();
        guard.ctx.set(Some(variant));
        debug!(variant, "running variant");
        let failure = op(&*guard.ctx).err();
        if let Some(err) = &failure {
            warn!(variant, error = %err, "variant failed");
        }
        outcomes.push(VariantOutcome {
            variant: variant.to_owned(),
            failure,
        });
    }
    outcomes
}

/// Run `op` once per variant and surface the failures.
///
/// # Errors
/// Returns the operation's own error if exactly one variant failed, and an
/// [`ErrorAggregate`] of [`VariantFailure`]s (converted into `E`) if more
/// than one did.
pub fn run_all<C, I, V, E, F>(ctx: &mut C, variants: I, op: F) -> Result<(), E>
where
    C: VariantContext,
    I: IntoIterator<Item = V>,
    V: AsRef<str>,
    E: fmt::Display + From<ErrorAggregate<VariantFailure<E>>>,
    F: FnMut(&C) -> Result<(), E>,
{
    let failures: Vec<VariantFailure<E>> = run_each(ctx, variants, op)
        .into_iter()
        .filter_map(|outcome| {
            outcome.failure.map(|error| VariantFailure {
                variant: outcome.variant,
                error,
            })
        })
        .collect();
    match surface(failures) {
        Ok(()) => Ok(()),
        Err(Surfaced::Single(failure)) => Err(failure.error),
        Err(Surfaced::Aggregate(all)) => Err(E::from(all)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
