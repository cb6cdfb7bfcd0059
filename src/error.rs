//! Failure aggregation shared by the aggregator and the variant executor.
//!
//! Both components can observe several independent failures in one run.
//! They surface them with the same rule:
//!
//! - zero failures → success, nothing is constructed;
//! - one failure → that failure, unchanged;
//! - two or more → one [`ErrorAggregate`] holding all of them in the order
//!   they happened.
//!
//! The one-failure case is unwrapped so that a caller running a
//! single variant (or merging a single conflicting unit) sees exactly the
//! error it would have seen without aggregation.

use std::fmt;

// ---------------------------------------------------------------------------
// ErrorAggregate
// ---------------------------------------------------------------------------

/// Two or more failures from one run, in occurrence order.
///
/// Never empty and never holds a single failure: use [`surface`] to build
/// one from a list of collected failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorAggregate<E> {
    failures: Vec<E>,
}

impl<E> ErrorAggregate<E> {
    /// The collected failures in occurrence order.
    #[must_use]
    pub fn failures(&self) -> &[E] {
        &self.failures
    }

    /// Number of failures (always at least two).
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Always `false`; present for API symmetry with collections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Iterate the failures in occurrence order.
    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.failures.iter()
    }

    /// Consume the aggregate, returning the failures.
    #[must_use]
    pub fn into_failures(self) -> Vec<E> {
        self.failures
    }
}

impl<E: fmt::Display> fmt::Display for ErrorAggregate<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failures:", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  - {failure}")?;
        }
        Ok(())
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for ErrorAggregate<E> {}

impl<'a, E> IntoIterator for &'a ErrorAggregate<E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.failures.iter()
    }
}

// ---------------------------------------------------------------------------
// Surfacing
// ---------------------------------------------------------------------------

/// A non-empty set of failures, shaped for the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Surfaced<E> {
    /// Exactly one failure, unchanged.
    Single(E),
    /// Two or more failures.
    Aggregate(ErrorAggregate<E>),
}

impl<E> Surfaced<E> {
    /// Total number of underlying failures.
    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Aggregate(agg) => agg.len(),
        }
    }
}

/// Apply the surfacing rule to a list of collected failures.
///
/// # Errors
/// Returns [`Surfaced::Single`] for one failure and
/// [`Surfaced::Aggregate`] for more than one.
pub fn surface<E>(mut failures: Vec<E>) -> Result<(), Surfaced<E>> {
    match failures.len() {
        0 => Ok(()),
        1 => Err(Surfaced::Single(failures.remove(0))),
        _ => Err(Surfaced::Aggregate(ErrorAggregate { failures })),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
