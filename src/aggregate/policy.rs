//! Conflict policy: what to do when two units claim the same path.
//!
//! Resolution order for a [`ConflictRecord`]:
//!
//! 1. Path in [`AllowedDuplicates`] → [`Decision::Skip`], whatever the
//!    content. The existing entry wins.
//! 2. Byte-identical content → [`Decision::Skip`]. Shared fixtures and base
//!    classes contributed by several units land here.
//! 3. Different content → the policy's verdict: [`WarnPolicy`] says
//!    [`Decision::Warn`], [`FailPolicy`] says [`Decision::Fail`].
//!
//! Policies are pure. Logging and error construction happen in the
//! aggregator, which knows which class contributed the incoming entry.

use std::collections::BTreeSet;
use std::fmt;

use crate::config::FilterKind;
use crate::model::{ArchivePath, Asset};

// ---------------------------------------------------------------------------
// AllowedDuplicates
// ---------------------------------------------------------------------------

/// Paths exempt from conflict checking, compared ignoring ASCII case.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllowedDuplicates {
    keys: BTreeSet<String>,
}

impl AllowedDuplicates {
    /// Generated files every unit carries with run-specific content.
    pub const BUILTIN: [&'static str; 2] = [
        "/WEB-INF/classes/test-contexts.properties",
        "/WEB-INF/classes/timestamp.txt",
    ];

    /// Build a set from explicit paths.
    pub fn new(paths: impl IntoIterator<Item = ArchivePath>) -> Self {
        Self {
            keys: paths.into_iter().map(|p| p.fold_key()).collect(),
        }
    }

    /// An empty set (every collision is checked).
    #[must_use]
    pub const fn none() -> Self {
        Self {
            keys: BTreeSet::new(),
        }
    }

    /// Returns `true` if `path` is exempt.
    #[must_use]
    pub fn contains(&self, path: &ArchivePath) -> bool {
        self.keys.contains(&path.fold_key())
    }

    /// Number of exempt paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if nothing is exempt.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Default for AllowedDuplicates {
    fn default() -> Self {
        Self {
            keys: Self::BUILTIN
                .iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// ConflictRecord / Decision
// ---------------------------------------------------------------------------

/// Two candidate contents for one path.
#[derive(Clone, Copy, Debug)]
pub struct ConflictRecord<'a> {
    /// The colliding path (as spelled by the incoming unit).
    pub path: &'a ArchivePath,
    /// Content already in the aggregate.
    pub existing: &'a Asset,
    /// Content offered by the unit being merged.
    pub incoming: &'a Asset,
}

impl ConflictRecord<'_> {
    /// Returns `true` if both sides carry identical bytes.
    #[must_use]
    pub fn is_identical(&self) -> bool {
        self.existing.bytes() == self.incoming.bytes()
    }
}

/// Verdict for one collision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Decision {
    /// Drop the incoming entry silently.
    Skip,
    /// Drop the incoming entry and log the mismatch.
    Warn,
    /// The collision makes the aggregate unusable.
    Fail,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::Warn => write!(f, "warn"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

// ---------------------------------------------------------------------------
// ConflictPolicy
// ---------------------------------------------------------------------------

/// Decides how a path collision is handled.
pub trait ConflictPolicy {
    /// Short policy name for logs and reports.
    fn name(&self) -> &'static str;

    /// Resolve one collision.
    fn resolve(&self, record: &ConflictRecord<'_>) -> Decision;
}

/// Steps 1 and 2 shared by both built-in policies.
fn exempt(allowed: &AllowedDuplicates, record: &ConflictRecord<'_>) -> bool {
    allowed.contains(record.path) || record.is_identical()
}

/// Keep the existing entry and warn on differing content.
#[derive(Clone, Debug, Default)]
pub struct WarnPolicy {
    allowed: AllowedDuplicates,
}

impl WarnPolicy {
    /// A warn policy with the given exemptions.
    #[must_use]
    pub const fn new(allowed: AllowedDuplicates) -> Self {
        Self { allowed }
    }
}

impl ConflictPolicy for WarnPolicy {
    fn name(&self) -> &'static str {
        "warn"
    }

    fn resolve(&self, record: &ConflictRecord<'_>) -> Decision {
        if exempt(&self.allowed, record) {
            Decision::Skip
        } else {
            Decision::Warn
        }
    }
}

/// Treat differing content as fatal.
#[derive(Clone, Debug, Default)]
pub struct FailPolicy {
    allowed: AllowedDuplicates,
}

impl FailPolicy {
    /// A fail policy with the given exemptions.
    #[must_use]
    pub const fn new(allowed: AllowedDuplicates) -> Self {
        Self { allowed }
    }
}

impl ConflictPolicy for FailPolicy {
    fn name(&self) -> &'static str {
        "fail"
    }

    fn resolve(&self, record: &ConflictRecord<'_>) -> Decision {
        if exempt(&self.allowed, record) {
            Decision::Skip
        } else {
            Decision::Fail
        }
    }
}

/// Instantiate the built-in policy named by `kind`.
#[must_use]
pub fn policy_for(kind: FilterKind, allowed: AllowedDuplicates) -> Box<dyn ConflictPolicy> {
    match kind {
        FilterKind::Warn => Box::new(WarnPolicy::new(allowed)),
        FilterKind::Fail => Box::new(FailPolicy::new(allowed)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
