//! What an aggregation run did, class by class.

use std::fmt;

use serde::Serialize;

use crate::model::{ArchivePath, ClassName};

/// A path two units disagree about.
///
/// Raised as an error under the fail policy and recorded as a warning under
/// the warn policy. The existing content stays in the aggregate either way.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("different resource already exists at {path} (existing sha256 {existing_sha256}, incoming sha256 {incoming_sha256} from {class})")]
pub struct ConflictError {
    /// The contested path.
    pub path: ArchivePath,
    /// The class whose unit offered the incoming content.
    pub class: ClassName,
    /// Digest of the content kept.
    pub existing_sha256: String,
    /// Digest of the content dropped.
    pub incoming_sha256: String,
}

/// Why a discovered class was left out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum Exclusion {
    /// The class carries the ignore-aggregation tag.
    Tagged,
    /// The class file matched a configured exclude glob.
    Pattern {
        /// The matching glob.
        pattern: String,
    },
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tagged => write!(f, "tagged {}", crate::registry::IGNORE_AGGREGATION),
            Self::Pattern { pattern } => write!(f, "matches exclude pattern {pattern}"),
        }
    }
}

/// A class whose unit was merged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MergedClass {
    /// The discovered class.
    pub class: ClassName,
    /// The class whose factory built the unit.
    pub declared_by: ClassName,
    /// Entries the unit added to the aggregate.
    pub copied: usize,
}

/// A class left out of the aggregate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExcludedClass {
    /// The discovered class.
    pub class: ClassName,
    /// Why.
    #[serde(flatten)]
    pub exclusion: Exclusion,
}

/// A class that could not be processed (non-strict runs only).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailedClass {
    /// Class name, or the offending file path when no name could be derived.
    pub subject: String,
    /// Rendered error.
    pub error: String,
}

/// Summary of one aggregation run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AggregationReport {
    /// Deployment name of the aggregate.
    pub deployment: String,
    /// Scan strategy in effect.
    pub strategy: String,
    /// Conflict policy in effect.
    pub policy: String,
    /// Classes whose units were merged, in visit order.
    pub merged: Vec<MergedClass>,
    /// Classes registered by the closure only (strategy said no).
    pub skipped: Vec<ClassName>,
    /// Classes left out entirely.
    pub excluded: Vec<ExcludedClass>,
    /// Classes that failed in a non-strict run.
    pub failed: Vec<FailedClass>,
    /// Differing content kept under the warn policy.
    pub warnings: Vec<ConflictError>,
    /// Differing content under the fail policy.
    pub conflicts: Vec<ConflictError>,
    /// Number of required classes in the aggregate.
    pub required_classes: usize,
    /// Number of entries in the aggregate.
    pub entries: usize,
}

impl AggregationReport {
    /// Number of classes the scan admitted or rejected.
    #[must_use]
    pub fn discovered(&self) -> usize {
        self.merged.len() + self.skipped.len() + self.excluded.len() + self.failed.len()
    }
}

impl fmt::Display for AggregationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} entries, {} required classes",
            self.deployment, self.entries, self.required_classes
        )?;
        writeln!(
            f,
            "  merged {}, skipped {}, excluded {}, failed {} (strategy {}, policy {})",
            self.merged.len(),
            self.skipped.len(),
            self.excluded.len(),
            self.failed.len(),
            self.strategy,
            self.policy
        )?;
        for excluded in &self.excluded {
            writeln!(f, "  excluded {}: {}", excluded.class, excluded.exclusion)?;
        }
        for failed in &self.failed {
            writeln!(f, "  failed {}: {}", failed.subject, failed.error)?;
        }
        for warning in &self.warnings {
            writeln!(f, "  warning: {warning}")?;
        }
        for conflict in &self.conflicts {
            writeln!(f, "  conflict: {conflict}")?;
        }
        Ok(())
    }
}
