//! Hooks around each unit merge.
//!
//! Hooks run in registration order. `after` runs for every merge that
//! fired `before`, including merges whose unit could not be built or whose
//! content conflicted.

use std::fmt;

use super::artifact::AggregateArtifact;
use crate::model::ClassName;

/// The merge a hook is being told about.
#[derive(Clone, Copy, Debug)]
pub struct MergeEvent<'a> {
    /// The class whose unit is being merged.
    pub class: &'a ClassName,
    /// The aggregate as it currently stands.
    pub aggregate: &'a AggregateArtifact,
}

/// How a merge ended, as reported to `after` hooks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The unit was merged; `copied` entries were new to the aggregate.
    Merged {
        /// Entries copied into the aggregate.
        copied: usize,
    },
    /// The unit was merged but at least one path hit a fail-policy conflict.
    Conflicted,
    /// The unit could not be obtained.
    Failed,
}

impl fmt::Display for MergeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merged { copied } => write!(f, "merged ({copied} entries)"),
            Self::Conflicted => write!(f, "conflicted"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Observer of unit merges.
pub trait MergeLifecycle {
    /// Called before the unit for `event.class` is built.
    fn before(&mut self, _event: &MergeEvent<'_>) {}

    /// Called after the merge, whatever its outcome.
    fn after(&mut self, _event: &MergeEvent<'_>, _outcome: MergeOutcome) {}
}
