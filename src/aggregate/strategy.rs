//! Scan strategies: should this class's unit be merged at all?
//!
//! The class closure runs for every admitted class regardless of the
//! strategy. The strategy only gates the (comparatively expensive) unit
//! build and merge.

use std::cell::Cell;

use crate::config::StrategyKind;
use crate::model::ClassName;

/// Decides per admitted class whether its unit is merged.
pub trait ScanStrategy {
    /// Short strategy name for logs and reports.
    fn name(&self) -> &'static str;

    /// Returns `true` if `class`'s unit should be built and merged.
    fn should_merge(&self, class: &ClassName) -> bool;
}

/// Merge every admitted class.
#[derive(Clone, Copy, Debug, Default)]
pub struct MergeAll;

impl ScanStrategy for MergeAll {
    fn name(&self) -> &'static str {
        "always"
    }

    fn should_merge(&self, _class: &ClassName) -> bool {
        true
    }
}

/// Merge only the first admitted class.
///
/// For suites whose test classes all produce byte-identical units: one
/// copy is enough, and later classes only contribute their class closure.
#[derive(Debug)]
pub struct MergeOnce {
    pending: Cell<bool>,
}

impl MergeOnce {
    /// A fresh strategy that will admit exactly one merge.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Cell::new(true),
        }
    }
}

impl Default for MergeOnce {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanStrategy for MergeOnce {
    fn name(&self) -> &'static str {
        "once"
    }

    fn should_merge(&self, _class: &ClassName) -> bool {
        self.pending.replace(false)
    }
}

/// Instantiate the built-in strategy named by `kind`.
#[must_use]
pub fn strategy_for(kind: StrategyKind) -> Box<dyn ScanStrategy> {
    match kind {
        StrategyKind::Always => Box::new(MergeAll),
        StrategyKind::Once => Box::new(MergeOnce::new()),
    }
}
