//! Multi-suite aggregation: many per-class deployment units, one artifact.
//!
//! The pipeline for each class discovered under the scan root:
//!
//! 1. **exclude**: drop classes matching an exclude glob or tagged
//!    [`IGNORE_AGGREGATION`].
//! 2. **closure**: register the class and its supertypes ([`closure`]),
//!    then merge their known class files through the [`ConflictPolicy`].
//! 3. **strategy**: ask the [`ScanStrategy`] whether to merge its unit.
//! 4. **merge**: build the unit ([`provider`]) and copy it in. Paths already
//!    present go through the [`ConflictPolicy`]. [`MergeLifecycle`] hooks
//!    bracket this step.
//!
//! # Determinism
//!
//! The scan visits files in sorted order, and merge results do not depend on
//! visit order: for inputs without differing content the final
//! path → content mapping is the same for every permutation, and the set of
//! conflicting paths is the same as well.

pub mod artifact;
pub mod closure;
pub mod lifecycle;
pub mod policy;
pub mod provider;
pub mod report;
pub mod strategy;

#[cfg(test)]
mod determinism_tests;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, info, instrument, warn};

pub use artifact::AggregateArtifact;
pub use closure::{ClassClosure, ClosureAdditions};
pub use lifecycle::{MergeEvent, MergeLifecycle, MergeOutcome};
pub use policy::{AllowedDuplicates, ConflictPolicy, ConflictRecord, Decision, FailPolicy, WarnPolicy};
pub use provider::{DeploymentUnit, ProviderError, UnitProvider};
pub use report::{AggregationReport, ConflictError, ExcludedClass, Exclusion, FailedClass, MergedClass};
pub use strategy::{MergeAll, MergeOnce, ScanStrategy};

use crate::config::{ConfigError, EXCLUDE_MATCH_OPTIONS, MultisuiteConfig};
use crate::error::{ErrorAggregate, Surfaced, surface};
use crate::model::{ArchivePath, ArtifactStore, ClassName, ValidationError};
use crate::registry::{ClassRegistry, IGNORE_AGGREGATION};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures aborting an aggregation run.
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    /// Walking the scan root failed.
    #[error("I/O error scanning {}: {source}", path.display())]
    Io {
        /// The directory or file being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A file matched the pattern but its path is not a class name.
    #[error("cannot derive class name from {}: {source}", path.display())]
    InvalidClassFile {
        /// Path relative to the scan root.
        path: PathBuf,
        /// Why the path was rejected.
        source: ValidationError,
    },

    /// A file matched the pattern but the registry does not know the class.
    #[error("class {0} matched the scan pattern but is not registered")]
    UnknownClass(ClassName),

    /// The class's unit could not be obtained.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// One fail-policy conflict.
    #[error(transparent)]
    Conflict(ConflictError),

    /// Several fail-policy conflicts, in discovery order.
    #[error(transparent)]
    Conflicts(ErrorAggregate<ConflictError>),
}

impl From<Surfaced<ConflictError>> for AggregateError {
    fn from(surfaced: Surfaced<ConflictError>) -> Self {
        match surfaced {
            Surfaced::Single(conflict) => Self::Conflict(conflict),
            Surfaced::Aggregate(all) => Self::Conflicts(all),
        }
    }
}

impl AggregateError {
    /// Returns `true` for failures scoped to one class, which a non-strict
    /// run records and skips.
    #[must_use]
    pub const fn is_per_class(&self) -> bool {
        matches!(
            self,
            Self::InvalidClassFile { .. } | Self::UnknownClass(_) | Self::Provider(_)
        )
    }

    /// Paths of the fail-policy conflicts carried by this error.
    #[must_use]
    pub fn conflict_paths(&self) -> Vec<&ArchivePath> {
        match self {
            Self::Conflict(c) => vec![&c.path],
            Self::Conflicts(all) => all.iter().map(|c| &c.path).collect(),
            _ => Vec::new(),
        }
    }

    fn subject(&self) -> String {
        match self {
            Self::Io { path, .. } | Self::InvalidClassFile { path, .. } => {
                path.display().to_string()
            }
            Self::UnknownClass(class) => class.to_string(),
            Self::Provider(e) => e.class().to_string(),
            Self::Conflict(c) => c.class.to_string(),
            Self::Conflicts(_) => String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Default class-file pattern.
pub const DEFAULT_PATTERN: &str = r".+Test\.class";

/// Default deployment name of the aggregate.
pub const DEFAULT_DEPLOYMENT_NAME: &str = "multisuite-tck.war";

/// A finished aggregation.
#[derive(Debug)]
pub struct Aggregation {
    /// The merged artifact.
    pub artifact: AggregateArtifact,
    /// What happened, class by class.
    pub report: AggregationReport,
}

/// Builds one aggregate from many units.
///
/// Strategies may carry state (see [`MergeOnce`]), so an aggregator is meant
/// for one run.
pub struct Aggregator<'r> {
    registry: &'r ClassRegistry,
    pattern: Regex,
    exclude: Vec<glob::Pattern>,
    policy: Box<dyn ConflictPolicy>,
    strategy: Box<dyn ScanStrategy>,
    hooks: Vec<Box<dyn MergeLifecycle + 'r>>,
    strict: bool,
    fail_fast: bool,
    deployment_name: String,
}

impl std::fmt::Debug for Aggregator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("pattern", &self.pattern.as_str())
            .field("exclude", &self.exclude)
            .field("policy", &self.policy.name())
            .field("strategy", &self.strategy.name())
            .field("hooks", &self.hooks.len())
            .field("strict", &self.strict)
            .field("fail_fast", &self.fail_fast)
            .field("deployment_name", &self.deployment_name)
            .finish_non_exhaustive()
    }
}

/// Mutable state of one run.
struct Run {
    artifact: AggregateArtifact,
    report: AggregationReport,
}

impl<'r> Aggregator<'r> {
    /// An aggregator with default settings: pattern `.+Test\.class`, merge
    /// every class, warn on conflicts, strict.
    ///
    /// # Errors
    /// Never fails in practice; the default pattern is a valid regex.
    pub fn new(registry: &'r ClassRegistry) -> Result<Self, ConfigError> {
        Self::from_config(registry, &MultisuiteConfig::default())
    }

    /// An aggregator configured from `config`.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if a pattern, glob, or path in `config` is
    /// invalid.
    pub fn from_config(
        registry: &'r ClassRegistry,
        config: &MultisuiteConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            registry,
            pattern: config.class_pattern()?,
            exclude: config.exclude_patterns()?,
            policy: policy::policy_for(config.filter, config.allowed_duplicates()?),
            strategy: strategy::strategy_for(config.strategy),
            hooks: Vec::new(),
            strict: config.strict,
            fail_fast: config.fail_fast,
            deployment_name: config.deployment.name.clone(),
        })
    }

    /// Replace the conflict policy.
    #[must_use]
    pub fn with_policy(mut self, policy: impl ConflictPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Replace the scan strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: impl ScanStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Append a lifecycle hook.
    #[must_use]
    pub fn with_hook(mut self, hook: impl MergeLifecycle + 'r) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Set strict mode (abort on per-class failures).
    #[must_use]
    pub const fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Abort on the first unit with a fail-policy conflict.
    #[must_use]
    pub const fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Returns `true` if `file_name` matches the class pattern.
    #[must_use]
    pub fn matches(&self, file_name: &str) -> bool {
        self.pattern.is_match(file_name)
    }

    /// Why `class` would be left out, if it would be.
    #[must_use]
    pub fn exclusion(&self, class: &ClassName) -> Option<Exclusion> {
        let file = class.class_file_path();
        if let Some(glob) = self
            .exclude
            .iter()
            .find(|g| g.matches_with(&file, EXCLUDE_MATCH_OPTIONS))
        {
            return Some(Exclusion::Pattern {
                pattern: glob.as_str().to_owned(),
            });
        }
        self.registry
            .get(class)
            .filter(|d| d.has_tag(IGNORE_AGGREGATION))
            .map(|_| Exclusion::Tagged)
    }

    /// Scan `root` and aggregate every matching class.
    ///
    /// # Errors
    /// Returns [`AggregateError::Io`] if the tree cannot be read, a per-class
    /// error in strict mode, or the fail-policy conflicts of the run.
    #[instrument(skip_all, fields(root = %root.display()))]
    pub fn aggregate(&mut self, root: &Path) -> Result<Aggregation, AggregateError> {
        let mut files = Vec::new();
        self.discover(root, root, &mut BTreeSet::new(), &mut files)?;
        info!(candidates = files.len(), "scanned class tree");

        let mut run = self.start();
        let mut classes = Vec::with_capacity(files.len());
        for relative in files {
            match ClassName::from_class_file(&relative) {
                Ok(class) => classes.push(class),
                Err(source) => {
                    self.class_failed(
                        &mut run,
                        AggregateError::InvalidClassFile {
                            path: relative,
                            source,
                        },
                    )?;
                }
            }
        }
        self.drive(run, classes)
    }

    /// Aggregate an explicit list of classes, in the order given.
    ///
    /// # Errors
    /// As [`aggregate`](Self::aggregate), minus scanning.
    #[instrument(skip_all)]
    pub fn aggregate_classes<I>(&mut self, classes: I) -> Result<Aggregation, AggregateError>
    where
        I: IntoIterator<Item = ClassName>,
    {
        let run = self.start();
        self.drive(run, classes)
    }

    fn start(&self) -> Run {
        Run {
            artifact: AggregateArtifact::new(self.deployment_name.clone()),
            report: AggregationReport {
                deployment: self.deployment_name.clone(),
                strategy: self.strategy.name().to_owned(),
                policy: self.policy.name().to_owned(),
                ..AggregationReport::default()
            },
        }
    }

    fn drive<I>(&mut self, mut run: Run, classes: I) -> Result<Aggregation, AggregateError>
    where
        I: IntoIterator<Item = ClassName>,
    {
        for class in classes {
            if let Err(err) = self.visit(&mut run, &class) {
                if err.is_per_class() {
                    self.class_failed(&mut run, err)?;
                } else {
                    return Err(err);
                }
            }
        }

        run.report.required_classes = run.artifact.required_count();
        run.report.entries = run.artifact.store().len();
        info!(
            deployment = %run.report.deployment,
            merged = run.report.merged.len(),
            skipped = run.report.skipped.len(),
            excluded = run.report.excluded.len(),
            failed = run.report.failed.len(),
            warnings = run.report.warnings.len(),
            conflicts = run.report.conflicts.len(),
            entries = run.report.entries,
            "aggregation finished"
        );

        surface(run.report.conflicts.clone())?;
        Ok(Aggregation {
            artifact: run.artifact,
            report: run.report,
        })
    }

    fn visit(&mut self, run: &mut Run, class: &ClassName) -> Result<(), AggregateError> {
        if let Some(exclusion) = self.exclusion(class) {
            info!(class = %class, reason = %exclusion, "excluding class from aggregate");
            run.report.excluded.push(ExcludedClass {
                class: class.clone(),
                exclusion,
            });
            return Ok(());
        }
        if self.registry.get(class).is_none() {
            return Err(AggregateError::UnknownClass(class.clone()));
        }

        let additions = ClassClosure::new(self.registry)
            .register(class, &mut run.artifact)
            .map_err(|source| AggregateError::InvalidClassFile {
                path: PathBuf::from(class.class_file_path()),
                source,
            })?;
        debug!(
            class = %class,
            added = additions.classes.len(),
            class_files = additions.class_files.len(),
            "registered class closure"
        );
        if !additions.class_files.is_empty() {
            let unit = DeploymentUnit {
                class: class.clone(),
                declared_by: class.clone(),
                store: additions.class_files,
            };
            let merged = merge_unit(self.policy.as_ref(), run.artifact.store_mut(), &unit);
            self.record(run, merged)?;
        }

        if !self.strategy.should_merge(class) {
            debug!(class = %class, strategy = self.strategy.name(), "not merging unit");
            run.report.skipped.push(class.clone());
            return Ok(());
        }
        self.merge(run, class)
    }

    fn merge(&mut self, run: &mut Run, class: &ClassName) -> Result<(), AggregateError> {
        let event = MergeEvent {
            class,
            aggregate: &run.artifact,
        };
        for hook in &mut self.hooks {
            hook.before(&event);
        }

        let result = UnitProvider::new(self.registry).unit_for(class);
        let (outcome, result) = match result {
            Ok(unit) => {
                let merged = merge_unit(self.policy.as_ref(), run.artifact.store_mut(), &unit);
                run.report.merged.push(MergedClass {
                    class: class.clone(),
                    declared_by: unit.declared_by.clone(),
                    copied: merged.copied,
                });
                let outcome = if merged.conflicts.is_empty() {
                    MergeOutcome::Merged {
                        copied: merged.copied,
                    }
                } else {
                    MergeOutcome::Conflicted
                };
                (outcome, self.record(run, merged))
            }
            Err(err) => (MergeOutcome::Failed, Err(AggregateError::from(err))),
        };

        let event = MergeEvent {
            class,
            aggregate: &run.artifact,
        };
        for hook in &mut self.hooks {
            hook.after(&event, outcome);
        }
        result
    }

    /// Add a merge's warnings and conflicts to the report. With `fail_fast`,
    /// conflicts end the run.
    fn record(&self, run: &mut Run, merged: UnitMerge) -> Result<(), AggregateError> {
        run.report.warnings.extend(merged.warnings);
        let result = if self.fail_fast && !merged.conflicts.is_empty() {
            surface(merged.conflicts.clone()).map_err(AggregateError::from)
        } else {
            Ok(())
        };
        run.report.conflicts.extend(merged.conflicts);
        result
    }

    fn class_failed(&self, run: &mut Run, err: AggregateError) -> Result<(), AggregateError> {
        if self.strict {
            return Err(err);
        }
        warn!(error = %err, "skipping class");
        run.report.failed.push(FailedClass {
            subject: err.subject(),
            error: err.to_string(),
        });
        Ok(())
    }

    /// Collect files under `dir` whose names match the pattern, as paths
    /// relative to `root`, in sorted order.
    ///
    /// Symlinks are followed. `seen` holds the canonical directories already
    /// walked, so a link back up the tree is entered only once.
    fn discover(
        &self,
        root: &Path,
        dir: &Path,
        seen: &mut BTreeSet<PathBuf>,
        out: &mut Vec<PathBuf>,
    ) -> Result<(), AggregateError> {
        let io_err = |path: &Path| {
            let path = path.to_owned();
            move |source| AggregateError::Io { path, source }
        };
        let canonical = fs::canonicalize(dir).map_err(io_err(dir))?;
        if !seen.insert(canonical) {
            debug!(dir = %dir.display(), "directory already scanned, not following link");
            return Ok(());
        }
        let mut entries = fs::read_dir(dir)
            .map_err(io_err(dir))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(io_err(dir))?;
        entries.sort_by_key(fs::DirEntry::file_name);

        for entry in entries {
            let path = entry.path();
            let metadata = match fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(path = %path.display(), "dangling symlink in class tree, skipping");
                    continue;
                }
                Err(e) => return Err(AggregateError::Io { path, source: e }),
            };
            if metadata.is_dir() {
                self.discover(root, &path, seen, out)?;
            } else if metadata.is_file() && self.matches(&entry.file_name().to_string_lossy()) {
                let relative = path.strip_prefix(root).map_err(|_| AggregateError::Io {
                    path: path.clone(),
                    source: std::io::Error::other("file escaped the scan root"),
                })?;
                out.push(relative.to_owned());
            } else if !metadata.is_file() {
                debug!(path = %path.display(), "not a regular file or directory, skipping");
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit merge
// ---------------------------------------------------------------------------

/// Result of merging one unit into the aggregate.
#[derive(Debug, Default)]
struct UnitMerge {
    copied: usize,
    warnings: Vec<ConflictError>,
    conflicts: Vec<ConflictError>,
}

/// Copy `unit` into `target`, consulting `policy` for paths already present.
fn merge_unit(policy: &dyn ConflictPolicy, target: &mut ArtifactStore, unit: &DeploymentUnit) -> UnitMerge {
    let mut warnings = Vec::new();
    let mut conflicts = Vec::new();
    let mut respell = Vec::new();

    let copied = target.merge_filtered(&unit.store, |candidate| {
        let Some((existing_path, existing)) = candidate.existing else {
            return true;
        };
        let record = ConflictRecord {
            path: candidate.path,
            existing,
            incoming: candidate.incoming,
        };
        let conflict = || ConflictError {
            path: existing_path.clone(),
            class: unit.class.clone(),
            existing_sha256: existing.digest(),
            incoming_sha256: candidate.incoming.digest(),
        };
        match policy.resolve(&record) {
            Decision::Skip => {
                if record.is_identical() && candidate.path != existing_path {
                    respell.push(candidate.path.clone());
                }
            }
            Decision::Warn => {
                let c = conflict();
                warn!(
                    path = %c.path,
                    class = %c.class,
                    existing_sha256 = %c.existing_sha256,
                    incoming_sha256 = %c.incoming_sha256,
                    "different resource already exists, keeping existing"
                );
                warnings.push(c);
            }
            Decision::Fail => conflicts.push(conflict()),
        }
        false
    });

    for path in &respell {
        target.prefer_spelling(path);
    }
    UnitMerge {
        copied,
        warnings,
        conflicts,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
