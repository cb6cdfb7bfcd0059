//! Multisuite marker configuration (`multisuite.toml`).
//!
//! Read once at start-up. Selects the candidate class pattern, the scan
//! strategy, the conflict filter, and the name of the produced deployment.
//! A missing file means all defaults.
//!
//! ```toml
//! pattern = ".+Test\\.class"
//! strategy = "once"
//! filter = "fail"
//! strict = true
//! fail_fast = false
//! exclude = ["com/acme/isolated/**"]
//!
//! [deployment]
//! name = "datastore-tck.war"
//!
//! [namespace]
//! ignore_within_namespace = false
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::aggregate::policy::AllowedDuplicates;
use crate::aggregate::{DEFAULT_DEPLOYMENT_NAME, DEFAULT_PATTERN};
use crate::model::ArchivePath;

/// How exclude globs are matched: `*` and `?` stay within one directory,
/// `**` spans any number of them.
pub const EXCLUDE_MATCH_OPTIONS: glob::MatchOptions = glob::MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level marker configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MultisuiteConfig {
    /// Regex matched against file names (the whole name) to select
    /// candidate classes.
    #[serde(default = "default_pattern")]
    pub pattern: String,

    /// Which scan strategy decides whether a class's unit is merged.
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Which conflict policy handles differing content at one path.
    #[serde(default)]
    pub filter: FilterKind,

    /// Abort the run on the first per-class failure (missing factory,
    /// factory error, unknown class). When `false` the class is skipped
    /// and reported.
    #[serde(default = "default_strict")]
    pub strict: bool,

    /// Under the fail filter, abort as soon as one conflict is seen instead
    /// of collecting every conflict of the run.
    #[serde(default)]
    pub fail_fast: bool,

    /// Glob patterns over class file paths relative to the scan root.
    /// Matching classes are excluded from aggregation. `*` does not cross
    /// `/`; use `**` for whole subtrees.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Paths exempt from conflict checking. Replaces the built-in list when
    /// present.
    #[serde(default)]
    pub allowed_duplicates: Option<Vec<String>>,

    /// Settings for the produced deployment.
    #[serde(default)]
    pub deployment: DeploymentConfig,

    /// Namespace replication settings.
    #[serde(default)]
    pub namespace: NamespaceConfig,
}

impl Default for MultisuiteConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            strategy: StrategyKind::default(),
            filter: FilterKind::default(),
            strict: default_strict(),
            fail_fast: false,
            exclude: Vec::new(),
            allowed_duplicates: None,
            deployment: DeploymentConfig::default(),
            namespace: NamespaceConfig::default(),
        }
    }
}

fn default_pattern() -> String {
    DEFAULT_PATTERN.to_owned()
}

const fn default_strict() -> bool {
    true
}

// ---------------------------------------------------------------------------
// DeploymentConfig
// ---------------------------------------------------------------------------

/// Settings for the aggregate deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentConfig {
    /// Name given to the produced aggregate (default `multisuite-tck.war`).
    #[serde(default = "default_deployment_name")]
    pub name: String,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            name: default_deployment_name(),
        }
    }
}

fn default_deployment_name() -> String {
    DEFAULT_DEPLOYMENT_NAME.to_owned()
}

// ---------------------------------------------------------------------------
// NamespaceConfig
// ---------------------------------------------------------------------------

/// Namespace replication settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamespaceConfig {
    /// Ignore every namespace declaration and run each operation once.
    #[serde(default)]
    pub ignore_within_namespace: bool,
}

// ---------------------------------------------------------------------------
// StrategyKind / FilterKind
// ---------------------------------------------------------------------------

/// Built-in scan strategies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Merge every admitted class's unit.
    #[default]
    Always,
    /// Merge only the first admitted class's unit.
    Once,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "always"),
            Self::Once => write!(f, "once"),
        }
    }
}

/// Built-in conflict filters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKind {
    /// Log differing content, keep the existing entry, continue.
    #[default]
    Warn,
    /// Treat differing content as a fatal conflict.
    Fail,
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warn => write!(f, "warn"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

// ---------------------------------------------------------------------------
// Derived values
// ---------------------------------------------------------------------------

impl MultisuiteConfig {
    /// Compile the class pattern, anchored to match whole file names.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the regex is invalid.
    pub fn class_pattern(&self) -> Result<Regex, ConfigError> {
        Regex::new(&format!("^(?:{})$", self.pattern)).map_err(|e| ConfigError {
            path: None,
            message: format!("invalid pattern {:?}: {e}", self.pattern),
        })
    }

    /// Compile the exclude globs.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if any glob is invalid.
    pub fn exclude_patterns(&self) -> Result<Vec<glob::Pattern>, ConfigError> {
        self.exclude
            .iter()
            .map(|g| {
                glob::Pattern::new(g).map_err(|e| ConfigError {
                    path: None,
                    message: format!("invalid exclude glob {g:?}: {e}"),
                })
            })
            .collect()
    }

    /// The effective allowed-duplicates set.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if a listed path is not a valid archive path.
    pub fn allowed_duplicates(&self) -> Result<AllowedDuplicates, ConfigError> {
        let Some(paths) = &self.allowed_duplicates else {
            return Ok(AllowedDuplicates::default());
        };
        let parsed = paths
            .iter()
            .map(|p| {
                ArchivePath::new(p).map_err(|e| ConfigError {
                    path: None,
                    message: format!("invalid allowed_duplicates entry: {e}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AllowedDuplicates::new(parsed))
    }

    /// Check every derived value eagerly so errors surface at load time.
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.class_pattern()?;
        self.exclude_patterns()?;
        self.allowed_duplicates()?;
        if self.deployment.name.trim().is_empty() {
            return Err(ConfigError {
                path: None,
                message: "deployment.name must not be empty".to_owned(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading a multisuite configuration file.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl MultisuiteConfig {
    /// Load configuration from a TOML file.
    ///
    /// - If the file does not exist, returns all defaults (not an error).
    /// - If the file exists but is invalid, returns a [`ConfigError`] with
    ///   line-level detail.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found), parse
    /// errors, or invalid derived values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no marker config, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML, unknown fields, or invalid
    /// derived values.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })?;
        cfg.validate()?;
        Ok(cfg)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_all_fields() {
        let cfg = MultisuiteConfig::default();
        assert_eq!(cfg.pattern, r".+Test\.class");
        assert_eq!(cfg.strategy, StrategyKind::Always);
        assert_eq!(cfg.filter, FilterKind::Warn);
        assert!(cfg.strict);
        assert!(!cfg.fail_fast);
        assert!(cfg.exclude.is_empty());
        assert!(cfg.allowed_duplicates.is_none());
        assert_eq!(cfg.deployment.name, "multisuite-tck.war");
        assert!(!cfg.namespace.ignore_within_namespace);
    }

    #[test]
    fn parse_empty_string() {
        let cfg = MultisuiteConfig::parse("").unwrap();
        assert_eq!(cfg, MultisuiteConfig::default());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
pattern = ".+IT\\.class"
strategy = "once"
filter = "fail"
strict = false
fail_fast = true
exclude = ["com/acme/slow/**"]
allowed_duplicates = ["/WEB-INF/classes/build.properties"]

[deployment]
name = "datastore-tck.war"

[namespace]
ignore_within_namespace = true
"#;
        let cfg = MultisuiteConfig::parse(toml).unwrap();
        assert_eq!(cfg.pattern, r".+IT\.class");
        assert_eq!(cfg.strategy, StrategyKind::Once);
        assert_eq!(cfg.filter, FilterKind::Fail);
        assert!(!cfg.strict);
        assert!(cfg.fail_fast);
        assert_eq!(cfg.exclude, vec!["com/acme/slow/**"]);
        assert_eq!(cfg.deployment.name, "datastore-tck.war");
        assert!(cfg.namespace.ignore_within_namespace);

        let allowed = cfg.allowed_duplicates().unwrap();
        assert!(allowed.contains(&ArchivePath::new("/web-inf/classes/BUILD.properties").unwrap()));
        assert!(!allowed.contains(&ArchivePath::new("/WEB-INF/classes/timestamp.txt").unwrap()));
    }

    #[test]
    fn default_allowed_duplicates_are_builtin() {
        let allowed = MultisuiteConfig::default().allowed_duplicates().unwrap();
        assert!(allowed.contains(&ArchivePath::new("/WEB-INF/classes/timestamp.txt").unwrap()));
        assert!(allowed.contains(
            &ArchivePath::new("/WEB-INF/classes/test-contexts.properties").unwrap()
        ));
    }

    #[test]
    fn class_pattern_matches_whole_name() {
        let re = MultisuiteConfig::default().class_pattern().unwrap();
        assert!(re.is_match("QueryTest.class"));
        assert!(!re.is_match("QueryTest.class.bak"));
        assert!(!re.is_match("Test.class"));
        assert!(!re.is_match("QueryTestBase.class"));
    }

    #[test]
    fn exclude_star_stays_within_one_directory() {
        let cfg = MultisuiteConfig {
            exclude: vec!["com/acme/C*".to_owned(), "com/acme/slow/**".to_owned()],
            ..MultisuiteConfig::default()
        };
        let globs = cfg.exclude_patterns().unwrap();
        let excluded = |file: &str| globs.iter().any(|g| g.matches_with(file, EXCLUDE_MATCH_OPTIONS));

        assert!(excluded("com/acme/CTest.class"));
        assert!(!excluded("com/acme/Cx/deep/FooTest.class"));
        assert!(excluded("com/acme/slow/BigTest.class"));
        assert!(excluded("com/acme/slow/a/b/DeepTest.class"));
    }

    #[test]
    fn parse_rejects_unknown_field() {
        let err = MultisuiteConfig::parse("pattern = \"x\"\nbogus = 1\n").unwrap_err();
        assert!(err.message.contains("bogus"), "got: {}", err.message);
    }

    #[test]
    fn parse_rejects_invalid_regex() {
        let err = MultisuiteConfig::parse("pattern = \"(unclosed\"\n").unwrap_err();
        assert!(err.message.contains("invalid pattern"));
    }

    #[test]
    fn parse_rejects_unknown_strategy() {
        assert!(MultisuiteConfig::parse("strategy = \"sometimes\"\n").is_err());
    }

    #[test]
    fn parse_rejects_empty_deployment_name() {
        let err = MultisuiteConfig::parse("[deployment]\nname = \"  \"\n").unwrap_err();
        assert!(err.message.contains("deployment.name"));
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let cfg = MultisuiteConfig::load(Path::new("/nonexistent/multisuite.toml")).unwrap();
        assert_eq!(cfg, MultisuiteConfig::default());
    }

    #[test]
    fn load_invalid_file_shows_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multisuite.toml");
        std::fs::write(&path, "filter = \"explode\"\n").unwrap();
        let err = MultisuiteConfig::load(&path).unwrap_err();
        assert_eq!(err.path.as_deref(), Some(path.as_path()));
        assert!(err.to_string().starts_with(&path.display().to_string()));
    }

    #[test]
    fn kind_display() {
        assert_eq!(StrategyKind::Once.to_string(), "once");
        assert_eq!(FilterKind::Fail.to_string(), "fail");
    }
}
