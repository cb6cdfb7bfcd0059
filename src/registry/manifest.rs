//! TOML class manifest (`classes.toml`) → [`ClassRegistry`].
//!
//! The manifest is how the command-line tool learns about classes it cannot
//! introspect. Each `[[class]]` table becomes a [`ClassDescriptor`]; an
//! optional `[class.unit]` table becomes a [`DirectoryUnit`] factory.
//!
//! ```toml
//! [[package]]
//! name = "com.acme.memcache"
//! namespaces = ["", "tenant-a"]
//!
//! [[class]]
//! name = "com.acme.TestBase"
//! framework = true
//!
//! [[class]]
//! name = "com.acme.memcache.CacheTestBase"
//! superclass = "com.acme.TestBase"
//!
//! [class.unit]
//! dir = "units/memcache"
//! prefix = "/WEB-INF/classes"
//!
//! [class.unit.entries]
//! "/WEB-INF/appengine-web.xml" = "<appengine-web-app/>"
//!
//! [[class]]
//! name = "com.acme.memcache.MemcacheTest"
//! superclass = "com.acme.memcache.CacheTestBase"
//! tags = ["ignore-aggregation"]
//! ```
//!
//! Relative paths (`dir`, `bytecode`) resolve against the manifest's
//! directory. A class without `bytecode` picks up `<root>/<class path>`
//! when such a file exists below the scan root.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

use super::{ClassDescriptor, ClassRegistry, DuplicateClass};
use crate::model::{ArchivePath, ArtifactStore, Asset, ClassName, ValidationError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors loading a class manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The manifest (or a referenced file) could not be read.
    #[error("could not read {}: {source}", path.display())]
    Io {
        /// The file being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The manifest is not valid TOML or has unknown fields.
    #[error("{}: {message}", path.display())]
    Parse {
        /// The manifest path.
        path: PathBuf,
        /// Parser message, with line number when available.
        message: String,
    },

    /// A name or path inside the manifest is malformed.
    #[error("invalid manifest entry: {0}")]
    Invalid(#[from] ValidationError),

    /// The same class is declared twice.
    #[error(transparent)]
    Duplicate(#[from] DuplicateClass),
}

// ---------------------------------------------------------------------------
// Raw TOML shape
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(default, rename = "package")]
    packages: Vec<RawPackage>,
    #[serde(default, rename = "class")]
    classes: Vec<RawClass>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPackage {
    name: String,
    #[serde(default)]
    namespaces: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawClass {
    name: ClassName,
    #[serde(default)]
    superclass: Option<ClassName>,
    #[serde(default)]
    interfaces: Vec<ClassName>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    framework: bool,
    #[serde(default)]
    bytecode: Option<PathBuf>,
    #[serde(default)]
    namespaces: Vec<String>,
    #[serde(default)]
    method_namespaces: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    unit: Option<RawUnit>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawUnit {
    #[serde(default)]
    dir: Option<PathBuf>,
    #[serde(default)]
    prefix: Option<ArchivePath>,
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// DirectoryUnit
// ---------------------------------------------------------------------------

/// A unit factory backed by a directory and/or inline entries.
///
/// Every [`build`](crate::registry::UnitFactory::build) reads the directory
/// afresh, then applies the inline entries on top.
#[derive(Clone, Debug)]
pub struct DirectoryUnit {
    name: String,
    dir: Option<PathBuf>,
    prefix: Option<ArchivePath>,
    entries: Vec<(ArchivePath, Asset)>,
}

impl DirectoryUnit {
    /// A unit named `name` with no content.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dir: None,
            prefix: None,
            entries: Vec::new(),
        }
    }

    /// Load files from `dir`, optionally placed under `prefix`.
    #[must_use]
    pub fn with_dir(mut self, dir: PathBuf, prefix: Option<ArchivePath>) -> Self {
        self.dir = Some(dir);
        self.prefix = prefix;
        self
    }

    /// Add an inline entry.
    #[must_use]
    pub fn with_entry(mut self, path: ArchivePath, asset: Asset) -> Self {
        self.entries.push((path, asset));
        self
    }
}

impl super::UnitFactory for DirectoryUnit {
    fn build(&self) -> anyhow::Result<ArtifactStore> {
        let mut store = match &self.dir {
            Some(dir) => ArtifactStore::from_dir(&self.name, dir, self.prefix.as_ref())
                .with_context(|| format!("loading unit directory {}", dir.display()))?,
            None => ArtifactStore::new(&self.name),
        };
        for (path, asset) in &self.entries {
            store.add(path.clone(), asset.clone());
        }
        Ok(store)
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a manifest file into a registry.
///
/// `scan_root` is used to find bytecode for classes that do not name a
/// `bytecode` file.
///
/// # Errors
/// Returns [`ManifestError`] on I/O, parse, validation, or duplicate-class
/// failures.
pub fn load(path: &Path, scan_root: Option<&Path>) -> Result<ClassRegistry, ManifestError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_owned(),
        source,
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    parse(&contents, base, scan_root).map_err(|e| match e {
        ManifestError::Parse { message, .. } => ManifestError::Parse {
            path: path.to_owned(),
            message,
        },
        other => other,
    })
}

/// Parse manifest text. Relative paths resolve against `base`.
///
/// # Errors
/// Returns [`ManifestError`] on parse, validation, I/O, or duplicate-class
/// failures.
pub fn parse(
    toml_str: &str,
    base: &Path,
    scan_root: Option<&Path>,
) -> Result<ClassRegistry, ManifestError> {
    let raw: RawManifest = toml::from_str(toml_str).map_err(|e| {
        let mut message = e.message().to_owned();
        if let Some(span) = e.span() {
            let line = toml_str[..span.start]
                .chars()
                .filter(|&c| c == '\n')
                .count()
                + 1;
            message = format!("line {line}: {message}");
        }
        ManifestError::Parse {
            path: PathBuf::from("<manifest>"),
            message,
        }
    })?;

    let mut registry = ClassRegistry::new();
    for package in raw.packages {
        registry.set_package_namespaces(package.name, package.namespaces);
    }
    for class in raw.classes {
        registry.register(descriptor_from_raw(class, base, scan_root)?)?;
    }
    tracing::debug!(classes = registry.len(), "class manifest loaded");
    Ok(registry)
}

fn descriptor_from_raw(
    raw: RawClass,
    base: &Path,
    scan_root: Option<&Path>,
) -> Result<ClassDescriptor, ManifestError> {
    let mut desc = ClassDescriptor::new(raw.name.clone());
    if let Some(superclass) = raw.superclass {
        desc = desc.extends(superclass);
    }
    for interface in raw.interfaces {
        desc = desc.implements(interface);
    }
    for tag in raw.tags {
        desc = desc.tag(tag);
    }
    if raw.framework {
        desc = desc.framework();
    }

    let bytecode_file = match raw.bytecode {
        Some(p) => Some(base.join(p)),
        None => scan_root
            .map(|root| root.join(raw.name.class_file_path()))
            .filter(|p| p.is_file()),
    };
    if let Some(file) = bytecode_file {
        let bytes = std::fs::read(&file).map_err(|source| ManifestError::Io {
            path: file.clone(),
            source,
        })?;
        desc = desc.bytecode(Asset::new(bytes));
    }

    if !raw.namespaces.is_empty() {
        desc = desc.within_namespaces(raw.namespaces);
    }
    for (method, namespaces) in raw.method_namespaces {
        desc = desc.method_within_namespaces(method, namespaces);
    }

    if let Some(unit) = raw.unit {
        let mut factory = DirectoryUnit::new(format!("{}.war", raw.name.simple_name()));
        if let Some(dir) = unit.dir {
            factory = factory.with_dir(base.join(dir), unit.prefix);
        }
        for (path, content) in unit.entries {
            factory = factory.with_entry(ArchivePath::new(&path)?, Asset::from(content.as_str()));
        }
        desc = desc.factory(factory);
    }
    Ok(desc)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
