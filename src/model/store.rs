//! In-memory artifact store: archive path → asset.
//!
//! An [`ArtifactStore`] stands in for a deployable archive. Paths are
//! [`ArchivePath`]s and duplicate detection ignores ASCII case, so a store
//! never holds both `/a.txt` and `/A.txt`. Iteration is ordered by the
//! case-folded path, which keeps every consumer deterministic.
//!
//! Stores can be loaded from and written to a plain directory tree so the
//! binary can exchange exploded archives with the build.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use super::types::{ArchivePath, ValidationError};

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// Immutable byte content stored at one archive path.
///
/// Cloning is cheap (reference counted), so a unit's assets can be copied
/// into the aggregate without duplicating the bytes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Asset {
    bytes: Arc<[u8]>,
}

impl Asset {
    /// Wrap owned bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Arc::from(bytes.into()),
        }
    }

    /// The raw content.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Content length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the asset holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowercase hex SHA-256 of the content.
    #[must_use]
    pub fn digest(&self) -> String {
        let hash = Sha256::digest(&self.bytes);
        let mut hex = String::with_capacity(64);
        for b in hash {
            use std::fmt::Write as _;
            let _ = write!(hex, "{b:02x}");
        }
        hex
    }
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digest = self.digest();
        write!(f, "Asset({} bytes, sha256:{})", self.len(), &digest[..12])
    }
}

impl From<&str> for Asset {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl From<&[u8]> for Asset {
    fn from(b: &[u8]) -> Self {
        Self::new(b)
    }
}

impl From<Vec<u8>> for Asset {
    fn from(b: Vec<u8>) -> Self {
        Self::new(b)
    }
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors moving a store to or from the filesystem.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing a file failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// The file or directory being accessed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A file name could not be turned into an archive path.
    #[error(transparent)]
    InvalidPath(#[from] ValidationError),

    /// Two files in a source directory differ only by case.
    #[error("duplicate entry {path} (paths differ only by case)")]
    CaseCollision {
        /// The second spelling encountered.
        path: ArchivePath,
    },
}

// ---------------------------------------------------------------------------
// ArtifactStore
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
struct Entry {
    path: ArchivePath,
    asset: Asset,
}

/// An incoming entry offered to a merge filter.
#[derive(Debug)]
pub struct MergeCandidate<'a> {
    /// Path of the incoming entry, as spelled by the incoming store.
    pub path: &'a ArchivePath,
    /// Incoming content.
    pub incoming: &'a Asset,
    /// The entry already present at that path (ignoring case), if any.
    pub existing: Option<(&'a ArchivePath, &'a Asset)>,
}

/// A named, mutable mapping from archive path to asset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArtifactStore {
    name: String,
    entries: BTreeMap<String, Entry>,
}

impl ArtifactStore {
    /// Create an empty store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Build a store from `(path, content)` pairs. Later pairs replace
    /// earlier ones that name the same path.
    ///
    /// # Errors
    /// Returns an error if any path fails [`ArchivePath`] validation.
    pub fn from_entries<I, P, C>(name: impl Into<String>, entries: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<Asset>,
    {
        let mut store = Self::new(name);
        for (path, content) in entries {
            store.add(ArchivePath::new(path.as_ref())?, content.into());
        }
        Ok(store)
    }

    /// Load every regular file below `dir` into a new store, placing each at
    /// `prefix` + its path relative to `dir`.
    ///
    /// # Errors
    /// Returns [`StoreError`] on I/O failure, invalid names, or two files
    /// whose archive paths differ only by case.
    pub fn from_dir(
        name: impl Into<String>,
        dir: &Path,
        prefix: Option<&ArchivePath>,
    ) -> Result<Self, StoreError> {
        let mut store = Self::new(name);
        let mut files = Vec::new();
        collect_files(dir, &mut files)?;
        for file in files {
            let rel = file
                .strip_prefix(dir)
                .map_err(|_| StoreError::Io {
                    path: file.clone(),
                    source: std::io::Error::other("file escaped the source directory"),
                })?
                .to_string_lossy()
                .into_owned();
            let path = match prefix {
                Some(p) => p.join(&rel)?,
                None => ArchivePath::new(&rel)?,
            };
            let bytes = fs::read(&file).map_err(|source| StoreError::Io {
                path: file.clone(),
                source,
            })?;
            if !store.add_if_absent(path.clone(), Asset::new(bytes)) {
                return Err(StoreError::CaseCollision { path });
            }
        }
        Ok(store)
    }

    /// The store's name (e.g. the deployment file name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace the entry at `path`. Returns the replaced asset.
    pub fn add(&mut self, path: ArchivePath, asset: Asset) -> Option<Asset> {
        self.entries
            .insert(path.fold_key(), Entry { path, asset })
            .map(|old| old.asset)
    }

    /// Insert only if no entry exists at `path` (ignoring case). Returns
    /// `true` if the entry was inserted.
    pub fn add_if_absent(&mut self, path: ArchivePath, asset: Asset) -> bool {
        let key = path.fold_key();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, Entry { path, asset });
        true
    }

    /// Remove the entry at `path` (ignoring case).
    pub fn remove(&mut self, path: &ArchivePath) -> Option<Asset> {
        self.entries.remove(&path.fold_key()).map(|e| e.asset)
    }

    /// Look up the asset at `path` (ignoring case).
    #[must_use]
    pub fn get(&self, path: &ArchivePath) -> Option<&Asset> {
        self.entries.get(&path.fold_key()).map(|e| &e.asset)
    }

    /// Look up the stored spelling and asset at `path` (ignoring case).
    #[must_use]
    pub fn get_entry(&self, path: &ArchivePath) -> Option<(&ArchivePath, &Asset)> {
        self.entries
            .get(&path.fold_key())
            .map(|e| (&e.path, &e.asset))
    }

    /// Returns `true` if an entry exists at `path` (ignoring case).
    #[must_use]
    pub fn contains(&self, path: &ArchivePath) -> bool {
        self.entries.contains_key(&path.fold_key())
    }

    /// Iterate entries in case-folded path order.
    pub fn iter(&self) -> impl Iterator<Item = (&ArchivePath, &Asset)> {
        self.entries.values().map(|e| (&e.path, &e.asset))
    }

    /// All stored paths in case-folded order.
    #[must_use]
    pub fn paths(&self) -> Vec<&ArchivePath> {
        self.entries.values().map(|e| &e.path).collect()
    }

    /// Keep the lexicographically smallest spelling of a path.
    ///
    /// If an entry exists under a different spelling of `path` that sorts
    /// after it, the entry is re-keyed to `path`. Content is untouched.
    /// Returns `true` if the spelling changed.
    pub fn prefer_spelling(&mut self, path: &ArchivePath) -> bool {
        match self.entries.get_mut(&path.fold_key()) {
            Some(entry) if entry.path != *path && *path < entry.path => {
                entry.path = path.clone();
                true
            }
            _ => false,
        }
    }

    /// Merge entries from `other` into this store.
    ///
    /// `include` sees every incoming entry together with the existing entry
    /// at the same path (if any) and decides whether the incoming entry is
    /// copied. Copied entries replace existing ones. Entries are offered in
    /// case-folded path order. Returns the number of entries copied.
    pub fn merge_filtered<F>(&mut self, other: &Self, mut include: F) -> usize
    where
        F: FnMut(&MergeCandidate<'_>) -> bool,
    {
        let mut copied = 0;
        for (key, entry) in &other.entries {
            let admit = {
                let candidate = MergeCandidate {
                    path: &entry.path,
                    incoming: &entry.asset,
                    existing: self.entries.get(key).map(|e| (&e.path, &e.asset)),
                };
                include(&candidate)
            };
            if admit {
                self.entries.insert(key.clone(), entry.clone());
                copied += 1;
            }
        }
        copied
    }

    /// Write every entry below `dir` as a plain file tree.
    ///
    /// Each file is written to a temporary sibling first and renamed into
    /// place. Returns the number of files written.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] on any filesystem failure.
    pub fn write_exploded(&self, dir: &Path) -> Result<usize, StoreError> {
        for entry in self.entries.values() {
            let target = dir.join(entry.path.relative());
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                    path: parent.to_owned(),
                    source,
                })?;
            }
            let file_name = target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let tmp = target.with_file_name(format!(".{file_name}.tmp"));
            let mut file = fs::File::create(&tmp).map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
            file.write_all(entry.asset.bytes())
                .and_then(|()| file.sync_all())
                .map_err(|source| StoreError::Io {
                    path: tmp.clone(),
                    source,
                })?;
            drop(file);
            fs::rename(&tmp, &target).map_err(|source| StoreError::Io {
                path: target.clone(),
                source,
            })?;
        }
        Ok(self.entries.len())
    }
}

/// Recursively collect regular files below `dir`, sorted by path.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), StoreError> {
    let read = fs::read_dir(dir).map_err(|source| StoreError::Io {
        path: dir.to_owned(),
        source,
    })?;
    let mut children = Vec::new();
    for entry in read {
        let entry = entry.map_err(|source| StoreError::Io {
            path: dir.to_owned(),
            source,
        })?;
        children.push(entry.path());
    }
    children.sort();
    for child in children {
        if child.is_dir() {
            collect_files(&child, out)?;
        } else if child.is_file() {
            out.push(child);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
