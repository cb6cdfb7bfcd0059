//! Core identifier types for multisuite.
//!
//! Foundation types used throughout the aggregator: class names, archive
//! paths, and the validation error shared by both.

use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ClassName
// ---------------------------------------------------------------------------

/// A validated, fully-qualified class name (`com.acme.datastore.QueryTest`).
///
/// Segments are separated by `.`; each segment is non-empty, starts with an
/// ASCII letter, `_` or `$`, and continues with ASCII alphanumerics, `_` or
/// `$`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClassName(String);

impl ClassName {
    /// File suffix of a compiled class.
    pub const CLASS_SUFFIX: &'static str = ".class";

    /// Create a new `ClassName`, validating format.
    ///
    /// # Errors
    /// Returns an error if the name is empty or a segment is malformed.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Derive a class name from a class file path relative to a scan root.
    ///
    /// `com/acme/FooTest.class` becomes `com.acme.FooTest`.
    ///
    /// # Errors
    /// Returns an error if the path does not end in `.class`, escapes the
    /// root, or yields an invalid class name.
    pub fn from_class_file(relative: &Path) -> Result<Self, ValidationError> {
        let display = relative.display().to_string();
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    let Some(part) = part.to_str() else {
                        return Err(ValidationError {
                            kind: ErrorKind::ClassName,
                            value: display,
                            reason: "path is not valid UTF-8".to_owned(),
                        });
                    };
                    segments.push(part);
                }
                Component::CurDir => {}
                _ => {
                    return Err(ValidationError {
                        kind: ErrorKind::ClassName,
                        value: display,
                        reason: "class file path must be relative to the scan root".to_owned(),
                    });
                }
            }
        }

        let Some(last) = segments.pop() else {
            return Err(ValidationError {
                kind: ErrorKind::ClassName,
                value: display,
                reason: "class file path is empty".to_owned(),
            });
        };
        let Some(stem) = last.strip_suffix(Self::CLASS_SUFFIX) else {
            return Err(ValidationError {
                kind: ErrorKind::ClassName,
                value: display,
                reason: format!("file is not a compiled class (missing `{}`)", Self::CLASS_SUFFIX),
            });
        };
        segments.push(stem);
        Self::new(&segments.join("."))
    }

    /// Return the dotted name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The unqualified name (`FooTest` for `com.acme.FooTest`).
    #[must_use]
    pub fn simple_name(&self) -> &str {
        self.0.rsplit_once('.').map_or(self.0.as_str(), |(_, s)| s)
    }

    /// The package part, or `None` for a class in the default package.
    #[must_use]
    pub fn package(&self) -> Option<&str> {
        self.0.rsplit_once('.').map(|(p, _)| p)
    }

    /// Slash-separated class file path (`com/acme/FooTest.class`).
    #[must_use]
    pub fn class_file_path(&self) -> String {
        format!("{}{}", self.0.replace('.', "/"), Self::CLASS_SUFFIX)
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        if s.is_empty() {
            return Err(ValidationError {
                kind: ErrorKind::ClassName,
                value: s.to_owned(),
                reason: "class name must not be empty".to_owned(),
            });
        }
        for segment in s.split('.') {
            let mut chars = segment.chars();
            let Some(first) = chars.next() else {
                return Err(ValidationError {
                    kind: ErrorKind::ClassName,
                    value: s.to_owned(),
                    reason: "class name must not contain empty segments".to_owned(),
                });
            };
            if !(first.is_ascii_alphabetic() || first == '_' || first == '$') {
                return Err(ValidationError {
                    kind: ErrorKind::ClassName,
                    value: s.to_owned(),
                    reason: format!("segment `{segment}` must start with a letter, `_` or `$`"),
                });
            }
            if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
                return Err(ValidationError {
                    kind: ErrorKind::ClassName,
                    value: s.to_owned(),
                    reason: format!(
                        "segment `{segment}` must contain only letters, digits, `_` and `$`"
                    ),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ClassName {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ClassName {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<ClassName> for String {
    fn from(name: ClassName) -> Self {
        name.0
    }
}

// ---------------------------------------------------------------------------
// ArchivePath
// ---------------------------------------------------------------------------

/// A normalised absolute path inside an artifact (`/WEB-INF/classes/x.txt`).
///
/// Backslashes become `/`, repeated slashes collapse, and a leading `/` is
/// always present. `.` and `..` segments are rejected so a path can never
/// address anything outside the artifact root.
///
/// Equality is exact. Duplicate detection inside a store goes through
/// [`ArchivePath::fold_key`], which ignores ASCII case.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArchivePath(String);

impl ArchivePath {
    /// Create a normalised `ArchivePath`.
    ///
    /// # Errors
    /// Returns an error if the path has no segments or contains `.`/`..`.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let unified = s.replace('\\', "/");
        let mut normalised = String::with_capacity(unified.len() + 1);
        for segment in unified.split('/').filter(|seg| !seg.is_empty()) {
            if segment == "." || segment == ".." {
                return Err(ValidationError {
                    kind: ErrorKind::ArchivePath,
                    value: s.to_owned(),
                    reason: "archive path must not contain `.` or `..` segments".to_owned(),
                });
            }
            normalised.push('/');
            normalised.push_str(segment);
        }
        if normalised.is_empty() {
            return Err(ValidationError {
                kind: ErrorKind::ArchivePath,
                value: s.to_owned(),
                reason: "archive path must name at least one segment".to_owned(),
            });
        }
        Ok(Self(normalised))
    }

    /// Join a relative path below this one.
    ///
    /// # Errors
    /// Returns an error if `relative` contains `.`/`..` or is empty.
    pub fn join(&self, relative: &str) -> Result<Self, ValidationError> {
        Self::new(&format!("{}/{relative}", self.0))
    }

    /// The path as a string, always starting with `/`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path without its leading `/`, suitable for joining onto a
    /// filesystem directory.
    #[must_use]
    pub fn relative(&self) -> &str {
        &self.0[1..]
    }

    /// Case-folded key used for duplicate detection.
    #[must_use]
    pub fn fold_key(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    /// Returns `true` if both paths name the same entry, ignoring case.
    #[must_use]
    pub fn eq_ignore_case(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ArchivePath {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ArchivePath {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<ArchivePath> for String {
    fn from(path: ArchivePath) -> Self {
        path.0
    }
}

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// Which type rejected a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A [`ClassName`] validation error.
    ClassName,
    /// An [`ArchivePath`] validation error.
    ArchivePath,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClassName => write!(f, "ClassName"),
            Self::ArchivePath => write!(f, "ArchivePath"),
        }
    }
}

/// A validation error for multisuite identifier types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// What kind of value was being validated.
    pub kind: ErrorKind,
    /// The invalid value.
    pub value: String,
    /// Human-readable explanation.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}: {}", self.kind, self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    // -- ClassName --

    #[test]
    fn class_name_valid() {
        for name in ["FooTest", "com.acme.FooTest", "a.b_c.$Inner", "_x.Y1"] {
            assert!(ClassName::new(name).is_ok(), "expected valid: {name}");
        }
    }

    #[test]
    fn class_name_invalid() {
        for name in ["", ".Foo", "com..Foo", "com.1Foo", "com.Foo-Bar", "com/Foo"] {
            assert!(ClassName::new(name).is_err(), "expected invalid: {name}");
        }
    }

    #[test]
    fn class_name_parts() {
        let name = ClassName::new("com.acme.FooTest").unwrap();
        assert_eq!(name.simple_name(), "FooTest");
        assert_eq!(name.package(), Some("com.acme"));
        assert_eq!(name.class_file_path(), "com/acme/FooTest.class");

        let bare = ClassName::new("FooTest").unwrap();
        assert_eq!(bare.simple_name(), "FooTest");
        assert_eq!(bare.package(), None);
    }

    #[test]
    fn class_name_from_class_file() {
        let name = ClassName::from_class_file(&PathBuf::from("com/acme/FooTest.class")).unwrap();
        assert_eq!(name.as_str(), "com.acme.FooTest");
    }

    #[test]
    fn class_name_from_non_class_file_fails() {
        let err = ClassName::from_class_file(&PathBuf::from("com/acme/notes.txt")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ClassName);
        assert!(err.reason.contains(".class"));
    }

    #[test]
    fn class_name_from_escaping_path_fails() {
        assert!(ClassName::from_class_file(&PathBuf::from("../FooTest.class")).is_err());
        assert!(ClassName::from_class_file(&PathBuf::from("/abs/FooTest.class")).is_err());
    }

    #[test]
    fn class_name_serde_roundtrip_rejects_invalid() {
        let ok: ClassName = serde_json::from_str("\"com.acme.Foo\"").unwrap();
        assert_eq!(ok.as_str(), "com.acme.Foo");
        assert!(serde_json::from_str::<ClassName>("\"com..Foo\"").is_err());
    }

    // -- ArchivePath --

    #[test]
    fn archive_path_normalises() {
        assert_eq!(ArchivePath::new("x.txt").unwrap().as_str(), "/x.txt");
        assert_eq!(
            ArchivePath::new("//WEB-INF\\classes//a.properties").unwrap().as_str(),
            "/WEB-INF/classes/a.properties"
        );
        assert_eq!(ArchivePath::new("/dir/").unwrap().as_str(), "/dir");
    }

    #[test]
    fn archive_path_rejects_dots_and_empty() {
        assert!(ArchivePath::new("").is_err());
        assert!(ArchivePath::new("///").is_err());
        assert!(ArchivePath::new("a/../b").is_err());
        assert!(ArchivePath::new("./a").is_err());
    }

    #[test]
    fn archive_path_join_and_relative() {
        let base = ArchivePath::new("/WEB-INF/classes").unwrap();
        let joined = base.join("com/acme/Foo.class").unwrap();
        assert_eq!(joined.as_str(), "/WEB-INF/classes/com/acme/Foo.class");
        assert_eq!(joined.relative(), "WEB-INF/classes/com/acme/Foo.class");
    }

    #[test]
    fn archive_path_case_folding() {
        let a = ArchivePath::new("/WEB-INF/Timestamp.TXT").unwrap();
        let b = ArchivePath::new("/web-inf/timestamp.txt").unwrap();
        assert_ne!(a, b);
        assert!(a.eq_ignore_case(&b));
        assert_eq!(a.fold_key(), b.fold_key());
    }

    // -- ValidationError --

    #[test]
    fn validation_error_display() {
        let err = ValidationError {
            kind: ErrorKind::ArchivePath,
            value: "a/../b".to_owned(),
            reason: "no dots".to_owned(),
        };
        assert_eq!(err.to_string(), "invalid ArchivePath: \"a/../b\": no dots");
    }
}
