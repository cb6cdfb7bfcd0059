//! Shared fixtures for multisuite integration tests.
//!
//! Every test builds its own temp directory holding a class tree, unit
//! directories, a class manifest and (optionally) a config file.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

/// A scratch project: `classes/` (scan root), `units/`, `classes.toml`.
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        fs::create_dir_all(dir.path().join("classes")).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn root(&self) -> PathBuf {
        self.path().join("classes")
    }

    pub fn manifest(&self) -> PathBuf {
        self.path().join("classes.toml")
    }

    pub fn config(&self) -> PathBuf {
        self.path().join("multisuite.toml")
    }

    /// Drop a compiled-class placeholder for `class` under the scan root.
    pub fn class_file(&self, class: &str, bytes: &str) -> &Self {
        let rel = format!("{}.class", class.replace('.', "/"));
        self.write(&format!("classes/{rel}"), bytes)
    }

    /// Write a file below the fixture root.
    pub fn write(&self, rel: &str, contents: &str) -> &Self {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
        self
    }

    pub fn write_manifest(&self, toml: &str) -> &Self {
        self.write("classes.toml", toml)
    }

    pub fn write_config(&self, toml: &str) -> &Self {
        self.write("multisuite.toml", toml)
    }

    /// Run the `multisuite` binary inside the fixture.
    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_multisuite"))
            .args(args)
            .current_dir(self.path())
            .env("RUST_LOG", "warn")
            .env_remove("MULTISUITE_LOG_FORMAT")
            .output()
            .expect("failed to run multisuite")
    }
}

/// The suite used by most scenarios: units A, B and C under one base class.
///
/// - A contributes `x.txt = hello`
/// - B contributes `x.txt = hello`, `y.txt = world`
/// - C contributes `x.txt = goodbye`
pub fn abc_suite() -> Fixture {
    let fx = Fixture::new();
    fx.class_file("com.acme.SuiteBase", "base-bytes")
        .class_file("com.acme.ATest", "a-bytes")
        .class_file("com.acme.BTest", "b-bytes")
        .class_file("com.acme.CTest", "c-bytes")
        .write("units/a/x.txt", "hello")
        .write("units/b/x.txt", "hello")
        .write("units/b/y.txt", "world")
        .write("units/c/x.txt", "goodbye")
        .write_manifest(
            r#"
[[class]]
name = "com.acme.SuiteBase"
framework = true

[[class]]
name = "com.acme.ATest"
superclass = "com.acme.SuiteBase"
[class.unit]
dir = "units/a"

[[class]]
name = "com.acme.BTest"
superclass = "com.acme.SuiteBase"
[class.unit]
dir = "units/b"

[[class]]
name = "com.acme.CTest"
superclass = "com.acme.SuiteBase"
[class.unit]
dir = "units/c"
"#,
        );
    fx
}
