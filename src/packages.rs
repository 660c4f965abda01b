//! Symbol/package table.
//!
//! Tracks which package owns which lines of which file, what each package
//! exports and uses, and which functions each file defines in it. The table
//! is rebuilt per file from the reader's top-level forms whenever the editor
//! reports a buffer change.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::syntax::Expr;

pub use crate::syntax::DEFAULT_PACKAGE;

// =============================================================================
// File Identity
// =============================================================================

/// Identity of a source file: a `file://` URI, or any opaque id the host uses.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FileId(String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Convert a file path to a percent-encoded `file://` URI.
    ///
    /// Relative paths are resolved against the current directory.
    pub fn from_path(path: &Path) -> Self {
        let abs_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| PathBuf::from(path))
        };

        match Url::from_file_path(&abs_path) {
            Ok(url) => Self(url.to_string()),
            Err(_) => Self(format!("file://{}", abs_path.to_string_lossy())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Packages
// =============================================================================

/// Inclusive line range. An open range runs to `usize::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn open_from(start: usize) -> Self {
        Self {
            start,
            end: usize::MAX,
        }
    }

    pub fn contains(&self, line: usize) -> bool {
        self.start <= line && line <= self.end
    }

    /// The part of this range strictly before `line`, if any.
    fn before(self, line: usize) -> Option<Self> {
        if self.start >= line {
            None
        } else {
            Some(Self {
                start: self.start,
                end: self.end.min(line - 1),
            })
        }
    }
}

/// What one `defpackage` form declared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
struct Declaration {
    exports: BTreeSet<String>,
    uses: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    /// Canonical upper-cased name.
    pub name: String,
    declared: HashMap<FileId, Declaration>,
    ranges: HashMap<FileId, LineRange>,
    defined: HashMap<FileId, BTreeSet<String>>,
}

impl Package {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            declared: HashMap::new(),
            ranges: HashMap::new(),
            defined: HashMap::new(),
        }
    }

    /// Exported names, across every file that declares this package.
    pub fn exports(&self) -> BTreeSet<&str> {
        self.declared
            .values()
            .flat_map(|d| d.exports.iter().map(String::as_str))
            .collect()
    }

    /// Used packages, across every file that declares this package.
    pub fn uses(&self) -> BTreeSet<&str> {
        self.declared
            .values()
            .flat_map(|d| d.uses.iter().map(String::as_str))
            .collect()
    }

    pub fn range(&self, file: &FileId) -> Option<LineRange> {
        self.ranges.get(file).copied()
    }

    /// Names defined in this package across all files.
    pub fn defined_names(&self) -> BTreeSet<&str> {
        self.defined
            .values()
            .flat_map(|names| names.iter().map(String::as_str))
            .collect()
    }

    fn forget_file(&mut self, file: &FileId) {
        self.declared.remove(file);
        self.ranges.remove(file);
        self.defined.remove(file);
    }
}

// =============================================================================
// Package Table
// =============================================================================

#[derive(Debug, Clone)]
pub struct PackageTable {
    default: Package,
    packages: BTreeMap<String, Package>,
}

impl Default for PackageTable {
    fn default() -> Self {
        Self {
            default: Package::new(DEFAULT_PACKAGE),
            packages: BTreeMap::new(),
        }
    }
}

impl PackageTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Package> {
        if name == DEFAULT_PACKAGE {
            Some(&self.default)
        } else {
            self.packages.get(name)
        }
    }

    /// Every known package, the default one first.
    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        std::iter::once(&self.default).chain(self.packages.values())
    }

    fn packages_mut(&mut self) -> impl Iterator<Item = &mut Package> {
        std::iter::once(&mut self.default).chain(self.packages.values_mut())
    }

    fn entry(&mut self, name: &str) -> &mut Package {
        if name == DEFAULT_PACKAGE {
            return &mut self.default;
        }
        self.packages
            .entry(name.to_string())
            .or_insert_with(|| Package::new(name))
    }

    /// Replay the top-level `forms` of `file`, replacing whatever the file
    /// contributed before.
    pub fn update(&mut self, forms: &[Expr], file: &FileId) {
        for package in self.packages_mut() {
            package.forget_file(file);
        }

        let mut current = DEFAULT_PACKAGE.to_string();
        for form in forms {
            match form {
                Expr::Package(def) => {
                    let declaration = Declaration {
                        exports: def.exports.iter().cloned().collect(),
                        uses: def.uses.iter().cloned().collect(),
                    };
                    self.entry(&def.name)
                        .declared
                        .insert(file.clone(), declaration);
                }
                Expr::InPackage(switch) => {
                    self.switch_at(file, switch.form.open.line, &switch.name);
                    current = switch.name.clone();
                }
                Expr::Function(def) => {
                    self.entry(&current)
                        .defined
                        .entry(file.clone())
                        .or_default()
                        .insert(def.name.clone());
                }
                _ => {}
            }
        }
    }

    /// Give `target` ownership of `file` from `line` onward. Any range that
    /// reaches `line` is cut back to `line - 1`, so ownership never overlaps.
    fn switch_at(&mut self, file: &FileId, line: usize, target: &str) {
        for package in self.packages_mut() {
            if let Some(range) = package.ranges.get(file).copied() {
                if range.end >= line {
                    match range.before(line) {
                        Some(truncated) => {
                            package.ranges.insert(file.clone(), truncated);
                        }
                        None => {
                            package.ranges.remove(file);
                        }
                    }
                }
            }
        }
        debug!(%file, line, package = target, "Package switch");
        self.entry(target)
            .ranges
            .insert(file.clone(), LineRange::open_from(line));
    }

    /// The package active at `line` of `file`.
    pub fn resolve(&self, file: &FileId, line: usize) -> &Package {
        self.packages()
            .find(|p| p.range(file).is_some_and(|r| r.contains(line)))
            .unwrap_or(&self.default)
    }

    /// Names visible at `line` of `file`: everything the active package
    /// defines or exports, plus every other package's exports, bare when the
    /// active package uses it and `PACKAGE:name` otherwise.
    pub fn list_visible_names(&self, file: &FileId, line: usize) -> Vec<String> {
        let active = self.resolve(file, line);

        let uses = active.uses();

        let mut names: BTreeSet<String> = active
            .defined_names()
            .into_iter()
            .chain(active.exports())
            .map(str::to_string)
            .collect();

        for package in self.packages() {
            if package.name == active.name {
                continue;
            }
            let bare = uses.contains(package.name.as_str());
            for export in package.exports() {
                if bare {
                    names.insert(export.to_string());
                } else {
                    names.insert(format!("{}:{}", package.name, export));
                }
            }
        }

        names.into_iter().collect()
    }
}
