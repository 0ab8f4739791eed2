//! Template source resolution.
//!
//! Templates are addressed by *logical names*: slash-separated paths relative
//! to a root directory, e.g. `pages/home.blade.tpl`. A [`TemplateSource`]
//! maps a logical name to its text. Three implementations are provided:
//!
//! - [`FsSource`] reads from a directory on disk
//! - [`EmbeddedSource`] serves an in-memory snapshot bundled with the binary
//! - [`HybridSource`] tries the disk first and falls back to the snapshot
//!
//! Names that are absolute or climb above the root with `..` never resolve.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use strsim::levenshtein;
use walkdir::WalkDir;

use crate::core::Result;

/// Maximum Levenshtein distance, as a percentage of the name length, for a
/// listed template to be offered as a "did you mean" suggestion.
const SIMILARITY_THRESHOLD_PERCENT: usize = 50;

/// How a template's text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxMode {
    /// Blade-style directives, transpiled before Tera sees them.
    Directive,
    /// Already Tera syntax; only validated.
    Native,
}

impl SyntaxMode {
    /// Infer the mode from a file name: any configured native extension wins.
    #[must_use]
    pub fn detect(name: &str, native_extensions: &[String]) -> Self {
        if native_extensions.iter().any(|ext| name.ends_with(ext.as_str())) {
            Self::Native
        } else {
            Self::Directive
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Directive => "directive",
            Self::Native => "native",
        }
    }
}

impl fmt::Display for SyntaxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A template read from a source, immutable for the duration of a compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Normalized logical name
    pub name: String,
    /// Raw template text
    pub text: String,
    /// Last modification time, if the source tracks one
    pub modified: Option<SystemTime>,
}

/// Resolves logical template names to their text.
pub trait TemplateSource: Send + Sync + fmt::Debug {
    /// Read a template; `Ok(None)` when the name does not exist.
    fn read(&self, name: &str) -> Result<Option<SourceFile>>;

    /// Modification time of a template without reading it.
    fn modified(&self, name: &str) -> Option<SystemTime>;

    /// Every logical name this source can serve, sorted.
    fn list(&self) -> Result<Vec<String>>;

    /// Directory backing the source, used to map changed paths back to names.
    fn root(&self) -> Option<&Path> {
        None
    }
}

/// Normalize a logical name: backslashes become slashes, `./` and leading
/// slashes are dropped, and `..` may not climb above the root.
///
/// Returns `None` for names that can never resolve.
#[must_use]
pub fn logical_name(name: &str) -> Option<String> {
    let unified = name.replace('\\', "/");
    let trimmed = unified.trim_start_matches('/');

    let mut parts: Vec<&str> = Vec::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::ParentDir => {
                // Going negative would escape the templates root
                parts.pop()?;
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if parts.is_empty() { None } else { Some(parts.join("/")) }
}

/// Names from `candidates` similar enough to `name` to suggest, closest first.
#[must_use]
pub fn suggest_similar(name: &str, candidates: &[String]) -> Vec<String> {
    let max_distance = (name.len() * SIMILARITY_THRESHOLD_PERCENT / 100).max(1);
    let mut scored: Vec<(usize, &String)> = candidates
        .iter()
        .map(|candidate| (levenshtein(name, candidate), candidate))
        .filter(|(distance, _)| *distance <= max_distance)
        .collect();
    scored.sort();
    scored.into_iter().take(3).map(|(_, candidate)| candidate.clone()).collect()
}

/// Templates stored under a directory on disk.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> Option<(String, PathBuf)> {
        let logical = logical_name(name)?;
        let path = self.root.join(&logical);
        Some((logical, path))
    }
}

impl TemplateSource for FsSource {
    fn read(&self, name: &str) -> Result<Option<SourceFile>> {
        let Some((logical, path)) = self.path_for(name) else {
            return Ok(None);
        };
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)?;
        let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
        Ok(Some(SourceFile {
            name: logical,
            text,
            modified,
        }))
    }

    fn modified(&self, name: &str) -> Option<SystemTime> {
        let (_, path) = self.path_for(name)?;
        std::fs::metadata(path).and_then(|m| m.modified()).ok()
    }

    fn list(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = entry.map_err(|e| {
                std::io::Error::other(format!("Failed to walk {}: {e}", self.root.display()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry
                .path()
                .strip_prefix(&self.root)
                .ok()
                .and_then(Path::to_str)
                .and_then(logical_name);
            if let Some(name) = name {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn root(&self) -> Option<&Path> {
        Some(&self.root)
    }
}

/// Read-only in-memory snapshot of templates.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedSource {
    files: BTreeMap<String, String>,
}

impl EmbeddedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    #[must_use]
    pub fn with_file(mut self, name: &str, text: impl Into<String>) -> Self {
        self.insert(name, text);
        self
    }

    pub fn insert(&mut self, name: &str, text: impl Into<String>) {
        if let Some(logical) = logical_name(name) {
            self.files.insert(logical, text.into());
        }
    }

    /// Snapshot every file below `dir`, keyed by its path relative to `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let disk = FsSource::new(dir);
        let mut snapshot = Self::new();
        for name in disk.list()? {
            if let Some(file) = disk.read(&name)? {
                snapshot.files.insert(file.name, file.text);
            }
        }
        Ok(snapshot)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl TemplateSource for EmbeddedSource {
    fn read(&self, name: &str) -> Result<Option<SourceFile>> {
        let Some(logical) = logical_name(name) else {
            return Ok(None);
        };
        Ok(self.files.get(&logical).map(|text| SourceFile {
            name: logical.clone(),
            text: text.clone(),
            modified: None,
        }))
    }

    fn modified(&self, _name: &str) -> Option<SystemTime> {
        None
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.files.keys().cloned().collect())
    }
}

/// Disk first, embedded snapshot second.
#[derive(Debug, Clone)]
pub struct HybridSource {
    disk: FsSource,
    embedded: EmbeddedSource,
}

impl HybridSource {
    pub fn new(root: impl Into<PathBuf>, embedded: EmbeddedSource) -> Self {
        Self {
            disk: FsSource::new(root),
            embedded,
        }
    }
}

impl TemplateSource for HybridSource {
    fn read(&self, name: &str) -> Result<Option<SourceFile>> {
        match self.disk.read(name)? {
            Some(file) => Ok(Some(file)),
            None => self.embedded.read(name),
        }
    }

    fn modified(&self, name: &str) -> Option<SystemTime> {
        self.disk.modified(name)
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = self.disk.list()?;
        names.extend(self.embedded.list()?);
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn root(&self) -> Option<&Path> {
        self.disk.root()
    }
}
