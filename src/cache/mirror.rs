//! On-disk mirror of compiled artifacts.
//!
//! Each mirrored template is written as `<name with / replaced by _>.compiled`
//! in the cache directory, and `compiled_manifest.json` maps logical names
//! to those files:
//!
//! ```json
//! {
//!   "pages/home.blade.tpl": {
//!     "file": "pages_home.blade.tpl.compiled",
//!     "dependencies": ["layouts/app.blade.tpl"],
//!     "compiled_at": "2026-10-19T08:12:44Z"
//!   }
//! }
//! ```
//!
//! The mirror exists so a restarted engine can skip recompiling templates
//! whose sources have not changed. Every disk operation is best effort: a
//! failure is logged and the in-memory cache carries on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::constants::{COMPILED_FILE_SUFFIX, MANIFEST_FILE_NAME};
use crate::core::{BladeError, Result};
use crate::source::TemplateSource;
use crate::templating::CompiledTemplate;

/// Manifest record for one mirrored template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// File name inside the cache directory
    pub file: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub compiled_at: DateTime<Utc>,
}

/// Compiled text recovered from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirroredArtifact {
    pub text: String,
    pub dependencies: BTreeSet<String>,
}

/// Disk side of the compiled-artifact cache.
#[derive(Debug)]
pub struct DiskMirror {
    dir: PathBuf,
    enabled: bool,
    fragment_dirs: Vec<String>,
    skip_extensions: Vec<String>,
    manifest: BTreeMap<String, ManifestEntry>,
}

impl DiskMirror {
    /// Open the mirror in `dir`, loading an existing manifest.
    pub fn open(
        dir: impl Into<PathBuf>,
        fragment_dirs: Vec<String>,
        skip_extensions: Vec<String>,
    ) -> Self {
        let dir = dir.into();
        let manifest = load_manifest(&dir.join(MANIFEST_FILE_NAME));
        tracing::debug!(
            "Opened compiled mirror at {} ({} manifest entries)",
            dir.display(),
            manifest.len()
        );
        Self {
            dir,
            enabled: true,
            fragment_dirs,
            skip_extensions,
            manifest,
        }
    }

    /// A mirror that never touches disk.
    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            enabled: false,
            fragment_dirs: Vec::new(),
            skip_extensions: Vec::new(),
            manifest: BTreeMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE_NAME)
    }

    /// File name used for `name`'s compiled text.
    pub fn file_name(name: &str) -> String {
        format!("{}{COMPILED_FILE_SUFFIX}", name.replace(['/', '\\'], "_"))
    }

    pub fn entry(&self, name: &str) -> Option<&ManifestEntry> {
        self.manifest.get(name)
    }

    /// Names recorded in the manifest, sorted.
    pub fn names(&self) -> Vec<String> {
        self.manifest.keys().cloned().collect()
    }

    /// Whether `name` is written to disk at all: fragments (layouts,
    /// components) and skipped extensions never are.
    pub fn should_mirror(&self, name: &str) -> bool {
        if !self.enabled {
            return false;
        }
        let first_segment = name.split('/').next().unwrap_or_default();
        if name.contains('/') && self.fragment_dirs.iter().any(|dir| dir == first_segment) {
            return false;
        }
        !self.skip_extensions.iter().any(|ext| name.ends_with(ext.as_str()))
    }

    /// Write `template`'s text and manifest record.
    pub fn write(&mut self, template: &CompiledTemplate) {
        if !self.should_mirror(&template.name) {
            return;
        }
        let file = Self::file_name(&template.name);
        if let Err(err) = fs::create_dir_all(&self.dir)
            .and_then(|()| fs::write(self.dir.join(&file), &template.text))
        {
            tracing::warn!("Failed to mirror '{}' to {}: {}", template.name, self.dir.display(), err);
            return;
        }
        self.manifest.insert(
            template.name.clone(),
            ManifestEntry {
                file,
                dependencies: template.dependencies.iter().cloned().collect(),
                compiled_at: template.compiled_at,
            },
        );
        self.persist();
    }

    /// Remove `name`'s compiled file and manifest record.
    ///
    /// A missing file is not an error.
    pub fn remove_derived(&mut self, name: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let file = match self.manifest.remove(name) {
            Some(entry) => {
                self.persist();
                entry.file
            }
            None => Self::file_name(name),
        };
        let path = self.dir.join(file);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("Removed derived artifact {}", path.display());
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(BladeError::InvalidationIo {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Mirrored names whose recorded dependencies contain `name`.
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.manifest
            .iter()
            .filter(|(_, entry)| entry.dependencies.iter().any(|dep| dep == name))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Delete every regular file in the cache directory, manifest included.
    pub fn clear(&mut self) {
        self.manifest.clear();
        if !self.enabled {
            return;
        }
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
            Err(err) => {
                tracing::warn!("Failed to list cache directory {}: {}", self.dir.display(), err);
                return;
            }
        };
        for entry in entries.flatten() {
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Err(err) = fs::remove_file(entry.path()) {
                tracing::warn!("Failed to remove {}: {}", entry.path().display(), err);
            }
        }
    }

    /// Compiled text for `name` if its file is newer than the template and
    /// every recorded dependency.
    pub fn load_fresh(&self, name: &str, source: &dyn TemplateSource) -> Option<MirroredArtifact> {
        if !self.should_mirror(name) {
            return None;
        }
        let entry = self.manifest.get(name)?;
        let path = self.dir.join(&entry.file);
        let compiled_at = fs::metadata(&path).and_then(|m| m.modified()).ok()?;

        let is_older = |template: &str| -> bool {
            source
                .modified(template)
                .is_some_and(|modified: SystemTime| modified <= compiled_at)
        };
        if !is_older(name) || !entry.dependencies.iter().all(|dep| is_older(dep)) {
            tracing::debug!("Mirrored '{}' is stale", name);
            return None;
        }

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!("Failed to read mirrored {}: {}", path.display(), err);
                return None;
            }
        };
        Some(MirroredArtifact {
            text,
            dependencies: entry.dependencies.iter().cloned().collect(),
        })
    }

    fn persist(&self) {
        let path = self.manifest_path();
        let result = serde_json::to_vec_pretty(&self.manifest)
            .map_err(std::io::Error::other)
            .and_then(|data| {
                fs::create_dir_all(&self.dir)?;
                fs::write(&path, data)
            });
        if let Err(err) = result {
            tracing::warn!("Failed to write compiled manifest {}: {}", path.display(), err);
        }
    }
}

fn load_manifest(path: &Path) -> BTreeMap<String, ManifestEntry> {
    match fs::read(path) {
        Ok(data) => serde_json::from_slice(&data).unwrap_or_else(|err| {
            tracing::warn!("Ignoring unreadable compiled manifest {}: {}", path.display(), err);
            BTreeMap::new()
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
        Err(err) => {
            tracing::warn!("Failed to load compiled manifest from {}: {}", path.display(), err);
            BTreeMap::new()
        }
    }
}
