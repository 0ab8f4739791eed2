//! Test utilities for blade-engine
//!
//! Helpers shared by unit tests and the integration suite:
//! - [`init_test_logging`] wires `tracing` into the test harness once
//! - [`TemplateEnvironment`] lays out a throwaway templates directory with
//!   its own cache directory and builds engines over it
//! - [`SiteFixture`] is a small layout/partial/page set used across tests
//!
//! # Example
//!
//! ```rust,no_run
//! use blade_engine::test_utils::{SiteFixture, TemplateEnvironment};
//!
//! let env = TemplateEnvironment::new().unwrap();
//! SiteFixture::basic().write_to(&env).unwrap();
//! let engine = env.engine().unwrap();
//! let html = engine
//!     .render_to_string("pages/home", &serde_json::json!({ "user": "ada" }))
//!     .unwrap();
//! assert!(html.contains("ada"));
//! ```

mod fixtures;

pub use fixtures::SiteFixture;

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;
use crate::engine::BladeEngine;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, `RUST_LOG` otherwise, and stays silent when
/// neither is set. Safe to call from every test.
///
/// ```bash
/// RUST_LOG=blade_engine=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}

/// A temporary `templates/` + `cache/` pair.
pub struct TemplateEnvironment {
    pub temp_dir: TempDir,
    pub templates_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl TemplateEnvironment {
    pub fn new() -> Result<Self> {
        init_test_logging(None);

        let temp_dir = TempDir::new()?;
        let templates_dir = temp_dir.path().join("templates");
        let cache_dir = temp_dir.path().join("cache");
        fs::create_dir_all(&templates_dir)?;

        Ok(Self {
            temp_dir,
            templates_dir,
            cache_dir,
        })
    }

    /// Write a template under its logical name, creating parent directories.
    pub fn write(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.templates_dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        fs::remove_file(self.templates_dir.join(name))?;
        Ok(())
    }

    /// Move a template's modification time into the future so it is
    /// unambiguously newer than anything compiled before.
    pub fn touch_later(&self, name: &str, by: Duration) -> Result<()> {
        let file = fs::File::options().write(true).open(self.templates_dir.join(name))?;
        file.set_modified(SystemTime::now() + by)?;
        Ok(())
    }

    /// Engine configuration rooted at this environment.
    pub fn config(&self) -> EngineConfig {
        let mut config = EngineConfig::new(&self.templates_dir);
        config.cache.dir = Some(self.cache_dir.clone());
        config
    }

    pub fn engine(&self) -> Result<BladeEngine> {
        self.engine_with(self.config())
    }

    pub fn engine_with(&self, config: EngineConfig) -> Result<BladeEngine> {
        Ok(BladeEngine::new(config)?)
    }

    /// Names of the regular files currently in the cache directory, sorted.
    pub fn cache_files(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.cache_dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();
        names
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}
