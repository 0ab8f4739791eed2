//! Engine configuration file (`blade.toml`).
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration rooted at `./templates`.
//!
//! ```toml
//! templates_dir = "templates"
//! template_extension = ".blade.tpl"
//! native_extensions = [".html", ".tera"]
//! watch = false
//!
//! [cache]
//! enabled = true
//! max_size_mb = 100
//! ttl_secs = 3600
//! sweep_interval_secs = 300
//! persist = true
//! fragment_dirs = ["layouts", "components"]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::constants::{
    DEFAULT_CACHE_TTL, DEFAULT_FRAGMENT_DIRS, DEFAULT_MAX_CACHE_SIZE_MB, DEFAULT_NATIVE_EXTENSIONS,
    DEFAULT_SWEEP_INTERVAL, DEFAULT_TEMPLATE_EXTENSION, SKIP_COMPILED_EXT_ENV,
};
use crate::core::BladeError;

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

fn default_template_extension() -> String {
    DEFAULT_TEMPLATE_EXTENSION.to_string()
}

fn default_native_extensions() -> Vec<String> {
    DEFAULT_NATIVE_EXTENSIONS.iter().map(|ext| (*ext).to_string()).collect()
}

fn default_fragment_dirs() -> Vec<String> {
    DEFAULT_FRAGMENT_DIRS.iter().map(|dir| (*dir).to_string()).collect()
}

const fn default_true() -> bool {
    true
}

const fn default_max_size_mb() -> u64 {
    DEFAULT_MAX_CACHE_SIZE_MB
}

const fn default_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL.as_secs()
}

const fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL.as_secs()
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Root directory that logical template names are relative to.
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,

    /// Extension of directive-syntax templates; `preload_all` only compiles these.
    #[serde(default = "default_template_extension")]
    pub template_extension: String,

    /// Extensions compiled in native mode (validated, never transpiled).
    #[serde(default = "default_native_extensions")]
    pub native_extensions: Vec<String>,

    /// Start a file watcher that invalidates cache entries on change.
    #[serde(default)]
    pub watch: bool,

    /// Compiled-artifact cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Settings for the compiled-artifact cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    /// Disable to compile on every render.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// In-memory budget in megabytes.
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,

    /// Maximum age of an entry before the sweeper drops it.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// How often the background sweeper runs.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Directory for mirrored artifacts; defaults to `<templates_dir>/../cache`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Mirror compiled artifacts to disk.
    #[serde(default = "default_true")]
    pub persist: bool,

    /// Top-level directories holding inline-only templates (never mirrored).
    #[serde(default = "default_fragment_dirs")]
    pub fragment_dirs: Vec<String>,

    /// Extensions never mirrored to disk; defaults to the native extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_extensions: Option<Vec<String>>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size_mb: default_max_size_mb(),
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            dir: None,
            persist: true,
            fragment_dirs: default_fragment_dirs(),
            skip_extensions: None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(default_templates_dir())
    }
}

impl EngineConfig {
    /// Configuration with defaults rooted at `templates_dir`.
    pub fn new(templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            templates_dir: templates_dir.into(),
            template_extension: default_template_extension(),
            native_extensions: default_native_extensions(),
            watch: false,
            cache: CacheConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// Relative `templates_dir` and `cache.dir` values are resolved against the
    /// directory containing the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or fails
    /// [`EngineConfig::validate`].
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read engine config from {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse engine config from {}", path.display()))?;

        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given and present, defaults otherwise.
    pub async fn load_with_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::load_from(path).await,
            _ => Ok(Self::default()),
        }
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        if self.templates_dir.is_relative() {
            self.templates_dir = base.join(&self.templates_dir);
        }
        if let Some(dir) = self.cache.dir.take() {
            self.cache.dir = Some(if dir.is_relative() { base.join(dir) } else { dir });
        }
    }

    /// Reject values the cache cannot operate with.
    pub fn validate(&self) -> Result<(), BladeError> {
        let fail = |message: &str| {
            Err(BladeError::Config {
                message: message.to_string(),
            })
        };
        if self.template_extension.is_empty() {
            return fail("template_extension must not be empty");
        }
        if self.cache.max_size_mb == 0 {
            return fail("cache.max_size_mb must be greater than zero");
        }
        if self.cache.ttl_secs == 0 {
            return fail("cache.ttl_secs must be greater than zero");
        }
        if self.cache.sweep_interval_secs == 0 {
            return fail("cache.sweep_interval_secs must be greater than zero");
        }
        Ok(())
    }

    /// Directory that receives mirrored artifacts and the manifest.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache.dir {
            return dir.clone();
        }
        match self.templates_dir.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join("cache"),
            _ => PathBuf::from("cache"),
        }
    }

    /// Extensions excluded from disk mirroring.
    ///
    /// `BLADE_SKIP_COMPILED_EXT` (comma-separated) takes precedence over the
    /// configured list, which in turn defaults to the native extensions.
    #[must_use]
    pub fn skip_extensions(&self) -> Vec<String> {
        if let Ok(raw) = std::env::var(SKIP_COMPILED_EXT_ENV) {
            return normalize_extensions(raw.split(','));
        }
        match &self.cache.skip_extensions {
            Some(list) => normalize_extensions(list.iter().map(String::as_str)),
            None => normalize_extensions(self.native_extensions.iter().map(String::as_str)),
        }
    }

    /// Budget in bytes.
    #[must_use]
    pub const fn max_size_bytes(&self) -> usize {
        (self.cache.max_size_mb as usize).saturating_mul(1024 * 1024)
    }

    /// Entry time-to-live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    /// Sweeper period.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache.sweep_interval_secs)
    }
}

/// Trim, drop empties and ensure each extension starts with a dot.
pub fn normalize_extensions<'a>(exts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    exts.into_iter()
        .map(str::trim)
        .filter(|ext| !ext.is_empty())
        .map(|ext| if ext.starts_with('.') { ext.to_string() } else { format!(".{ext}") })
        .collect()
}
