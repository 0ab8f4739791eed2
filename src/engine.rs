//! The render API.
//!
//! [`BladeEngine`] ties the pieces together: a [`TemplateSource`] to read
//! from, a [`Compiler`] to turn sources into artifacts and a
//! [`TemplateCache`] to keep them.
//!
//! # Examples
//!
//! ```rust,no_run
//! use blade_engine::config::EngineConfig;
//! use blade_engine::engine::BladeEngine;
//! use serde_json::json;
//!
//! # fn example() -> anyhow::Result<()> {
//! let engine = BladeEngine::new(EngineConfig::new("templates"))?;
//! let html = engine.render_to_string("pages/home", &json!({"title": "Home"}))?;
//! println!("{html}");
//! # Ok(())
//! # }
//! ```
//!
//! # Compilation on a miss
//!
//! A cache miss compiles the template once even when several threads ask
//! for it at the same time: each logical name has its own lock, and callers
//! that waited on it find the artifact in the cache afterwards. Before
//! compiling, the disk mirror is consulted so a restarted process reuses
//! artifacts whose sources have not changed.

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::cache::{CacheStats, SweeperHandle, TemplateCache, spawn_sweeper};
use crate::config::EngineConfig;
use crate::core::{BladeError, Result};
use crate::source::{FsSource, SyntaxMode, TemplateSource, logical_name};
use crate::templating::{CompiledTemplate, Compiler, FunctionRegistry, HostRuntime};

/// Outcome of a bulk compile.
#[derive(Debug, Default)]
pub struct PreloadReport {
    /// Templates that compiled
    pub compiled: Vec<String>,
    /// Templates that failed, with their error
    pub failures: Vec<(String, BladeError)>,
}

impl PreloadReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total(&self) -> usize {
        self.compiled.len() + self.failures.len()
    }
}

impl fmt::Display for PreloadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} templates compiled", self.compiled.len(), self.total())?;
        if self.failures.is_empty() {
            return Ok(());
        }
        write!(f, ", {} failed:", self.failures.len())?;
        for (name, error) in &self.failures {
            write!(f, "\n  {name}: {error}")?;
        }
        Ok(())
    }
}

/// How often each syntax mode was rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModeUsage {
    pub directive: u64,
    pub native: u64,
    pub last: Option<&'static str>,
}

impl ModeUsage {
    fn record(&mut self, mode: SyntaxMode) {
        match mode {
            SyntaxMode::Directive => self.directive += 1,
            SyntaxMode::Native => self.native += 1,
        }
        self.last = Some(mode.as_str());
    }
}

/// Builder for [`BladeEngine`] with a custom source or helper registry.
pub struct BladeEngineBuilder {
    config: EngineConfig,
    source: Option<Arc<dyn TemplateSource>>,
    registry: FunctionRegistry,
}

impl BladeEngineBuilder {
    /// Read templates from `source` instead of `config.templates_dir`.
    #[must_use]
    pub fn source(mut self, source: impl TemplateSource + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    #[must_use]
    pub fn registry(mut self, registry: FunctionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn build(self) -> Result<BladeEngine> {
        self.config.validate()?;
        let source = self
            .source
            .unwrap_or_else(|| Arc::new(FsSource::new(self.config.templates_dir.clone())));
        let runtime = HostRuntime::new(Arc::new(self.registry));
        let compiler = Compiler::new(source, runtime, &self.config);
        let cache = Arc::new(TemplateCache::from_config(&self.config));

        tracing::debug!(
            "Engine ready: templates at {}, cache {} ({} bytes, ttl {:?})",
            self.config.templates_dir.display(),
            if self.config.cache.enabled { "on" } else { "off" },
            cache.max_size(),
            cache.ttl()
        );

        Ok(BladeEngine {
            config: self.config,
            compiler,
            cache,
            compile_locks: DashMap::new(),
            mode_usage: Mutex::new(ModeUsage::default()),
        })
    }
}

/// Compiles, caches and renders templates.
pub struct BladeEngine {
    config: EngineConfig,
    compiler: Compiler,
    cache: Arc<TemplateCache>,
    /// One lock per logical name so a miss compiles once
    compile_locks: DashMap<String, Arc<Mutex<()>>>,
    mode_usage: Mutex<ModeUsage>,
}

impl fmt::Debug for BladeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BladeEngine")
            .field("templates_dir", &self.config.templates_dir)
            .field("cache", &self.cache.stats())
            .finish_non_exhaustive()
    }
}

impl BladeEngine {
    /// Engine over `config.templates_dir` with the default helpers.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: EngineConfig) -> BladeEngineBuilder {
        BladeEngineBuilder {
            config,
            source: None,
            registry: FunctionRegistry::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    pub fn cache(&self) -> &Arc<TemplateCache> {
        &self.cache
    }

    /// Names `name` may be cached under.
    fn candidates(&self, name: &str) -> Vec<String> {
        let Some(logical) = logical_name(name) else {
            return Vec::new();
        };
        let extension = self.compiler.template_extension();
        if logical.ends_with(extension) {
            vec![logical]
        } else {
            let extended = format!("{logical}{extension}");
            vec![logical, extended]
        }
    }

    fn cached(&self, candidates: &[String]) -> Option<Arc<CompiledTemplate>> {
        candidates.iter().find_map(|candidate| self.cache.get(candidate))
    }

    /// Compiled artifact for `name`, from cache, disk mirror or source.
    pub fn compile(&self, name: &str) -> Result<Arc<CompiledTemplate>> {
        if !self.config.cache.enabled {
            return self.compiler.compile(name).map(Arc::new);
        }

        let candidates = self.candidates(name);
        if let Some(hit) = self.cached(&candidates) {
            tracing::trace!("Cache hit for '{}'", name);
            return Ok(hit);
        }

        let key = candidates.first().cloned().unwrap_or_else(|| name.to_string());
        let lock = Arc::clone(self.compile_locks.entry(key.clone()).or_default().value());
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.compile_locked(name, &candidates)
        };
        // The map and this call hold the only references when nobody waits
        self.compile_locks.remove_if(&key, |_, held| Arc::strong_count(held) == 2);
        result
    }

    fn compile_locked(&self, name: &str, candidates: &[String]) -> Result<Arc<CompiledTemplate>> {
        // Another caller may have compiled it while we waited
        if let Some(hit) = self.cached(candidates) {
            tracing::trace!("Cache hit for '{}' after waiting", name);
            return Ok(hit);
        }

        tracing::debug!("Cache miss for '{}'", name);
        let compiled = match self.load_mirrored(candidates) {
            Some(compiled) => compiled,
            None => self.compiler.compile(name)?,
        };
        let compiled = Arc::new(compiled);
        if let Err(err) = self.cache.set(Arc::clone(&compiled)) {
            tracing::warn!("{}", err);
        }
        Ok(compiled)
    }

    /// Compile `name` from source, bypassing the cache entirely.
    pub fn compile_uncached(&self, name: &str) -> Result<CompiledTemplate> {
        self.compiler.compile(name)
    }

    fn load_mirrored(&self, candidates: &[String]) -> Option<CompiledTemplate> {
        let source = self.compiler.source();
        for candidate in candidates {
            let Some(artifact) = self.cache.load_fresh(candidate, source.as_ref()) else {
                continue;
            };
            let mode = self.compiler.mode_of(candidate);
            match self
                .compiler
                .finish(candidate.clone(), mode, artifact.text, artifact.dependencies)
            {
                Ok(compiled) => {
                    tracing::debug!("Reused mirrored artifact for '{}'", candidate);
                    return Some(compiled);
                }
                Err(err) => tracing::warn!("Ignoring mirrored artifact for '{}': {}", candidate, err),
            }
        }
        None
    }

    fn prepare(&self, name: &str, data: &impl Serialize) -> Result<(Arc<CompiledTemplate>, Value)> {
        let compiled = self.compile(name)?;
        let data = serde_json::to_value(data)?;
        self.mode_usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(compiled.mode);
        Ok((compiled, data))
    }

    /// Render `name` to bytes.
    pub fn render(&self, name: &str, data: &impl Serialize) -> Result<Vec<u8>> {
        let (compiled, data) = self.prepare(name, data)?;
        let mut out = Vec::new();
        compiled.render_to(&data, &mut out)?;
        Ok(out)
    }

    pub fn render_to_string(&self, name: &str, data: &impl Serialize) -> Result<String> {
        let (compiled, data) = self.prepare(name, data)?;
        compiled.render(&data)
    }

    /// Render `name` into `writer`.
    pub fn render_to(&self, name: &str, data: &impl Serialize, writer: impl Write) -> Result<()> {
        let (compiled, data) = self.prepare(name, data)?;
        compiled.render_to(&data, writer)
    }

    /// Every template name with the template extension, sorted.
    fn template_names(&self) -> Result<Vec<String>> {
        let extension = self.compiler.template_extension();
        Ok(self
            .compiler
            .source()
            .list()?
            .into_iter()
            .filter(|name| name.ends_with(extension))
            .collect())
    }

    /// Clear the cache and compile every template into it.
    pub fn preload_all(&self) -> Result<PreloadReport> {
        self.clear_cache();
        let names = self.template_names()?;
        tracing::debug!("Preloading {} templates", names.len());
        let report = self.compile_each(names.iter().map(String::as_str), |name| {
            self.compile(name).map(|_| ())
        });
        tracing::info!("Preload finished: {}", report);
        Ok(report)
    }

    /// Compile every template (native ones included) without caching.
    pub fn validate_all(&self) -> Result<PreloadReport> {
        let names = self.compiler.source().list()?;
        Ok(self.compile_each(names.iter().map(String::as_str), |name| {
            self.compiler.compile(name).map(|_| ())
        }))
    }

    /// Compile the given templates into the cache.
    pub fn warmup<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> PreloadReport {
        self.compile_each(names, |name| self.compile(name).map(|_| ()))
    }

    fn compile_each<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
        compile: impl Fn(&str) -> Result<()>,
    ) -> PreloadReport {
        let mut report = PreloadReport::default();
        for name in names {
            match compile(name) {
                Ok(()) => report.compiled.push(name.to_string()),
                Err(err) => {
                    tracing::debug!("Failed to compile '{}': {}", name, err);
                    report.failures.push((name.to_string(), err));
                }
            }
        }
        report
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cached_templates(&self) -> Vec<String> {
        self.cache.keys()
    }

    pub fn mode_usage(&self) -> ModeUsage {
        *self.mode_usage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Invalidate `name` and everything built from it.
    pub fn invalidate(&self, name: &str) -> Vec<String> {
        let mut removed = Vec::new();
        for candidate in self.candidates(name) {
            removed.extend(self.cache.invalidate(&candidate));
        }
        removed
    }

    /// React to a changed file: invalidate the template it maps to, or the
    /// whole cache when it lies outside the templates directory.
    pub fn on_changed(&self, path: &Path) -> Vec<String> {
        match self.logical_name_for(path) {
            Some(name) => {
                tracing::debug!("Template '{}' changed", name);
                self.cache.invalidate(&name)
            }
            None => {
                tracing::debug!("{} is outside the templates directory, clearing cache", path.display());
                let removed = self.cached_templates();
                self.clear_cache();
                removed
            }
        }
    }

    fn logical_name_for(&self, path: &Path) -> Option<String> {
        let root: PathBuf = self
            .compiler
            .source()
            .root()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.templates_dir.clone());

        let relative = path.strip_prefix(&root).ok().map(Path::to_path_buf).or_else(|| {
            let canonical_root = root.canonicalize().ok()?;
            let canonical_path = path
                .canonicalize()
                .ok()
                .or_else(|| Some(path.parent()?.canonicalize().ok()?.join(path.file_name()?)))?;
            canonical_path.strip_prefix(canonical_root).ok().map(Path::to_path_buf)
        })?;
        logical_name(relative.to_str()?)
    }

    /// Start the periodic expiry sweep. Requires a tokio runtime.
    pub fn start_sweeper(&self) -> SweeperHandle {
        spawn_sweeper(Arc::clone(&self.cache), self.config.sweep_interval())
    }
}
