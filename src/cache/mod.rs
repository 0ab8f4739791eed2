//! Compiled-artifact cache.
//!
//! Compiling a directive template means parsing it, loading its layout
//! chain and includes, and validating the result with Tera. The cache keeps
//! the finished [`CompiledTemplate`]s in memory so repeated renders skip all
//! of that.
//!
//! # Bounds
//!
//! - **Size**: every entry is charged the length of its compiled text. When
//!   an insert would exceed the budget, entries past their TTL and entries
//!   unused for twice the TTL are evicted; if that is not enough the insert
//!   is rejected with [`BladeError::CacheFull`]. Rendering never depends on
//!   the insert succeeding.
//! - **Age**: entries older than the TTL are treated as misses and removed
//!   by the periodic [`sweeper`].
//!
//! # Disk mirror
//!
//! Successful inserts are mirrored to the cache directory by
//! [`mirror::DiskMirror`] so a restarted process can reuse them. The map,
//! the running size total and the mirror sit behind one mutex and are always
//! updated together.
//!
//! # Invalidation
//!
//! [`TemplateCache::invalidate`] removes a template and every cached
//! template built from it, so editing a layout or partial stales the pages
//! that use it.

pub mod mirror;
pub mod sweeper;

use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::constants::STALE_TTL_MULTIPLIER;
use crate::core::{BladeError, Result};
use crate::source::TemplateSource;
use crate::templating::CompiledTemplate;

pub use mirror::{DiskMirror, ManifestEntry, MirroredArtifact};
pub use sweeper::{SweeperHandle, spawn_sweeper};

/// One cached artifact.
#[derive(Debug, Clone)]
struct CacheEntry {
    template: Arc<CompiledTemplate>,
    size: usize,
    created_at: Instant,
    last_used: Instant,
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub count: usize,
    pub current_size_bytes: usize,
    pub max_size_bytes: usize,
    pub utilization_percent: f64,
}

#[derive(Debug)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    current_size: usize,
    mirror: DiskMirror,
}

impl CacheState {
    /// Drop `name` from memory, keeping the size total in step.
    fn take(&mut self, name: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(name)?;
        self.current_size -= entry.size;
        Some(entry)
    }
}

/// Size- and TTL-bounded store of compiled templates.
#[derive(Debug)]
pub struct TemplateCache {
    state: Mutex<CacheState>,
    max_size: usize,
    ttl: Duration,
}

impl TemplateCache {
    pub fn new(max_size: usize, ttl: Duration, mirror: DiskMirror) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                current_size: 0,
                mirror,
            }),
            max_size,
            ttl,
        }
    }

    /// Cache sized and mirrored according to `config`.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mirror = if config.cache.persist {
            DiskMirror::open(
                config.cache_dir(),
                config.cache.fragment_dirs.clone(),
                config.skip_extensions(),
            )
        } else {
            DiskMirror::disabled()
        };
        Self::new(config.max_size_bytes(), config.ttl(), mirror)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up `name`, refreshing its last-use time. Expired entries miss.
    pub fn get(&self, name: &str) -> Option<Arc<CompiledTemplate>> {
        let mut state = self.lock();
        let now = Instant::now();
        let expired = match state.entries.get_mut(name) {
            None => return None,
            Some(entry) if now.duration_since(entry.created_at) > self.ttl => true,
            Some(entry) => {
                entry.last_used = now;
                return Some(Arc::clone(&entry.template));
            }
        };
        if expired {
            state.take(name);
            tracing::debug!("Cache entry '{}' expired", name);
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().entries.contains_key(name)
    }

    /// Insert `template`, replacing any entry of the same name.
    ///
    /// # Errors
    ///
    /// [`BladeError::CacheFull`] when the template does not fit even after
    /// evicting stale entries. The cache is left without an entry for the
    /// name in that case.
    pub fn set(&self, template: Arc<CompiledTemplate>) -> Result<()> {
        let name = template.name.clone();
        let size = template.size();
        let full = || BladeError::CacheFull {
            name: name.clone(),
            size,
            max_size: self.max_size,
        };

        let mut state = self.lock();
        state.take(&name);

        if size > self.max_size {
            return Err(full());
        }
        if state.current_size + size > self.max_size {
            let evicted = self.evict_stale(&mut state, Instant::now());
            tracing::debug!("Evicted {} stale entries to make room for '{}'", evicted, name);
            if state.current_size + size > self.max_size {
                return Err(full());
            }
        }

        let now = Instant::now();
        state.current_size += size;
        state.mirror.write(&template);
        state.entries.insert(
            name,
            CacheEntry {
                template,
                size,
                created_at: now,
                last_used: now,
            },
        );
        Ok(())
    }

    /// Remove expired entries and entries unused for `STALE_TTL_MULTIPLIER`
    /// times the TTL.
    fn evict_stale(&self, state: &mut CacheState, now: Instant) -> usize {
        let stale_after = self.ttl.saturating_mul(STALE_TTL_MULTIPLIER);
        let victims: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| {
                now.duration_since(entry.created_at) > self.ttl
                    || now.duration_since(entry.last_used) > stale_after
            })
            .map(|(name, _)| name.clone())
            .collect();
        for name in &victims {
            state.take(name);
        }
        victims.len()
    }

    /// Remove `name` from memory and disk.
    pub fn remove(&self, name: &str) -> bool {
        let mut state = self.lock();
        let removed = state.take(name).is_some();
        if let Err(err) = state.mirror.remove_derived(name) {
            tracing::warn!("{}", err);
        }
        removed
    }

    /// Remove `name` and everything built from it. Returns the removed names.
    pub fn invalidate(&self, name: &str) -> Vec<String> {
        let mut state = self.lock();

        let mut victims: Vec<String> = vec![name.to_string()];
        victims.extend(
            state
                .entries
                .iter()
                .filter(|(_, entry)| entry.template.depends_on(name))
                .map(|(key, _)| key.clone()),
        );
        victims.extend(state.mirror.dependents_of(name));
        victims.sort();
        victims.dedup();

        let mut removed = Vec::new();
        for victim in victims {
            if state.take(&victim).is_some() {
                removed.push(victim.clone());
            }
            if let Err(err) = state.mirror.remove_derived(&victim) {
                tracing::warn!("{}", err);
            }
        }
        tracing::debug!("Invalidated '{}' ({} cached entries removed)", name, removed.len());
        removed
    }

    /// Best-effort removal of `name`'s mirrored artifact only.
    pub fn remove_derived(&self, name: &str) -> Result<()> {
        self.lock().mirror.remove_derived(name)
    }

    /// Empty the cache, in memory and on disk.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.current_size = 0;
        state.mirror.clear();
        tracing::debug!("Cache cleared");
    }

    /// Drop entries older than the TTL. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let mut state = self.lock();
        let now = Instant::now();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.created_at) > self.ttl)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &expired {
            state.take(name);
        }
        expired.len()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let utilization_percent = if self.max_size == 0 {
            0.0
        } else {
            state.current_size as f64 / self.max_size as f64 * 100.0
        };
        CacheStats {
            count: state.entries.len(),
            current_size_bytes: state.current_size,
            max_size_bytes: self.max_size,
            utilization_percent,
        }
    }

    /// Cached names, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Names with a mirrored artifact on disk.
    pub fn mirrored(&self) -> Vec<String> {
        self.lock().mirror.names()
    }

    /// Mirror directory, when mirroring is enabled.
    pub fn mirror_dir(&self) -> Option<PathBuf> {
        let state = self.lock();
        state.mirror.is_enabled().then(|| state.mirror.dir().to_path_buf())
    }

    /// Mirrored compiled text for `name` when still fresh against `source`.
    pub fn load_fresh(&self, name: &str, source: &dyn TemplateSource) -> Option<MirroredArtifact> {
        self.lock().mirror.load_fresh(name, source)
    }
}
