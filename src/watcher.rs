//! Template directory watching.
//!
//! [`TemplateWatcher`] forwards file system events from `notify` to
//! [`BladeEngine::on_changed`] on a dedicated thread. Events are collected
//! for a short debounce window and each changed path is handled once per
//! batch, so an editor's write-rename-chmod burst invalidates a template a
//! single time.

use anyhow::{Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use crate::constants::WATCH_DEBOUNCE;
use crate::engine::BladeEngine;

/// Watches a templates directory and invalidates the engine's cache.
pub struct TemplateWatcher {
    watcher: Option<RecommendedWatcher>,
    handle: Option<thread::JoinHandle<()>>,
    root: PathBuf,
}

impl std::fmt::Debug for TemplateWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateWatcher").field("root", &self.root).finish_non_exhaustive()
    }
}

impl TemplateWatcher {
    /// Watch `engine`'s templates directory recursively.
    pub fn start(engine: Arc<BladeEngine>) -> Result<Self> {
        let root = engine.config().templates_dir.clone();
        Self::watch(engine, &root, WATCH_DEBOUNCE)
    }

    /// Watch `root` recursively, batching events for `debounce`.
    pub fn watch(engine: Arc<BladeEngine>, root: &Path, debounce: Duration) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(err) => tracing::warn!("Template watcher error: {}", err),
            },
            Config::default(),
        )
        .context("Failed to create file watcher")?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", root.display()))?;
        tracing::info!("Watching {} for template changes", root.display());

        let handle = thread::Builder::new()
            .name("blade-watcher".to_string())
            .spawn(move || process_events(&event_rx, &engine, debounce))
            .context("Failed to spawn watcher thread")?;

        Ok(Self {
            watcher: Some(watcher),
            handle: Some(handle),
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stop watching and wait for pending events to be handled.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the watcher drops the sender and disconnects the channel
        self.watcher.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Template watcher thread panicked");
            }
        }
    }
}

impl Drop for TemplateWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn process_events(event_rx: &mpsc::Receiver<Event>, engine: &BladeEngine, debounce: Duration) {
    let mut pending: BTreeSet<PathBuf> = BTreeSet::new();
    let mut first_pending = Instant::now();

    loop {
        match event_rx.recv_timeout(debounce) {
            Ok(event) => {
                if is_relevant(&event.kind) {
                    if pending.is_empty() {
                        first_pending = Instant::now();
                    }
                    pending.extend(event.paths);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                flush(&mut pending, engine);
                break;
            }
        }

        if !pending.is_empty() && first_pending.elapsed() >= debounce {
            flush(&mut pending, engine);
        }
    }
    tracing::debug!("Template watcher stopped");
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_))
}

fn flush(pending: &mut BTreeSet<PathBuf>, engine: &BladeEngine) {
    for path in std::mem::take(pending) {
        if path.is_dir() {
            continue;
        }
        let removed = engine.on_changed(&path);
        if !removed.is_empty() {
            tracing::info!("{} changed, invalidated {}", path.display(), removed.join(", "));
        }
    }
}
