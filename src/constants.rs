//! Global constants used throughout the engine.
//!
//! Cache budgets, file names, environment variable names and recursion
//! limits live here so the numbers are discoverable in one place.

use std::time::Duration;

/// Default in-memory cache budget in megabytes.
pub const DEFAULT_MAX_CACHE_SIZE_MB: u64 = 100;

/// Default time-to-live for a compiled artifact (one hour).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Default interval between background TTL sweeps (five minutes).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Entries unused for longer than `STALE_TTL_MULTIPLIER * ttl` are evicted
/// when the cache is under size pressure.
pub const STALE_TTL_MULTIPLIER: u32 = 2;

/// Maximum nesting of `@include` / `@extends` before compilation gives up.
///
/// Cycles are reported as soon as a name repeats on the load stack; this
/// bound only catches pathological but acyclic chains.
pub const MAX_INCLUDE_DEPTH: usize = 32;

/// File name of the JSON manifest written into the cache directory.
pub const MANIFEST_FILE_NAME: &str = "compiled_manifest.json";

/// Suffix appended to mirrored compiled artifacts.
pub const COMPILED_FILE_SUFFIX: &str = ".compiled";

/// Extension used for directive-syntax templates by `preload_all`.
pub const DEFAULT_TEMPLATE_EXTENSION: &str = ".blade.tpl";

/// Extensions rendered in native (pass-through) mode.
pub const DEFAULT_NATIVE_EXTENSIONS: &[&str] = &[".html", ".tera"];

/// Directories whose templates are only ever inlined into pages.
pub const DEFAULT_FRAGMENT_DIRS: &[&str] = &["layouts", "components"];

/// Comma-separated list of extensions that are never mirrored to disk.
pub const SKIP_COMPILED_EXT_ENV: &str = "BLADE_SKIP_COMPILED_EXT";

/// Window used to coalesce bursts of file-system events (50ms).
pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(50);
