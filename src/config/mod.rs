//! Configuration for the engine and the `blade` binary.
//!
//! Configuration lives in a single TOML file (conventionally `blade.toml`)
//! whose location the CLI takes from `--config` or the `BLADE_CONFIG`
//! environment variable. See [`EngineConfig`] for the recognised keys.

mod engine;

pub use engine::{CacheConfig, EngineConfig, normalize_extensions};
