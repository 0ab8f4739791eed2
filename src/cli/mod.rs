//! Command-line interface for the `blade` binary.
//!
//! Every subcommand builds a [`BladeEngine`] from the same configuration
//! pipeline:
//!
//! 1. `--config <path>` or `BLADE_CONFIG` selects a `blade.toml` (optional)
//! 2. `--templates-dir` overrides the configured templates directory
//! 3. [`EngineConfig::validate`] rejects unusable values
//!
//! # Command Overview
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `render` | Render a template with JSON data to stdout or a file |
//! | `compile` | Print the compiled Tera text of a template |
//! | `preload` | Compile every directive template into the cache |
//! | `validate` | Compile every template without caching and report failures |
//! | `cache` | Inspect or clear the compiled-artifact cache |
//! | `watch` | Keep the cache fresh while templates are edited |
//!
//! # Global Options
//!
//! - `--verbose` / `-v`: debug logging
//! - `--quiet` / `-q`: errors only
//! - `--config` / `-c`: path to `blade.toml`
//! - `--templates-dir` / `-t`: templates root, overriding the config file
//!
//! Logs go to stderr so rendered output on stdout can be piped.

mod cache;
mod compile;
mod preload;
mod render;
mod validate;
mod watch;


use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::EngineConfig;
use crate::engine::BladeEngine;

/// Settings derived from the global flags, shared by all subcommands.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Tracing filter directive; `None` defers to `RUST_LOG`.
    pub log_level: Option<String>,

    /// Configuration file to load.
    pub config_path: Option<PathBuf>,

    /// Templates directory override.
    pub templates_dir: Option<PathBuf>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the engine configuration and apply command-line overrides.
    pub async fn load_engine_config(&self) -> Result<EngineConfig> {
        let mut config = EngineConfig::load_with_optional(self.config_path.as_deref()).await?;
        if let Some(dir) = &self.templates_dir {
            config.templates_dir = dir.clone();
        }
        config.validate()?;
        Ok(config)
    }

    /// Build an engine from [`CliConfig::load_engine_config`].
    pub async fn build_engine(&self) -> Result<BladeEngine> {
        let config = self.load_engine_config().await?;
        tracing::debug!("Templates directory: {}", config.templates_dir.display());
        Ok(BladeEngine::new(config)?)
    }

    /// Install the global tracing subscriber. Later calls are no-ops.
    pub fn init_logging(&self) {
        let filter = match &self.log_level {
            Some(level) => EnvFilter::new(level),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        };

        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .with(filter)
            .try_init();
    }
}

/// Blade template engine.
#[derive(Parser, Debug)]
#[command(
    name = "blade",
    about = "Compile and render Blade-style templates through Tera",
    version,
    long_about = "blade compiles @directive templates into Tera templates, caches the \
                  compiled artifacts in memory and on disk, and renders them with JSON data."
)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress everything but errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = "BLADE_CONFIG")]
    config: Option<PathBuf>,

    /// Templates directory, overriding the configuration file
    #[arg(short, long, global = true)]
    templates_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render a template with JSON data
    Render(render::RenderCommand),

    /// Print the compiled Tera text of a template
    Compile(compile::CompileCommand),

    /// Compile every directive template into the cache
    Preload(preload::PreloadCommand),

    /// Check that every template compiles
    Validate(validate::ValidateCommand),

    /// Inspect or clear the compiled-artifact cache
    Cache(cache::CacheCommand),

    /// Watch templates and keep the cache fresh until interrupted
    Watch(watch::WatchCommand),
}

impl Cli {
    /// Execute the parsed command.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Translate global flags into a [`CliConfig`].
    ///
    /// `--verbose` enables debug logs, `--quiet` limits output to errors and
    /// the default defers to `RUST_LOG`, falling back to warnings.
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("blade_engine=debug".to_string())
        } else if self.quiet {
            Some("error".to_string())
        } else {
            None
        };

        CliConfig {
            log_level,
            config_path: self.config.clone(),
            templates_dir: self.templates_dir.clone(),
        }
    }

    /// Execute with an explicit [`CliConfig`].
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.init_logging();

        match self.command {
            Commands::Render(cmd) => cmd.execute(&config).await,
            Commands::Compile(cmd) => cmd.execute(&config).await,
            Commands::Preload(cmd) => cmd.execute(&config).await,
            Commands::Validate(cmd) => cmd.execute(&config).await,
            Commands::Cache(cmd) => cmd.execute(&config).await,
            Commands::Watch(cmd) => cmd.execute(&config).await,
        }
    }
}
